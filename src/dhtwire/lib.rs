// Dhtwire - Interrupt-driven DHT22 decoder and read-out service
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

//! Read a DHT22 sensor by timing edges on its data line and serve the results over HTTP.
//!
//! ## Features
//!
//! Dhtwire drives the single-wire protocol of a [DHT22 sensor](https://learn.adafruit.com/dht)
//! without busy-waiting. The host sends a start pulse, then registers a callback for
//! edges on the data line. Each edge is timestamped and classified as a `0` or `1` bit
//! based on the time since the previous edge. Once the 40 data bits and 8 checksum bits
//! have been received, the blocked reader is woken up, the checksum is validated, and
//! the frame is decoded into relative humidity and temperature in tenths of a unit.
//!
//! Every read triggers a fresh hardware acquisition. Nothing is cached. Only a single
//! acquisition can be in flight at a time, concurrent reads fail with a "busy" error.
//!
//! The following HTTP endpoints are exposed:
//!
//! * `/temperature` - Temperature in tenths of a degree celsius, e.g. `231` or `-15`.
//! * `/humidity` - Relative humidity in tenths of a percent, e.g. `652`.
//! * `/reading` - Both values from the same frame as JSON.
//! * `/metrics` - Prometheus metrics describing acquisitions.
//!
//! The following metrics are exported:
//!
//! * `dhtwire_temperature_celsius` - Degrees celsius from the last good frame.
//! * `dhtwire_relative_humidity` - Relative humidity (from 0 to 100) from the last good frame.
//! * `dhtwire_last_read_timestamp` - UNIX timestamp of the last time the sensor was correctly read.
//! * `dhtwire_acquisitions_total` - Total number of attempts to read the sensor.
//! * `dhtwire_errors_total` - Total errors by type while trying to read the sensor.
//!
//! ## Build
//!
//! `dhtwire` is meant to run on a Raspberry PI so you will likely need to cross-compile
//! it. If you are on Ubuntu GNU/Linux, you'll need the following packages installed.
//!
//! ```text
//! apt-get install gcc-arm-linux-gnueabihf musl-tools
//! ```
//!
//! Then add the ARMv7 target and build.
//!
//! ```text
//! rustup target add armv7-unknown-linux-musleabihf
//! cargo build --release --target armv7-unknown-linux-musleabihf
//! ```
//!
//! ## Run
//!
//! The sensor data line must be connected to one of the General Purpose IO pins (GPIO),
//! numbered by Broadcom SOC channel. In order to read and write `/dev/gpiomem`, `dhtwire`
//! must run as `root`.
//!
//! ```text
//! sudo dhtwire --bcm-pin 17
//! curl http://localhost:9782/temperature
//! ```
//!
//! **NOTE**: The DHT22 sensor can only be read every two seconds, at most. Retries of
//! failed reads wait two seconds between attempts by default for this reason.
//!

pub mod attribute;
pub mod http;
pub mod metrics;
pub mod retry;
pub mod sensor;
