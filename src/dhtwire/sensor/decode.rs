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

//! Accessors and scaling for the 40 bit data field of a frame.
//!
//! The field is held right-aligned in a plain `u64`, most significant bit first
//! as it came off the wire. The four payload bytes are the low 32 bits:
//!
//! ```text
//!  39      32 31      24 23      16 15       8 7        0
//! +----------+----------+----------+----------+----------+
//! | leading  | hum high | hum low  | temp high| temp low |
//! +----------+----------+----------+----------+----------+
//! ```
//!
//! The leading byte is not part of the checksum and is never decoded.

use crate::sensor::core::{Humidity, TemperatureCelsius};
use serde::Serialize;

const SIGN_BIT: u8 = 0b1000_0000;
const MAGNITUDE_MASK: u8 = 0b0111_1111;

pub fn humidity_high(raw_frame: u64) -> u8 {
    (raw_frame >> 24) as u8
}

pub fn humidity_low(raw_frame: u64) -> u8 {
    (raw_frame >> 16) as u8
}

pub fn temperature_high(raw_frame: u64) -> u8 {
    (raw_frame >> 8) as u8
}

pub fn temperature_low(raw_frame: u64) -> u8 {
    raw_frame as u8
}

/// Payload bytes in transmission order: humidity high, humidity low,
/// temperature high, temperature low.
pub fn frame_bytes(raw_frame: u64) -> [u8; 4] {
    [
        humidity_high(raw_frame),
        humidity_low(raw_frame),
        temperature_high(raw_frame),
        temperature_low(raw_frame),
    ]
}

/// Humidity and temperature from one frame, both in tenths of a unit.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize)]
pub struct DecodedReading {
    /// Relative humidity, tenths of a percent
    pub humidity_tenths: u16,
    /// Degrees celsius, tenths of a degree
    pub temperature_tenths: i16,
    pub checksum_ok: bool,
}

impl DecodedReading {
    pub fn temperature(&self) -> TemperatureCelsius {
        TemperatureCelsius::from(f64::from(self.temperature_tenths) / 10.0)
    }

    pub fn humidity(&self) -> Humidity {
        Humidity::from(f64::from(self.humidity_tenths) / 10.0)
    }
}

/// Split a frame into humidity and temperature.
///
/// The temperature is sign-magnitude: the top bit of the high byte is set for
/// values below zero and the remaining 15 bits are the magnitude.
pub fn decode(raw_frame: u64, checksum_ok: bool) -> DecodedReading {
    // See https://cdn-shop.adafruit.com/datasheets/Digital+humidity+and+temperature+sensor+AM2302.pdf
    let humidity_tenths = u16::from(humidity_high(raw_frame)) << 8 | u16::from(humidity_low(raw_frame));

    let t_hi = temperature_high(raw_frame);
    let magnitude = (u16::from(t_hi & MAGNITUDE_MASK) << 8 | u16::from(temperature_low(raw_frame))) as i16;
    let temperature_tenths = if t_hi & SIGN_BIT > 0 { -magnitude } else { magnitude };

    let reading = DecodedReading {
        humidity_tenths,
        temperature_tenths,
        checksum_ok,
    };

    tracing::debug!(
        message = "parsed sensor data",
        raw_frame = raw_frame,
        temperature = %reading.temperature(),
        humidity = %reading.humidity(),
        checksum_ok = checksum_ok,
    );

    reading
}
