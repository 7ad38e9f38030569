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

pub mod checksum;
mod controller;
mod core;
pub mod decode;
pub mod frame;
mod rpi;
mod session;
mod signal;
pub(crate) mod test;

pub use crate::sensor::controller::{AcquisitionConfig, AcquisitionController, DEFAULT_START_PULSE};
pub use crate::sensor::core::{
    AcquisitionError, Clock, Direction, EdgeCallback, ErrorKind, GpioLine, Humidity, Level, MonotonicClock,
    TemperatureCelsius,
};
pub use crate::sensor::decode::DecodedReading;
pub use crate::sensor::frame::{BitSymbol, EdgeEvent, FrameAssembler};
pub use crate::sensor::rpi::{open_line, EdgeTrigger, RppalLine, MAX_BCM_PIN};
pub use crate::sensor::session::{AcquisitionSession, FrameSnapshot, SessionState};
pub use crate::sensor::signal::CompletionSignal;
