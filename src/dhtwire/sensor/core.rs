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

use std::error::Error;
use std::fmt::{self, Formatter};
use std::time::Instant;

pub use rppal::gpio::Level;

/// Temperature, in degrees celsius
#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(transparent)]
pub struct TemperatureCelsius(f64);

impl From<TemperatureCelsius> for f64 {
    fn from(v: TemperatureCelsius) -> Self {
        v.0
    }
}

impl From<f64> for TemperatureCelsius {
    fn from(v: f64) -> Self {
        Self(v)
    }
}

impl fmt::Display for TemperatureCelsius {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}c", self.0)
    }
}

/// Relative humidity (from 0 to 100)
#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(transparent)]
pub struct Humidity(f64);

impl From<Humidity> for f64 {
    fn from(v: Humidity) -> Self {
        v.0
    }
}

impl From<f64> for Humidity {
    fn from(v: f64) -> Self {
        Self(v)
    }
}

impl fmt::Display for Humidity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Potential kinds of errors that can be encountered acquiring a reading
#[derive(PartialEq, Eq, Debug, Hash, Clone, Copy)]
pub enum ErrorKind {
    Busy,
    Timeout,
    ChecksumMismatch,
    InvalidGpio,
    ReservationFailed,
}

impl ErrorKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            ErrorKind::Busy => "busy",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ChecksumMismatch => "checksum",
            ErrorKind::InvalidGpio => "invalid_gpio",
            ErrorKind::ReservationFailed => "reservation",
        }
    }
}

/// Error acquiring a reading from the sensor or setting up the data line it's
/// connected to.
#[derive(Debug)]
pub enum AcquisitionError {
    /// Another acquisition is already in flight, callers should retry later.
    Busy,
    /// The frame was not complete before the deadline. `edges` is the number of
    /// edges observed before giving up.
    Timeout { edges: u32 },
    /// The frame was received but the transmitted checksum doesn't match the data.
    ChecksumMismatch { expected: u8, computed: u8 },
    KindMsg(ErrorKind, &'static str),
    KindMsgCause(ErrorKind, &'static str, Box<dyn Error + Send + Sync>),
}

impl AcquisitionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AcquisitionError::Busy => ErrorKind::Busy,
            AcquisitionError::Timeout { .. } => ErrorKind::Timeout,
            AcquisitionError::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            AcquisitionError::KindMsg(kind, _) => *kind,
            AcquisitionError::KindMsgCause(kind, _, _) => *kind,
        }
    }

    /// Return true if retrying the whole acquisition cycle may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Busy | ErrorKind::Timeout | ErrorKind::ChecksumMismatch
        )
    }
}

impl fmt::Display for AcquisitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionError::Busy => write!(f, "acquisition already in progress"),
            AcquisitionError::Timeout { edges } => {
                write!(f, "timeout waiting for sensor frame after {} edges", edges)
            }
            AcquisitionError::ChecksumMismatch { expected, computed } => {
                write!(f, "checksum error: expected {}, got {}", expected, computed)
            }
            AcquisitionError::KindMsg(_, msg) => f.write_str(msg),
            AcquisitionError::KindMsgCause(_, msg, ref e) => write!(f, "{}: {}", msg, e),
        }
    }
}

impl Error for AcquisitionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AcquisitionError::KindMsgCause(_, _, ref e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Monotonic microsecond time source. Must be callable from the edge callback.
pub trait Clock: Send + Sync {
    fn now_us(&self) -> u64;
}

/// `Clock` backed by `std::time::Instant`, counting from when it was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Direction of the data line.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Direction {
    Input,
    Output,
}

/// Callback invoked once per edge on the data line, possibly from another thread.
pub type EdgeCallback = Box<dyn FnMut() + Send + 'static>;

/// Abstraction around the single GPIO line the sensor is connected to, to allow
/// for easier testing.
///
/// Implementations must deliver edges to the armed callback with latency well
/// under the bit classification threshold.
pub trait GpioLine {
    fn pin(&self) -> u8;
    fn set_direction(&mut self, direction: Direction) -> Result<(), AcquisitionError>;
    fn set_output(&mut self, level: Level) -> Result<(), AcquisitionError>;
    fn arm_edge_interrupt(&mut self, callback: EdgeCallback) -> Result<(), AcquisitionError>;
    fn disarm_edge_interrupt(&mut self) -> Result<(), AcquisitionError>;
}
