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

use crate::sensor::AcquisitionError;
use std::thread;
use std::time::Duration;

/// Bounded retries of a whole acquisition cycle.
///
/// The acquisition controller is single-shot, any retrying of timeouts or corrupt
/// frames happens here in the caller. Errors that can't be fixed by trying again
/// (bad pin, reservation failures) are returned immediately.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct RetryPolicy {
    attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    /// Create a policy making up to `attempts` tries (at least one) and sleeping
    /// `backoff` in between each of them.
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    pub fn single() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn run<T, F>(&self, mut op: F) -> Result<T, AcquisitionError>
    where
        F: FnMut() -> Result<T, AcquisitionError>,
    {
        let mut attempt = 1;

        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if e.is_recoverable() && attempt < self.attempts => {
                    tracing::debug!(
                        message = "retrying sensor read",
                        attempt = attempt,
                        attempts = self.attempts,
                        error = %e,
                    );

                    if !self.backoff.is_zero() {
                        thread::sleep(self.backoff);
                    }

                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::single()
    }
}
