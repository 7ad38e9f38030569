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

use crate::sensor::checksum;
use crate::sensor::core::{AcquisitionError, Clock, Direction, ErrorKind, GpioLine, Level};
use crate::sensor::decode::{self, DecodedReading};
use crate::sensor::frame::{FrameAssembler, THRESHOLD_US};
use crate::sensor::session::{AcquisitionSession, SessionState};
use crate::sensor::signal::CompletionSignal;
use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// How long the host holds the line low to request a frame.
pub const DEFAULT_START_PULSE: Duration = Duration::from_micros(1_000);

/// Timing knobs for a single acquisition.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct AcquisitionConfig {
    pub start_pulse: Duration,
    pub threshold_us: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            start_pulse: DEFAULT_START_PULSE,
            threshold_us: THRESHOLD_US,
        }
    }
}

/// Read humidity and temperature from a DHT22 sensor, one full hardware cycle per call.
///
/// Edges are collected by a callback registered with the `GpioLine` while this
/// controller blocks waiting for the frame to complete. Only one acquisition can be
/// in flight at a time, concurrent calls to `read` are rejected rather than queued.
pub struct AcquisitionController {
    line: Mutex<Box<dyn GpioLine + Send + 'static>>,
    clock: Arc<dyn Clock>,
    session: Arc<AcquisitionSession>,
    signal: Arc<CompletionSignal>,
    config: AcquisitionConfig,
}

impl AcquisitionController {
    pub fn from_line<T>(line: T, clock: Arc<dyn Clock>, config: AcquisitionConfig) -> Self
    where
        T: GpioLine + Send + 'static,
    {
        Self {
            line: Mutex::new(Box::new(line)),
            clock,
            session: Arc::new(AcquisitionSession::new()),
            signal: Arc::new(CompletionSignal::new()),
            config,
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    #[cfg(test)]
    pub(crate) fn session(&self) -> &AcquisitionSession {
        &self.session
    }

    /// Perform one acquisition, blocking for at most `timeout` (plus the start pulse)
    /// while waiting for the sensor to send a frame.
    ///
    /// Checksum failures and timeouts are returned to the caller, never retried here.
    /// The line is left as an output driven high whatever the result.
    pub fn read(&self, timeout: Duration) -> Result<DecodedReading, AcquisitionError> {
        if !self.session.transition(SessionState::Idle, SessionState::Handshaking) {
            tracing::debug!(
                message = "rejecting read, acquisition already in progress",
                state = ?self.session.state(),
            );
            return Err(AcquisitionError::Busy);
        }

        // Anything left over from the previous cycle must not leak into this one
        self.signal.reset();
        self.session.clear_frame();

        let captured = {
            let mut line = self.line.lock().unwrap_or_else(PoisonError::into_inner);
            tracing::debug!(message = "starting acquisition", pin = line.pin(), timeout = ?timeout);

            let captured = self.capture(line.as_mut(), timeout);
            Self::park_line(line.as_mut());
            captured
        };

        let res = match captured {
            Ok(completed) => self.finish(completed),
            Err(e) => {
                let state = self.session.abort();
                tracing::debug!(message = "acquisition failed before a frame was received", state = ?state, error = %e);
                Err(e)
            }
        };

        if !self.session.release() {
            tracing::warn!(
                message = "acquisition ended outside of a terminal state",
                state = ?self.session.state(),
            );
        }

        res
    }

    /// Send the start pulse, arm edge capture, and wait for the frame. Returns
    /// true if the completion signal fired before the timeout.
    fn capture(&self, line: &mut dyn GpioLine, timeout: Duration) -> Result<bool, AcquisitionError> {
        // From the DHT22 datasheet, the host wakes the sensor by holding the line
        // low for at least 1ms then releasing it and waiting for the response.
        line.set_direction(Direction::Output)?;
        line.set_output(Level::High)?;
        line.set_output(Level::Low)?;
        thread::sleep(self.config.start_pulse);
        line.set_output(Level::High)?;
        line.set_direction(Direction::Input)?;

        // We hold the claim from `read` so nothing else should have moved the state
        if !self
            .session
            .transition(SessionState::Handshaking, SessionState::Capturing)
        {
            return Err(AcquisitionError::KindMsg(
                ErrorKind::Busy,
                "acquisition session left the handshake unexpectedly",
            ));
        }

        let assembler = FrameAssembler::new(self.session.clone(), self.signal.clone(), self.config.threshold_us);
        let clock = self.clock.clone();
        line.arm_edge_interrupt(Box::new(move || {
            assembler.on_edge(clock.now_us());
        }))?;

        Ok(self.signal.wait(timeout))
    }

    /// Validate and decode the captured frame. Capture has been disarmed by the
    /// time this is called.
    fn finish(&self, completed: bool) -> Result<DecodedReading, AcquisitionError> {
        // The frame may have completed just as we gave up waiting, only treat this
        // as a timeout if the callback didn't get there first.
        if !completed && self.session.transition(SessionState::Capturing, SessionState::TimedOut) {
            let edges = self.session.edge_count();
            tracing::debug!(message = "timeout waiting for sensor frame", edges = edges);
            return Err(AcquisitionError::Timeout { edges });
        }

        let snapshot = self.session.snapshot();
        let checksum_ok = checksum::validate(&snapshot);
        debug_assert_eq!(checksum_ok, self.session.state() == SessionState::Complete);

        if checksum_ok {
            Ok(decode::decode(snapshot.raw_frame, checksum_ok))
        } else {
            Err(AcquisitionError::ChecksumMismatch {
                expected: snapshot.raw_checksum,
                computed: checksum::compute(decode::frame_bytes(snapshot.raw_frame)),
            })
        }
    }

    /// Disarm capture and drive the line high. Errors are logged rather than
    /// returned so they don't replace the result of the acquisition.
    fn park_line(line: &mut dyn GpioLine) {
        if let Err(e) = line.disarm_edge_interrupt() {
            tracing::warn!(message = "unable to disarm edge capture", pin = line.pin(), error = %e);
        }

        if let Err(e) = line.set_direction(Direction::Output) {
            tracing::warn!(message = "unable to set line to output", pin = line.pin(), error = %e);
        }

        if let Err(e) = line.set_output(Level::High) {
            tracing::warn!(message = "unable to drive line high", pin = line.pin(), error = %e);
        }
    }
}

impl Debug for AcquisitionController {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionController")
            .field("session", &self.session)
            .field("config", &self.config)
            .finish()
    }
}
