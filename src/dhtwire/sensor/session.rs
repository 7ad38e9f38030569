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

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
#[cfg(test)]
use std::sync::Mutex;

/// Where a session is in its read cycle.
///
/// `Idle -> Handshaking -> Capturing -> {Complete | TimedOut | ChecksumInvalid} -> Idle`
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Handshaking = 1,
    Capturing = 2,
    Complete = 3,
    TimedOut = 4,
    ChecksumInvalid = 5,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SessionState::Handshaking,
            2 => SessionState::Capturing,
            3 => SessionState::Complete,
            4 => SessionState::TimedOut,
            5 => SessionState::ChecksumInvalid,
            _ => SessionState::Idle,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Complete | SessionState::TimedOut | SessionState::ChecksumInvalid
        )
    }

    /// Return true if moving from this state to `next` is part of the read cycle.
    pub fn can_transition(self, next: SessionState) -> bool {
        match (self, next) {
            (SessionState::Idle, SessionState::Handshaking) => true,
            (SessionState::Handshaking, SessionState::Capturing) => true,
            (SessionState::Capturing, SessionState::Complete) => true,
            (SessionState::Capturing, SessionState::TimedOut) => true,
            (SessionState::Capturing, SessionState::ChecksumInvalid) => true,
            (from, SessionState::Idle) => from.is_terminal(),
            _ => false,
        }
    }
}

/// Accumulated frame bits, copied out of a session once capture has stopped.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct FrameSnapshot {
    /// 40 data bits, MSB first, in the low bits of the integer
    pub raw_frame: u64,
    pub raw_checksum: u8,
    pub edge_count: u32,
}

/// The single mutable decode context shared by the edge callback and the controller.
///
/// There is no lock here. The accumulators are only written by the edge callback
/// while the state is `Capturing`, and only read by the controller once the state
/// has left `Capturing`.
#[derive(Debug, Default)]
pub struct AcquisitionSession {
    state: AtomicU8,
    edge_count: AtomicU32,
    last_edge_time: AtomicU64,
    raw_frame: AtomicU64,
    raw_checksum: AtomicU8,
    #[cfg(test)]
    history: Mutex<Vec<SessionState>>,
}

impl AcquisitionSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move from `from` to `to` if the session is currently in `from` and the
    /// move is a legal one. Returns false otherwise, leaving the session untouched.
    pub fn transition(&self, from: SessionState, to: SessionState) -> bool {
        if !from.can_transition(to) {
            return false;
        }

        let moved = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if moved {
            self.record(to);
        }

        moved
    }

    #[cfg(test)]
    fn record(&self, state: SessionState) {
        self.history.lock().unwrap().push(state);
    }

    #[cfg(not(test))]
    fn record(&self, _state: SessionState) {}

    /// Every state the session has moved into, oldest first.
    #[cfg(test)]
    pub(crate) fn history(&self) -> Vec<SessionState> {
        self.history.lock().unwrap().clone()
    }

    /// Clear all accumulated frame data. Only called by the controller while
    /// capture is not armed.
    pub(crate) fn clear_frame(&self) {
        self.edge_count.store(0, Ordering::Relaxed);
        self.last_edge_time.store(0, Ordering::Relaxed);
        self.raw_frame.store(0, Ordering::Relaxed);
        self.raw_checksum.store(0, Ordering::Relaxed);
    }

    /// End a cycle that failed before a frame could be received. The session
    /// walks the normal route to `TimedOut`, nothing was captured. A session that
    /// already reached a terminal state is left as-is.
    pub(crate) fn abort(&self) -> SessionState {
        if self.state() == SessionState::Handshaking {
            self.transition(SessionState::Handshaking, SessionState::Capturing);
        }

        self.transition(SessionState::Capturing, SessionState::TimedOut);
        self.state()
    }

    /// Return the session to `Idle` from a terminal state, ending the current
    /// cycle. Returns false if the cycle hasn't finished.
    pub(crate) fn release(&self) -> bool {
        let current = self.state();
        current.is_terminal() && self.transition(current, SessionState::Idle)
    }

    pub fn edge_count(&self) -> u32 {
        self.edge_count.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            raw_frame: self.raw_frame.load(Ordering::Acquire),
            raw_checksum: self.raw_checksum.load(Ordering::Acquire),
            edge_count: self.edge_count.load(Ordering::Acquire),
        }
    }

    // Accumulator access for the edge callback. There is a single producer so
    // plain load/store pairs are enough, no read-modify-write is raced.

    pub(crate) fn next_edge(&self) -> u32 {
        let ordinal = self.edge_count.load(Ordering::Relaxed) + 1;
        self.edge_count.store(ordinal, Ordering::Release);
        ordinal
    }

    pub(crate) fn swap_last_edge_time(&self, timestamp_us: u64) -> u64 {
        let last = self.last_edge_time.load(Ordering::Relaxed);
        self.last_edge_time.store(timestamp_us, Ordering::Relaxed);
        last
    }

    pub(crate) fn push_frame_bit(&self, bit: u8) {
        let frame = self.raw_frame.load(Ordering::Relaxed);
        self.raw_frame.store((frame << 1) | u64::from(bit), Ordering::Release);
    }

    pub(crate) fn push_checksum_bit(&self, bit: u8) {
        let checksum = self.raw_checksum.load(Ordering::Relaxed);
        self.raw_checksum.store((checksum << 1) | bit, Ordering::Release);
    }
}
