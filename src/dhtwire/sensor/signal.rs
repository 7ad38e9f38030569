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

use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// One-shot, resettable rendezvous between the edge callback (producer) and
/// the blocking controller (consumer).
///
/// The producer side never blocks: it flips a flag and offers a token to a
/// channel with room for exactly one. The consumer waits on the channel with
/// a deadline.
pub struct CompletionSignal {
    fired: AtomicBool,
    tx: SyncSender<()>,
    rx: Mutex<Receiver<()>>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::sync_channel(1);
        Self {
            fired: AtomicBool::new(false),
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Fire the signal. Only the first call after a reset has any effect.
    pub fn signal(&self) {
        if !self.fired.swap(true, Ordering::AcqRel) {
            // Can't be full: the flag guarantees a single token per cycle.
            let _ = self.tx.try_send(());
        }
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Block until the signal fires or `timeout` elapses. Returns true if the
    /// signal fired.
    pub fn wait(&self, timeout: Duration) -> bool {
        let rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);
        match rx.recv_timeout(timeout) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout) => false,
            // We own the sender so this can't happen
            Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Discard any token left over from a previous cycle and re-arm the signal.
    pub fn reset(&self) {
        let rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);
        while rx.try_recv().is_ok() {}
        self.fired.store(false, Ordering::Release);
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for CompletionSignal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSignal")
            .field("fired", &self.is_fired())
            .finish()
    }
}
