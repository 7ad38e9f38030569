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
use crate::sensor::decode::frame_bytes;
use crate::sensor::session::{AcquisitionSession, SessionState};
use crate::sensor::signal::CompletionSignal;
use std::sync::Arc;

/// Edges the sensor emits to acknowledge the start pulse before any data.
pub const PREAMBLE_EDGES: u32 = 2;
/// Humidity (16 bits) followed by temperature (16 bits)
pub const DATA_BITS: u32 = 40;
pub const CHECKSUM_BITS: u32 = 8;
pub const TOTAL_EDGES: u32 = PREAMBLE_EDGES + DATA_BITS + CHECKSUM_BITS;

/// Inter-edge durations longer than this many microseconds are a `1` bit.
pub const THRESHOLD_US: u64 = 100;

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum BitSymbol {
    Zero,
    One,
}

impl BitSymbol {
    pub fn bit(self) -> u8 {
        match self {
            BitSymbol::Zero => 0,
            BitSymbol::One => 1,
        }
    }
}

/// Classify an inter-edge duration using the reference threshold.
pub fn classify(delta_us: u64) -> BitSymbol {
    classify_with(delta_us, THRESHOLD_US)
}

/// Long pulses are ones, short pulses are zeros.
pub fn classify_with(delta_us: u64, threshold_us: u64) -> BitSymbol {
    if delta_us > threshold_us {
        BitSymbol::One
    } else {
        BitSymbol::Zero
    }
}

/// A single transition on the data line, numbered from 1 within a session.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct EdgeEvent {
    pub timestamp_us: u64,
    pub ordinal: u32,
}

/// What the assembler did with an edge.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum EdgeOutcome {
    /// The session wasn't capturing, the edge was dropped
    Ignored,
    Preamble,
    Bit(BitSymbol),
    /// Final checksum bit was stored, the frame is valid, and the completion
    /// signal fired
    Complete,
    /// Final checksum bit was stored but doesn't match the data. The completion
    /// signal still fired, the frame is whole.
    ChecksumInvalid,
}

/// Turns edge notifications into frame bits.
///
/// This runs in the edge callback so it must not block, allocate, or log. All
/// state lives in the shared session, the assembler itself is just handles and
/// the classification threshold.
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    session: Arc<AcquisitionSession>,
    signal: Arc<CompletionSignal>,
    threshold_us: u64,
}

impl FrameAssembler {
    pub fn new(session: Arc<AcquisitionSession>, signal: Arc<CompletionSignal>, threshold_us: u64) -> Self {
        Self {
            session,
            signal,
            threshold_us,
        }
    }

    pub fn on_edge(&self, timestamp_us: u64) -> EdgeOutcome {
        if self.session.state() != SessionState::Capturing {
            return EdgeOutcome::Ignored;
        }

        let event = EdgeEvent {
            timestamp_us,
            ordinal: self.session.next_edge(),
        };

        match event.ordinal {
            // Sensor pulling the line low to acknowledge the start pulse
            1 => EdgeOutcome::Preamble,
            2 => {
                self.session.swap_last_edge_time(event.timestamp_us);
                EdgeOutcome::Preamble
            }
            n if n <= PREAMBLE_EDGES + DATA_BITS => {
                let bit = self.classify_edge(&event);
                self.session.push_frame_bit(bit.bit());
                EdgeOutcome::Bit(bit)
            }
            n if n <= TOTAL_EDGES => {
                let bit = self.classify_edge(&event);
                self.session.push_checksum_bit(bit.bit());

                if n == TOTAL_EDGES {
                    self.finish_frame().unwrap_or(EdgeOutcome::Bit(bit))
                } else {
                    EdgeOutcome::Bit(bit)
                }
            }
            _ => EdgeOutcome::Ignored,
        }
    }

    /// Move the session out of `Capturing` based on the frame checksum and wake
    /// the reader. Returns `None` if the reader gave up on this frame first.
    fn finish_frame(&self) -> Option<EdgeOutcome> {
        let snapshot = self.session.snapshot();
        let (next, outcome) = if checksum::compute(frame_bytes(snapshot.raw_frame)) == snapshot.raw_checksum {
            (SessionState::Complete, EdgeOutcome::Complete)
        } else {
            (SessionState::ChecksumInvalid, EdgeOutcome::ChecksumInvalid)
        };

        if self.session.transition(SessionState::Capturing, next) {
            self.signal.signal();
            Some(outcome)
        } else {
            None
        }
    }

    fn classify_edge(&self, event: &EdgeEvent) -> BitSymbol {
        let last = self.session.swap_last_edge_time(event.timestamp_us);
        classify_with(event.timestamp_us.saturating_sub(last), self.threshold_us)
    }
}

#[cfg(test)]
mod test {
    use super::{classify, classify_with, BitSymbol, EdgeOutcome, FrameAssembler, THRESHOLD_US, TOTAL_EDGES};
    use crate::sensor::session::{AcquisitionSession, SessionState};
    use crate::sensor::signal::CompletionSignal;
    use crate::sensor::test::frame_edges;
    use std::sync::Arc;
    use std::time::Duration;

    fn capturing() -> (Arc<AcquisitionSession>, Arc<CompletionSignal>, FrameAssembler) {
        let session = Arc::new(AcquisitionSession::new());
        let signal = Arc::new(CompletionSignal::new());
        assert!(session.transition(SessionState::Idle, SessionState::Handshaking));
        assert!(session.transition(SessionState::Handshaking, SessionState::Capturing));

        let assembler = FrameAssembler::new(session.clone(), signal.clone(), THRESHOLD_US);
        (session, signal, assembler)
    }

    #[test]
    fn test_classify() {
        assert_eq!(BitSymbol::Zero, classify(0));
        assert_eq!(BitSymbol::Zero, classify(76));
        assert_eq!(BitSymbol::Zero, classify(THRESHOLD_US));
        assert_eq!(BitSymbol::One, classify(THRESHOLD_US + 1));
        assert_eq!(BitSymbol::One, classify(120));
    }

    #[test]
    fn test_classify_with_threshold() {
        assert_eq!(BitSymbol::One, classify_with(50, 40));
        assert_eq!(BitSymbol::Zero, classify_with(30, 40));
    }

    #[test]
    fn test_assembler_preamble_then_bits() {
        let (session, _signal, assembler) = capturing();

        assert_eq!(EdgeOutcome::Preamble, assembler.on_edge(1_000));
        assert_eq!(EdgeOutcome::Preamble, assembler.on_edge(1_080));
        assert_eq!(EdgeOutcome::Bit(BitSymbol::Zero), assembler.on_edge(1_156));
        assert_eq!(EdgeOutcome::Bit(BitSymbol::One), assembler.on_edge(1_276));
        assert_eq!(EdgeOutcome::Bit(BitSymbol::One), assembler.on_edge(1_396));

        let snapshot = session.snapshot();
        assert_eq!(0b011, snapshot.raw_frame);
        assert_eq!(5, snapshot.edge_count);
    }

    #[test]
    fn test_assembler_full_frame() {
        let (session, signal, assembler) = capturing();
        let edges = frame_edges([0x02, 0x8C, 0x01, 0x11], 0xA0);
        assert_eq!(TOTAL_EDGES as usize, edges.len());

        let (last, rest) = edges.split_last().unwrap();
        for &ts in rest {
            assert_ne!(EdgeOutcome::Complete, assembler.on_edge(ts));
        }
        assert!(!signal.is_fired());
        assert_eq!(EdgeOutcome::Complete, assembler.on_edge(*last));

        assert_eq!(SessionState::Complete, session.state());
        assert!(signal.is_fired());

        let snapshot = session.snapshot();
        assert_eq!(0x02_8C_01_11, snapshot.raw_frame);
        assert_eq!(0xA0, snapshot.raw_checksum);
        assert_eq!(TOTAL_EDGES, snapshot.edge_count);
    }

    #[test]
    fn test_assembler_corrupt_frame() {
        let (session, signal, assembler) = capturing();
        let edges = frame_edges([0x02, 0x8C, 0x01, 0x11], 0xA1);

        let (last, rest) = edges.split_last().unwrap();
        for &ts in rest {
            assembler.on_edge(ts);
        }
        assert_eq!(EdgeOutcome::ChecksumInvalid, assembler.on_edge(*last));

        assert_eq!(SessionState::ChecksumInvalid, session.state());
        assert_eq!(
            vec![
                SessionState::Handshaking,
                SessionState::Capturing,
                SessionState::ChecksumInvalid
            ],
            session.history()
        );
        assert!(signal.is_fired());
        assert_eq!(0xA1, session.snapshot().raw_checksum);
    }

    #[test]
    fn test_assembler_trailing_edges_ignored() {
        let (session, signal, assembler) = capturing();
        for ts in frame_edges([0x01, 0x02, 0x03, 0x04], 0x0A) {
            assembler.on_edge(ts);
        }

        let before = session.snapshot();
        assert_eq!(EdgeOutcome::Ignored, assembler.on_edge(1_000_000));
        assert_eq!(EdgeOutcome::Ignored, assembler.on_edge(1_000_200));
        assert_eq!(before, session.snapshot());

        // Signal fired exactly once, only one token to consume
        assert!(signal.wait(Duration::from_millis(5)));
        assert!(!signal.wait(Duration::from_millis(5)));
    }

    #[test]
    fn test_assembler_ignores_edges_when_not_capturing() {
        let session = Arc::new(AcquisitionSession::new());
        let signal = Arc::new(CompletionSignal::new());
        let assembler = FrameAssembler::new(session.clone(), signal.clone(), THRESHOLD_US);

        assert_eq!(EdgeOutcome::Ignored, assembler.on_edge(10));
        assert!(session.transition(SessionState::Idle, SessionState::Handshaking));
        assert_eq!(EdgeOutcome::Ignored, assembler.on_edge(20));

        assert_eq!(0, session.edge_count());
        assert!(!signal.is_fired());
    }

    #[test]
    fn test_assembler_no_completion_after_timeout() {
        let (session, signal, assembler) = capturing();
        let edges = frame_edges([0x01, 0x02, 0x03, 0x04], 0x0A);

        for &ts in &edges[..10] {
            assembler.on_edge(ts);
        }

        assert!(session.transition(SessionState::Capturing, SessionState::TimedOut));
        for &ts in &edges[10..] {
            assert_eq!(EdgeOutcome::Ignored, assembler.on_edge(ts));
        }

        assert_eq!(10, session.edge_count());
        assert!(!signal.is_fired());
    }
}
