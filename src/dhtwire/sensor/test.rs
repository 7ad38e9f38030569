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

#![cfg(test)]

use crate::sensor::core::{AcquisitionError, Clock, Direction, EdgeCallback, ErrorKind, GpioLine, Level};
use crate::sensor::frame::{DATA_BITS, PREAMBLE_EDGES};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

const START_US: u64 = 10_000;
const PREAMBLE_US: u64 = 80;
const ONE_US: u64 = 120;
const ZERO_US: u64 = 76;

/// Timestamps of every edge a sensor would produce for the given payload and
/// checksum byte. Bits that precede the payload in the 40 bit data field are
/// sent as zeros.
pub(crate) fn frame_edges(data: [u8; 4], checksum: u8) -> Vec<u64> {
    let mut edges = vec![START_US, START_US + PREAMBLE_US];
    let mut now = START_US + PREAMBLE_US;

    let payload_bits = (data.len() * 8) as u32;
    let mut bits: Vec<bool> = (0..DATA_BITS - payload_bits).map(|_| false).collect();
    for byte in data.iter().chain(std::iter::once(&checksum)) {
        for offset in (0..8).rev() {
            bits.push(byte & (1u8 << offset) > 0);
        }
    }

    for bit in bits {
        now += if bit { ONE_US } else { ZERO_US };
        edges.push(now);
    }

    debug_assert_eq!(edges.len() as u32, PREAMBLE_EDGES + DATA_BITS + 8);
    edges
}

/// Clock implementation that only moves when told to.
#[derive(Debug, Default)]
pub(crate) struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub(crate) fn set(&self, now_us: u64) {
        self.now.store(now_us, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub(crate) enum LineOp {
    Direction(Direction),
    Output(Level),
    Arm,
    Disarm,
}

/// Everything a `MockLine` was asked to do, shared with the test.
#[derive(Debug, Default)]
pub(crate) struct LineLog {
    pub(crate) ops: Vec<LineOp>,
    pub(crate) direction: Option<Direction>,
    pub(crate) level: Option<Level>,
    pub(crate) armed: bool,
}

impl LineLog {
    /// True if the line was left the way it should be between acquisitions.
    pub(crate) fn is_idle(&self) -> bool {
        !self.armed && self.direction == Some(Direction::Output) && self.level == Some(Level::High)
    }
}

/// GpioLine implementation that replays prepared edge timestamps into the
/// armed callback, one set of timestamps per time it is armed. Edges are
/// delivered synchronously from inside `arm_edge_interrupt`.
pub(crate) struct MockLine {
    log: Arc<Mutex<LineLog>>,
    clock: Arc<ManualClock>,
    edges: VecDeque<Vec<u64>>,
    fail_op: Option<LineOp>,
}

impl MockLine {
    pub(crate) fn new(clock: Arc<ManualClock>, edges: Vec<Vec<u64>>) -> Self {
        MockLine {
            log: Default::default(),
            clock,
            edges: edges.into(),
            fail_op: None,
        }
    }

    /// Line that never produces any edges.
    pub(crate) fn silent(clock: Arc<ManualClock>) -> Self {
        Self::new(clock, Vec::new())
    }

    /// Line that fails the first call matching `op`, then behaves normally.
    /// Failed calls are not recorded and don't change the line.
    pub(crate) fn failing(clock: Arc<ManualClock>, op: LineOp) -> Self {
        MockLine {
            fail_op: Some(op),
            ..Self::silent(clock)
        }
    }

    /// Line that replays `edges` but fails the first call matching `op`.
    pub(crate) fn with_failure(mut self, op: LineOp) -> Self {
        self.fail_op = Some(op);
        self
    }

    pub(crate) fn log(&self) -> Arc<Mutex<LineLog>> {
        self.log.clone()
    }

    fn check(&mut self, op: LineOp) -> Result<(), AcquisitionError> {
        if self.fail_op == Some(op) {
            self.fail_op = None;
            return Err(AcquisitionError::KindMsg(ErrorKind::ReservationFailed, "line operation failed"));
        }

        Ok(())
    }
}

impl GpioLine for MockLine {
    fn pin(&self) -> u8 {
        0
    }

    fn set_direction(&mut self, direction: Direction) -> Result<(), AcquisitionError> {
        self.check(LineOp::Direction(direction))?;
        let mut log = self.log.lock().unwrap();
        log.ops.push(LineOp::Direction(direction));
        log.direction = Some(direction);
        Ok(())
    }

    fn set_output(&mut self, level: Level) -> Result<(), AcquisitionError> {
        self.check(LineOp::Output(level))?;
        let mut log = self.log.lock().unwrap();
        log.ops.push(LineOp::Output(level));
        log.level = Some(level);
        Ok(())
    }

    fn arm_edge_interrupt(&mut self, mut callback: EdgeCallback) -> Result<(), AcquisitionError> {
        self.check(LineOp::Arm)?;

        {
            let mut log = self.log.lock().unwrap();
            assert_eq!(Some(Direction::Input), log.direction, "armed while not in input mode");
            log.ops.push(LineOp::Arm);
            log.armed = true;
        }

        for ts in self.edges.pop_front().unwrap_or_default() {
            self.clock.set(ts);
            callback();
        }

        Ok(())
    }

    fn disarm_edge_interrupt(&mut self) -> Result<(), AcquisitionError> {
        self.check(LineOp::Disarm)?;
        let mut log = self.log.lock().unwrap();
        log.ops.push(LineOp::Disarm);
        log.armed = false;
        Ok(())
    }
}
