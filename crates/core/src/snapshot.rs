//! Simulator state snapshots and rewind.
//!
//! A [`Snapshot`] is a complete copy of everything that determines future
//! execution: registers, the PC stack, ROM, RAM, status characters, ports,
//! the command register, the cycle counter and the test-mode input. Snapshots
//! are plain serde values, so the frontend can persist them as save states.
//!
//! [`RewindBuffer`] keeps the most recent snapshots, taken every N steps,
//! for stepping backwards in the debugger.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{AddressDecoder, Cpu, Mcs4, Memory, PcStack};

/// A frozen copy of simulator state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub cpu: Cpu,
    pub stack: PcStack,
    pub mem: Memory,
    pub decoder: AddressDecoder,
    /// Cycle counter when this snapshot was taken
    pub tick: u64,
    pub test_mode: bool,
}

impl Snapshot {
    pub fn capture(sys: &Mcs4) -> Self {
        Snapshot {
            cpu: sys.cpu.clone(),
            stack: sys.stack.clone(),
            mem: sys.mem.clone(),
            decoder: sys.decoder.clone(),
            tick: sys.tick,
            test_mode: sys.test_mode(),
        }
    }
}

impl Mcs4 {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(self)
    }

    /// Restore state from a snapshot. Diagnostics and pending watch hits
    /// are cleared; the profiler and watchpoint list are kept.
    ///
    /// Every field is clamped to its bit width, so a corrupt snapshot still
    /// leaves a steppable simulator.
    pub fn restore(&mut self, snap: &Snapshot) {
        self.cpu = snap.cpu.clone();
        self.cpu.normalize();
        self.stack = snap.stack.clone();
        self.stack.normalize();
        self.mem = snap.mem.clone();
        self.mem.normalize();
        self.decoder = snap.decoder.clone();
        self.decoder.normalize();
        self.tick = snap.tick;
        // Re-derives the PC width from the mode
        self.set_test_mode(snap.test_mode);
        self.clear_diagnostics();
        self.debugger.watch_hit = None;
    }
}

/// Bounded buffer of recent snapshots, newest last.
pub struct RewindBuffer {
    buf: VecDeque<Snapshot>,
    capacity: usize,
    /// Steps between snapshots
    pub interval: u32,
    step_counter: u32,
}

impl RewindBuffer {
    /// Create a rewind buffer holding up to `capacity` snapshots, one every
    /// `interval` steps.
    pub fn new(capacity: usize, interval: u32) -> Self {
        RewindBuffer {
            buf: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            interval: interval.max(1),
            step_counter: 0,
        }
    }

    /// Notify that a step has completed. Returns true if a snapshot should be taken.
    pub fn tick_step(&mut self) -> bool {
        self.step_counter += 1;
        if self.step_counter >= self.interval {
            self.step_counter = 0;
            true
        } else {
            false
        }
    }

    /// Push a snapshot, discarding the oldest when full.
    pub fn push(&mut self, snap: Snapshot) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(snap);
    }

    /// Pop the most recent snapshot.
    pub fn pop(&mut self) -> Option<Snapshot> {
        self.buf.pop_back()
    }

    pub fn len(&self) -> usize { self.buf.len() }

    pub fn is_empty(&self) -> bool { self.buf.is_empty() }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.step_counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TEST_ADDR_MASK;

    fn make_snap(tick: u64) -> Snapshot {
        let mut m = Mcs4::new();
        m.tick = tick;
        m.snapshot()
    }

    #[test]
    fn test_push_pop() {
        let mut rb = RewindBuffer::new(3, 1);
        rb.push(make_snap(1));
        rb.push(make_snap(2));
        rb.push(make_snap(3));
        assert_eq!(rb.len(), 3);
        assert_eq!(rb.pop().unwrap().tick, 3);
        assert_eq!(rb.pop().unwrap().tick, 2);
        assert_eq!(rb.len(), 1);
    }

    #[test]
    fn test_ring_overflow() {
        let mut rb = RewindBuffer::new(2, 1);
        rb.push(make_snap(1));
        rb.push(make_snap(2));
        rb.push(make_snap(3));
        assert_eq!(rb.len(), 2);
        assert_eq!(rb.pop().unwrap().tick, 3);
        assert_eq!(rb.pop().unwrap().tick, 2);
        assert!(rb.pop().is_none());
    }

    #[test]
    fn test_tick_step() {
        let mut rb = RewindBuffer::new(10, 4);
        for _ in 0..3 { assert!(!rb.tick_step()); }
        assert!(rb.tick_step());
    }

    #[test]
    fn test_restore_resumes_execution() {
        // LDM 1; XCH R0; LDM 2; ADD R0
        let mut m = Mcs4::new();
        m.load_program(0, &[0xD1, 0xB0, 0xD2, 0x80]).unwrap();
        m.step();
        m.step();
        let snap = m.snapshot();
        m.step();
        m.step();
        assert_eq!(m.accumulator(), 3);

        m.restore(&snap);
        assert_eq!(m.pc(), 2);
        assert_eq!(m.register(0), 1);
        assert_eq!(m.cycles(), 2);
        m.step();
        m.step();
        assert_eq!(m.accumulator(), 3);
    }

    #[test]
    fn test_restore_test_mode() {
        let mut m = Mcs4::new();
        m.set_test_mode(true);
        let snap = m.snapshot();
        let mut other = Mcs4::new();
        other.restore(&snap);
        assert!(other.test_mode());
        assert_eq!(other.stack.address_mask(), TEST_ADDR_MASK);
    }
}
