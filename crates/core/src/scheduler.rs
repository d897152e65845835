//! Execution scheduler.
//!
//! The core owns no timer. A host drives the simulator by calling
//! [`Scheduler::step`] for single steps, [`Scheduler::tick`] once per
//! animation tick after [`Scheduler::animate`], or [`Scheduler::run`] with a
//! cycle budget per batch. Every call returns control once its work is done;
//! an instruction always completes before the scheduler yields.

use crate::debugger::WatchHit;
use crate::{Diagnostic, Mcs4, StepResult};

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    /// Transient state while [`Scheduler::step`] executes
    SteppingOnce,
    /// One instruction per external tick
    Animating,
    /// Batches of instructions bounded by a cycle budget
    Running,
}

/// Why a `run` batch returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The batch consumed its cycle budget; the scheduler stays `Running`.
    BudgetExhausted,
    /// The active PC reached a breakpoint address.
    Breakpoint(u16),
    /// A RAM watchpoint fired.
    Watchpoint(WatchHit),
}

/// Summary of one `run` batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Instruction cycles executed in this batch
    pub cycles: u64,
    pub instructions: u64,
    pub stop: StopReason,
    /// Faults raised during this batch, in order
    pub diagnostics: Vec<Diagnostic>,
}

/// Drives an owned [`Mcs4`].
pub struct Scheduler {
    pub sys: Mcs4,
    state: RunState,
}

impl Scheduler {
    pub fn new(sys: Mcs4) -> Self {
        Scheduler { sys, state: RunState::Stopped }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Execute exactly one instruction and return to `Stopped`.
    pub fn step(&mut self) -> StepResult {
        self.state = RunState::SteppingOnce;
        let r = self.sys.step();
        self.state = RunState::Stopped;
        r
    }

    /// Enter animation mode. Each [`tick`](Self::tick) then runs one instruction.
    pub fn animate(&mut self) {
        self.state = RunState::Animating;
    }

    /// Execute one instruction if animating. Returns `None` when not animating.
    ///
    /// Landing on a breakpoint or firing a watchpoint drops back to `Stopped`.
    pub fn tick(&mut self, breakpoints: &[u16]) -> Option<StepResult> {
        if self.state != RunState::Animating {
            return None;
        }
        let r = self.sys.step();
        if self.sys.debugger.take_hit().is_some() || breakpoints.contains(&self.sys.pc()) {
            self.state = RunState::Stopped;
        }
        Some(r)
    }

    /// Run until the batch has consumed at least `budget` cycles, or until the
    /// PC lands on an address in `breakpoints`, or a watchpoint fires.
    ///
    /// Breakpoints are checked after each instruction, so a run started on a
    /// breakpoint always makes progress. A breakpoint or watchpoint moves the
    /// scheduler to `Stopped`; exhausting the budget leaves it `Running`.
    pub fn run(&mut self, budget: u64, breakpoints: &[u16]) -> RunOutcome {
        self.state = RunState::Running;
        let mut out = RunOutcome {
            cycles: 0,
            instructions: 0,
            stop: StopReason::BudgetExhausted,
            diagnostics: Vec::new(),
        };

        while out.cycles < budget {
            let r = self.sys.step();
            out.cycles += r.cycles as u64;
            out.instructions += 1;
            if let Some(d) = r.diagnostic {
                out.diagnostics.push(d);
            }

            if let Some(hit) = self.sys.debugger.take_hit() {
                out.stop = StopReason::Watchpoint(hit);
                self.state = RunState::Stopped;
                break;
            }
            let pc = self.sys.pc();
            if breakpoints.contains(&pc) {
                log::debug!("breakpoint hit at 0x{:03X}", pc);
                out.stop = StopReason::Breakpoint(pc);
                self.state = RunState::Stopped;
                break;
            }
        }
        out
    }

    /// Leave `Running`/`Animating`.
    pub fn stop(&mut self) {
        self.state = RunState::Stopped;
    }

    /// Reset the simulator and return to `Stopped`.
    pub fn reset(&mut self) {
        self.sys.reset();
        self.state = RunState::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::WatchKind;
    use crate::{Fault, RamAddress};

    /// 000: LDM 1 ; 001: NOP ; 002: JUN 0x000
    fn looping() -> Scheduler {
        let mut m = Mcs4::new();
        m.load_program(0, &[0xD1, 0x00, 0x40, 0x00]).unwrap();
        Scheduler::new(m)
    }

    #[test]
    fn test_step_returns_to_stopped() {
        let mut s = looping();
        let r = s.step();
        assert_eq!(r.pc, 0);
        assert_eq!(s.state(), RunState::Stopped);
        assert_eq!(s.sys.pc(), 1);
    }

    #[test]
    fn test_run_budget() {
        let mut s = looping();
        let out = s.run(10, &[]);
        // 1 + 1 + 2 cycles per loop; stops once at least 10 are used
        assert_eq!(out.cycles, 10);
        assert_eq!(out.instructions, 8);
        assert_eq!(out.stop, StopReason::BudgetExhausted);
        assert_eq!(s.state(), RunState::Running);
        assert_eq!(s.sys.cycles(), 10);
    }

    #[test]
    fn test_run_zero_budget_does_nothing() {
        let mut s = looping();
        let out = s.run(0, &[]);
        assert_eq!(out.instructions, 0);
        assert_eq!(s.sys.pc(), 0);
    }

    #[test]
    fn test_run_budget_may_overshoot() {
        let mut s = looping();
        // 000 (1) + 001 (1) + JUN (2) reaches 4 when asked for 3
        let out = s.run(3, &[]);
        assert_eq!(out.cycles, 4);
    }

    #[test]
    fn test_run_stops_at_breakpoint() {
        let mut s = looping();
        let out = s.run(1000, &[0x002]);
        assert_eq!(out.stop, StopReason::Breakpoint(0x002));
        assert_eq!(out.instructions, 2);
        assert_eq!(s.state(), RunState::Stopped);
        // Resuming from the breakpoint makes progress
        let out = s.run(1000, &[0x002]);
        assert_eq!(out.stop, StopReason::Breakpoint(0x002));
        assert_eq!(out.instructions, 3);
    }

    #[test]
    fn test_run_stops_on_watchpoint() {
        // FIM P0, 0x00; SRC P0; LDM 5; WRM; JUN 0x000
        let mut m = Mcs4::new();
        m.load_program(0, &[0x20, 0x00, 0x21, 0xD5, 0xE0, 0x40, 0x00]).unwrap();
        m.debugger.add_watchpoint(RamAddress { bank: 0, group: 0, character: 0 }, WatchKind::Write);
        let mut s = Scheduler::new(m);
        let out = s.run(1000, &[]);
        match out.stop {
            StopReason::Watchpoint(hit) => assert_eq!(hit.new_val, 5),
            other => panic!("expected watchpoint, got {:?}", other),
        }
        assert_eq!(s.sys.pc(), 5);
        assert_eq!(s.state(), RunState::Stopped);
    }

    #[test]
    fn test_run_collects_diagnostics() {
        let mut m = Mcs4::new();
        m.load_program(0, &[0xFF, 0xC0, 0x00]).unwrap();
        let mut s = Scheduler::new(m);
        let out = s.run(3, &[]);
        assert_eq!(out.diagnostics.len(), 2);
        assert_eq!(out.diagnostics[0].fault, Fault::UnimplementedOpcode);
        assert_eq!(out.diagnostics[1].fault, Fault::StackUnderflow);
        // Still steppable
        s.step();
        assert_eq!(s.sys.pc(), 4);
    }

    #[test]
    fn test_animate_ticks() {
        let mut s = looping();
        assert!(s.tick(&[]).is_none());
        s.animate();
        assert_eq!(s.state(), RunState::Animating);
        let r = s.tick(&[]).unwrap();
        assert_eq!(r.pc, 0);
        s.tick(&[0x002]);
        assert_eq!(s.state(), RunState::Stopped);
        assert!(s.tick(&[]).is_none());
    }

    #[test]
    fn test_reset_returns_to_stopped() {
        let mut s = looping();
        s.run(10, &[]);
        s.reset();
        assert_eq!(s.state(), RunState::Stopped);
        assert_eq!(s.sys.pc(), 0);
        assert_eq!(s.sys.cycles(), 0);
        assert_eq!(s.sys.rom_byte(0), 0xD1);
    }

    #[test]
    fn test_stack_overflow_program() {
        // Four nested calls: 000 JMS 010, 010 JMS 020, 020 JMS 030, 030 JMS 040
        let mut m = Mcs4::new();
        for (at, target) in [(0x000u16, 0x10u8), (0x010, 0x20), (0x020, 0x30), (0x030, 0x40)] {
            m.load_program(at, &[0x50, target]).unwrap();
        }
        let mut s = Scheduler::new(m);
        for _ in 0..3 { assert!(s.step().diagnostic.is_none()); }
        let r = s.step();
        assert_eq!(r.diagnostic.map(|d| d.fault), Some(Fault::StackOverflow));
        assert_eq!(s.sys.pc(), 0x032);
        assert_eq!(s.sys.pc_level(1), 0x022);
        assert_eq!(s.sys.pc_level(2), 0x012);
        assert_eq!(s.sys.pc_level(3), 0x002);

        // Execution continues past the failed call and returns through the intact levels
        s.sys.set_rom_byte(0x032, 0xC7);
        let r = s.step();
        assert!(r.diagnostic.is_none());
        assert_eq!(s.sys.pc(), 0x022);
        assert_eq!(s.sys.stack_depth(), 2);
        assert_eq!(s.sys.accumulator(), 7);
    }
}
