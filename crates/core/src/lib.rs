//! # mcs4-core
//!
//! Instruction-stepped simulation core for the Intel 4004 (MCS-4) microprocessor.
//!
//! Emulates the 4-bit CPU with its accumulator, carry and TEST flags, sixteen
//! index registers, a four-level program counter stack, up to 4 KB of program
//! ROM, and banked 4002-style data RAM with status characters and output ports.
//! Instructions are fetched from ROM, decoded into a typed [`opcodes::Instruction`]
//! and executed atomically; the caller drives execution one instruction or one
//! cycle budget at a time.
//!
//! ## Architecture
//!
//! - [`Mcs4`]: Aggregate simulator state owning CPU, stack, memory and decoder
//! - [`Cpu`]: Register file: accumulator, carry, TEST line, R0–R15
//! - [`PcStack`]: Active program counter plus three return levels
//! - [`Memory`]: Program ROM, RAM characters, status characters, I/O latches
//! - [`AddressDecoder`]: SRC command register and DCL bank lines
//! - [`opcodes`]: 256-entry opcode table and byte decoder
//! - [`scheduler`]: Single-step, animate and budgeted run control
//! - [`disasm`]: Instruction disassembler for debug views
//! - [`hex`]: Hex-dump program loader with `*=$ADDR` origins
//! - [`debugger`]: RAM watchpoints and memory dump views
//! - [`profiler`]: PC histogram and call graph
//! - [`snapshot`]: Full-state snapshots and rewind buffer
//!
//! ## Faults
//!
//! Stack overflow, stack underflow and unimplemented opcodes never stop the
//! simulator. Each one is reported as a [`Diagnostic`] alongside the step that
//! raised it and is kept in [`Mcs4::diagnostics`] until the next [`Mcs4::reset`].

pub mod cpu;
pub mod stack;
pub mod memory;
pub mod opcodes;
pub mod disasm;
pub mod hex;
pub mod scheduler;
pub mod debugger;
pub mod profiler;
pub mod snapshot;


use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use cpu::Cpu;
pub use hex::LoadError;
pub use memory::{AddressDecoder, Memory, RamAddress};
pub use scheduler::{RunOutcome, RunState, Scheduler, StopReason};
pub use snapshot::Snapshot;
pub use stack::PcStack;

/// Program ROM size: 4096 bytes (12-bit address space)
pub const ROM_SIZE: usize = 4096;
/// Program counter mask in normal operation (12 bits)
pub const ADDR_MASK: u16 = 0x0FFF;
/// Program counter mask while test mode is active (8 bits)
pub const TEST_ADDR_MASK: u16 = 0x00FF;
/// Number of addressable RAM banks (two pages of four)
pub const RAM_BANKS: usize = 8;
/// Register groups per bank
pub const RAM_GROUPS: usize = 4;
/// Main memory characters per register group
pub const RAM_CHARS: usize = 16;
/// Status characters per register group
pub const STATUS_CHARS: usize = 4;
/// ROM I/O ports, selected by the high nibble of the command register
pub const ROM_PORTS: usize = 16;
/// Number of index registers (R0–R15)
pub const REG_COUNT: usize = 16;
/// Program counter stack levels, including the active PC
pub const STACK_LEVELS: usize = 4;
/// Every register, flag-free memory cell and port holds one nibble
pub const NIBBLE_MASK: u8 = 0x0F;
/// CPU clock frequency: 740 kHz
pub const CLOCK_HZ: u32 = 740_000;
/// Clock periods per instruction cycle
pub const CLOCKS_PER_CYCLE: u32 = 8;

/// Diagnostics kept by [`Mcs4`] before the oldest are discarded.
const MAX_DIAGNOSTICS: usize = 256;

/// Non-fatal execution fault raised by an instruction handler.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fault {
    /// JMS with all three return levels in use. Control is not transferred.
    #[error("call stack overflow")]
    StackOverflow,
    /// BBL with no return address on the stack. The accumulator is untouched.
    #[error("return with empty call stack")]
    StackUnderflow,
    /// Opcode has no handler; executed as a one-byte no-op.
    #[error("unimplemented opcode")]
    UnimplementedOpcode,
}

/// A fault together with where it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub fault: Fault,
    /// Address of the faulting instruction
    pub pc: u16,
    pub opcode: u8,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at 0x{:03X} (opcode 0x{:02X})", self.fault, self.pc, self.opcode)
    }
}

/// Result of executing exactly one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepResult {
    /// Address the instruction was fetched from
    pub pc: u16,
    pub opcode: u8,
    /// Instruction cycles consumed
    pub cycles: u8,
    pub diagnostic: Option<Diagnostic>,
}

/// Complete MCS-4 simulator state.
///
/// All mutation during execution goes through the instruction handlers in
/// [`cpu`]; the accessor methods below form the inspection API used by host
/// panels and apply the same nibble/address clamping as the handlers.
pub struct Mcs4 {
    pub cpu: Cpu,
    pub stack: PcStack,
    pub mem: Memory,
    pub decoder: AddressDecoder,
    /// Monotonic instruction-cycle counter since reset
    pub tick: u64,
    /// Reduced addressing mode driven by an external input
    test_mode: bool,
    diagnostics: VecDeque<Diagnostic>,
    pub profiler: profiler::Profiler,
    pub debugger: debugger::Debugger,
}

impl Mcs4 {
    pub fn new() -> Self {
        Mcs4 {
            cpu: Cpu::new(),
            stack: PcStack::new(),
            mem: Memory::new(),
            decoder: AddressDecoder::new(),
            tick: 0,
            test_mode: false,
            diagnostics: VecDeque::new(),
            profiler: profiler::Profiler::new(),
            debugger: debugger::Debugger::new(),
        }
    }

    /// Power-on reset.
    ///
    /// Clears registers, flags, the PC stack, RAM, status characters, ports,
    /// the command register and the cycle counter. ROM contents, the test-mode
    /// input, watchpoints and the profiler are preserved.
    pub fn reset(&mut self) {
        self.cpu = Cpu::new();
        self.stack.reset();
        self.mem.clear_data();
        self.decoder = AddressDecoder::new();
        self.tick = 0;
        self.diagnostics.clear();
        self.debugger.watch_hit = None;
        log::debug!("reset (test mode {})", self.test_mode);
    }

    /// True once any instruction has executed since the last reset.
    pub fn program_active(&self) -> bool {
        self.tick > 0
    }

    /// Load a textual hex dump into ROM. See [`hex::parse_hex_dump`].
    ///
    /// Refused while a program is active; reset first.
    pub fn load_hex(&mut self, text: &str) -> Result<usize, LoadError> {
        if self.program_active() {
            return Err(LoadError::ProgramActive);
        }
        let size = hex::parse_hex_dump(text, &mut self.mem.rom)?;
        log::debug!("loaded {} bytes from hex dump", size);
        Ok(size)
    }

    /// Copy raw program bytes into ROM starting at `origin`, wrapping at the end of ROM.
    pub fn load_program(&mut self, origin: u16, bytes: &[u8]) -> Result<usize, LoadError> {
        if self.program_active() {
            return Err(LoadError::ProgramActive);
        }
        for (i, &b) in bytes.iter().enumerate() {
            self.mem.write_rom(origin.wrapping_add(i as u16), b);
        }
        Ok(bytes.len())
    }

    /// Fetch, decode and execute the instruction at the active PC.
    pub fn step(&mut self) -> StepResult {
        let pc = self.stack.current();
        let opcode = self.mem.read_rom(pc);
        let next = self.mem.read_rom(pc.wrapping_add(1) & self.stack.address_mask());
        let (inst, size) = opcodes::decode(opcode, next);

        if self.profiler.enabled {
            self.profiler.record(pc);
            if let opcodes::Instruction::Jms { addr } = inst {
                self.profiler.record_call(pc, addr);
            }
        }
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("0x{:03X}: {}", pc, disasm::disassemble(inst, pc));
        }

        let cycles = opcodes::OPCODE_TABLE[opcode as usize].cycles;
        let diagnostic = match self.execute_inst(inst, size) {
            Ok(()) => None,
            Err(fault) => {
                let d = Diagnostic { fault, pc, opcode };
                log::warn!("{}", d);
                if self.diagnostics.len() == MAX_DIAGNOSTICS {
                    self.diagnostics.pop_front();
                }
                self.diagnostics.push_back(d);
                Some(d)
            }
        };
        self.tick += cycles as u64;

        StepResult { pc, opcode, cycles, diagnostic }
    }

    /// Faults raised since the last reset, oldest first.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub(crate) fn clear_diagnostics(&mut self) {
        self.diagnostics.clear();
    }

    /// Most recent fault, if any.
    pub fn last_diagnostic(&self) -> Option<&Diagnostic> {
        self.diagnostics.back()
    }

    /// Effective TEST input seen by JCN.
    ///
    /// In test mode the external line is replaced by bit 0 of the RAM port read.
    pub fn test_input(&self) -> bool {
        if self.test_mode {
            let bank = self.decoder.resolve(true).bank;
            self.mem.read_port(bank, true) & 1 != 0
        } else {
            self.cpu.test
        }
    }

    pub fn test_mode(&self) -> bool {
        self.test_mode
    }

    /// Switch test mode. Narrows the PC to 8 bits and RAM banks to 0/1.
    pub fn set_test_mode(&mut self, on: bool) {
        self.test_mode = on;
        self.stack.set_address_mask(if on { TEST_ADDR_MASK } else { ADDR_MASK });
    }

    // --- Inspection API ---

    pub fn accumulator(&self) -> u8 { self.cpu.acc() }
    pub fn set_accumulator(&mut self, v: u8) { self.cpu.set_acc(v); }
    pub fn carry(&self) -> bool { self.cpu.carry }
    pub fn set_carry(&mut self, c: bool) { self.cpu.carry = c; }
    pub fn test_pin(&self) -> bool { self.cpu.test }
    pub fn set_test_pin(&mut self, t: bool) { self.cpu.test = t; }
    pub fn register(&self, r: u8) -> u8 { self.cpu.reg(r) }
    pub fn set_register(&mut self, r: u8, v: u8) { self.cpu.set_reg(r, v); }
    pub fn pair(&self, p: u8) -> u8 { self.cpu.pair(p) }
    pub fn set_pair(&mut self, p: u8, v: u8) { self.cpu.set_pair(p, v); }

    /// Active program counter
    pub fn pc(&self) -> u16 { self.stack.current() }
    pub fn set_pc(&mut self, addr: u16) { self.stack.jump(addr); }
    pub fn pc_level(&self, level: usize) -> u16 { self.stack.level(level) }
    pub fn set_pc_level(&mut self, level: usize, addr: u16) { self.stack.set_level(level, addr); }
    pub fn stack_depth(&self) -> usize { self.stack.depth() }

    pub fn ram_char(&self, bank: usize, group: usize, ch: usize) -> u8 {
        self.mem.read_char(bank, group, ch)
    }
    pub fn set_ram_char(&mut self, bank: usize, group: usize, ch: usize, v: u8) {
        self.mem.write_char(bank, group, ch, v);
    }
    pub fn status_char(&self, bank: usize, group: usize, index: usize) -> u8 {
        self.mem.read_status(bank, group, index)
    }
    pub fn set_status_char(&mut self, bank: usize, group: usize, index: usize, v: u8) {
        self.mem.write_status(bank, group, index, v);
    }
    /// Raw RAM output latch of `bank`, without the test-mode substitution.
    pub fn port(&self, bank: usize) -> u8 { self.mem.port(bank) }
    pub fn set_port(&mut self, bank: usize, v: u8) { self.mem.write_port(bank, v); }
    pub fn rom_port(&self, port: usize) -> u8 { self.mem.read_rom_port(port) }
    pub fn set_rom_port(&mut self, port: usize, v: u8) { self.mem.write_rom_port(port, v); }
    pub fn rom_byte(&self, addr: u16) -> u8 { self.mem.read_rom(addr) }
    pub fn set_rom_byte(&mut self, addr: u16, v: u8) { self.mem.write_rom(addr, v); }
    pub fn command(&self) -> u8 { self.decoder.command() }
    pub fn set_command(&mut self, v: u8) { self.decoder.select(v); }
    pub fn bank_lines(&self) -> u8 { self.decoder.bank_lines() }
    pub fn set_bank_lines(&mut self, v: u8) { self.decoder.designate(v); }

    /// Total instruction cycles since reset.
    pub fn cycles(&self) -> u64 { self.tick }

    /// Disassemble the instruction at the current PC without executing it.
    pub fn disasm_at_pc(&self) -> String {
        let pc = self.stack.current();
        let op = self.mem.read_rom(pc);
        let next = self.mem.read_rom(pc.wrapping_add(1) & self.stack.address_mask());
        let (inst, _) = opcodes::decode(op, next);
        format!("0x{:03X}: {}", pc, disasm::disassemble(inst, pc))
    }

    /// Format a register dump with accumulator, flags, R0–R15, stack and decoder state.
    pub fn dump_regs(&self) -> String {
        let mut s = format!("A={:X} {} PC={:03X}", self.cpu.acc(),
            disasm::format_flags(self.cpu.carry, self.cpu.test), self.stack.current());
        for (i, level) in self.stack.levels().iter().enumerate().skip(1) {
            let mark = if i <= self.stack.depth() { ' ' } else { '-' };
            s.push_str(&format!(" S{}={:03X}{}", i, level, mark));
        }
        s.push('\n');
        for r in 0..REG_COUNT as u8 {
            if r > 0 && r % 8 == 0 { s.push('\n'); }
            s.push_str(&format!("R{:<2}={:X} ", r, self.cpu.reg(r)));
        }
        let addr = self.decoder.resolve(self.test_mode);
        s.push_str(&format!("\nSRC={:02X} DCL={:04b} -> bank {} group {} char {}  cycles={}",
            self.decoder.command(), self.decoder.bank_lines(),
            addr.bank, addr.group, addr.character, self.tick));
        s
    }

    /// Profiler report with hotspot disassembly.
    pub fn profiler_report(&self) -> String {
        self.profiler.report(&self.mem.rom)
    }
}

impl Default for Mcs4 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim_with(program: &[u8]) -> Mcs4 {
        let mut m = Mcs4::new();
        m.load_program(0, program).unwrap();
        m
    }

    #[test]
    fn test_power_on_state() {
        let m = Mcs4::new();
        assert_eq!(m.accumulator(), 0);
        assert!(!m.carry());
        assert!(!m.test_pin());
        assert_eq!(m.pc(), 0);
        assert_eq!(m.stack_depth(), 0);
        assert_eq!(m.cycles(), 0);
        assert!(!m.program_active());
    }

    #[test]
    fn test_reset_idempotent() {
        let mut m = sim_with(&[0xD7, 0x22, 0x95, 0x21, 0xE0, 0xE4, 0xE1, 0xFA, 0x53, 0x00]);
        for _ in 0..8 { m.step(); }
        m.set_test_pin(true);
        m.reset();
        let once = Snapshot::capture(&m);
        m.reset();
        let twice = Snapshot::capture(&m);
        assert_eq!(once, twice);
        assert_eq!(m.accumulator(), 0);
        assert!(!m.carry());
        assert!(!m.test_pin());
        assert_eq!(*m.stack.levels(), [0, 0, 0, 0]);
        for b in 0..RAM_BANKS {
            assert_eq!(m.port(b), 0);
            for g in 0..RAM_GROUPS {
                for c in 0..RAM_CHARS { assert_eq!(m.ram_char(b, g, c), 0); }
                for i in 0..STATUS_CHARS { assert_eq!(m.status_char(b, g, i), 0); }
            }
        }
        // ROM survives reset
        assert_eq!(m.rom_byte(0), 0xD7);
    }

    #[test]
    fn test_load_refused_while_active() {
        let mut m = sim_with(&[0x00, 0x00]);
        m.step();
        assert!(matches!(m.load_hex("D5"), Err(LoadError::ProgramActive)));
        assert!(matches!(m.load_program(0, &[1]), Err(LoadError::ProgramActive)));
        m.reset();
        assert_eq!(m.load_hex("D5 F2").unwrap(), 2);
        assert_eq!(m.rom_byte(1), 0xF2);
    }

    #[test]
    fn test_load_program_wraps() {
        let mut m = Mcs4::new();
        m.load_program(0xFFF, &[0xAA, 0xBB]).unwrap();
        assert_eq!(m.rom_byte(0xFFF), 0xAA);
        assert_eq!(m.rom_byte(0x000), 0xBB);
    }

    #[test]
    fn test_step_reports_cycles() {
        let mut m = sim_with(&[0xD3, 0x40, 0x00]);
        let r = m.step();
        assert_eq!(r.pc, 0);
        assert_eq!(r.opcode, 0xD3);
        assert_eq!(r.cycles, 1);
        let r = m.step();
        assert_eq!(r.cycles, 2);
        assert_eq!(m.cycles(), 3);
    }

    #[test]
    fn test_unimplemented_is_fail_soft() {
        let mut m = sim_with(&[0xFE, 0xD4]);
        let r = m.step();
        let d = r.diagnostic.unwrap();
        assert_eq!(d.fault, Fault::UnimplementedOpcode);
        assert_eq!(d.pc, 0);
        assert_eq!(d.opcode, 0xFE);
        assert_eq!(m.pc(), 1);
        m.step();
        assert_eq!(m.accumulator(), 4);
        assert_eq!(m.diagnostics().count(), 1);
        m.reset();
        assert_eq!(m.diagnostics().count(), 0);
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic { fault: Fault::StackOverflow, pc: 0x1A, opcode: 0x50 };
        assert_eq!(d.to_string(), "call stack overflow at 0x01A (opcode 0x50)");
    }

    #[test]
    fn test_diagnostics_bounded() {
        let mut m = sim_with(&[0xFF; ROM_SIZE]);
        for _ in 0..(MAX_DIAGNOSTICS + 10) { m.step(); }
        assert_eq!(m.diagnostics().count(), MAX_DIAGNOSTICS);
    }

    #[test]
    fn test_mode_narrows_pc() {
        let mut m = Mcs4::new();
        m.set_test_mode(true);
        m.set_pc(0x0FF);
        m.step(); // NOP at 0xFF
        assert_eq!(m.pc(), 0x000);
        m.set_test_mode(false);
        m.set_pc(0x0FF);
        m.step();
        assert_eq!(m.pc(), 0x100);
    }

    #[test]
    fn test_mode_return_stays_in_narrow_width() {
        // 000: BBL 0 ; 002: LDM 3 ; 100: JMS 0x300 ; 102: LDM 9
        let mut m = sim_with(&[0xC0, 0x00, 0xD3]);
        m.load_program(0x100, &[0x53, 0x00, 0xD9]).unwrap();
        m.set_pc(0x100);
        m.step();
        assert_eq!(m.pc(), 0x300);
        m.set_test_mode(true);
        assert_eq!(m.pc(), 0x000);
        m.step();
        assert_eq!(m.pc(), 0x002);
        m.step();
        assert_eq!(m.accumulator(), 3);
    }

    #[test]
    fn test_input_in_test_mode_reads_bank1_port() {
        let mut m = Mcs4::new();
        m.set_test_pin(true);
        assert!(m.test_input());
        m.set_test_mode(true);
        assert!(!m.test_input());
        m.set_port(1, 0x1);
        assert!(m.test_input());
    }

    #[test]
    fn test_inspection_setters_clamp() {
        let mut m = Mcs4::new();
        m.set_accumulator(0x1F);
        assert_eq!(m.accumulator(), 0xF);
        m.set_register(3, 0xAB);
        assert_eq!(m.register(3), 0xB);
        m.set_ram_char(7, 3, 15, 0x35);
        assert_eq!(m.ram_char(7, 3, 15), 0x5);
        m.set_status_char(2, 1, 3, 0x2C);
        assert_eq!(m.status_char(2, 1, 3), 0xC);
        m.set_port(4, 0xF9);
        assert_eq!(m.port(4), 0x9);
        m.set_pc(0x1234);
        assert_eq!(m.pc(), 0x234);
        m.set_pc_level(2, 0xFFFF);
        assert_eq!(m.pc_level(2), 0xFFF);
        m.set_bank_lines(0x3F);
        assert_eq!(m.bank_lines(), 0xF);
    }

    #[test]
    fn test_dump_regs() {
        let mut m = Mcs4::new();
        m.set_accumulator(0xA);
        m.set_register(15, 7);
        let s = m.dump_regs();
        assert!(s.contains("A=A"));
        assert!(s.contains("R15=7"));
        assert!(s.contains("SRC=00"));
    }
}
