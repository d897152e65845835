//! Intel 4004 register file and instruction execution.
//!
//! The register file holds the 4-bit accumulator, the carry and TEST flags and
//! sixteen 4-bit index registers (R0–R15), which also act as eight 8-bit
//! register pairs P0–P7. The execute routine runs on [`Mcs4`] so handlers
//! can reach the PC stack, memory and address decoder together.
//!
//! All arithmetic is nibble arithmetic. Subtraction is performed as addition
//! of the one's complement with the inverted carry, so after SUB/SBM the carry
//! flag means "no borrow".

use serde::{Deserialize, Serialize};

use crate::debugger::WatchKind;
use crate::opcodes::Instruction;
use crate::{Fault, Mcs4, NIBBLE_MASK, REG_COUNT};

/// KBP result for each one-hot input nibble; anything else maps to 15.
const KBP_TABLE: [u8; 16] = [0, 1, 2, 15, 3, 15, 15, 15, 4, 15, 15, 15, 15, 15, 15, 15];

/// DCL bank-line pattern for `A & 7`.
const DCL_TABLE: [u8; 8] = [1, 2, 4, 3, 8, 10, 12, 14];

/// CPU register file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cpu {
    acc: u8,
    /// Carry / link flag
    pub carry: bool,
    /// External TEST input line
    pub test: bool,
    regs: [u8; REG_COUNT],
}

impl Cpu {
    pub fn new() -> Self {
        Cpu { acc: 0, carry: false, test: false, regs: [0; REG_COUNT] }
    }

    #[inline(always)]
    pub fn acc(&self) -> u8 {
        self.acc
    }

    /// Store into the accumulator. Carry is left alone.
    #[inline(always)]
    pub fn set_acc(&mut self, v: u8) {
        self.acc = v & NIBBLE_MASK;
    }

    #[inline(always)]
    pub fn reg(&self, r: u8) -> u8 {
        self.regs[(r & 0x0F) as usize]
    }

    #[inline(always)]
    pub fn set_reg(&mut self, r: u8, v: u8) {
        self.regs[(r & 0x0F) as usize] = v & NIBBLE_MASK;
    }

    /// Register pair `p` as a byte; the even register holds the high nibble.
    pub fn pair(&self, p: u8) -> u8 {
        let even = (p & 7) << 1;
        (self.reg(even) << 4) | self.reg(even + 1)
    }

    pub fn set_pair(&mut self, p: u8, v: u8) {
        let even = (p & 7) << 1;
        self.set_reg(even, v >> 4);
        self.set_reg(even + 1, v);
    }

    pub fn regs(&self) -> &[u8; REG_COUNT] {
        &self.regs
    }

    /// Re-clamp every nibble after loading from outside data.
    pub fn normalize(&mut self) {
        self.acc &= NIBBLE_MASK;
        for r in self.regs.iter_mut() {
            *r &= NIBBLE_MASK;
        }
    }

    /// Swap the accumulator with register `r`.
    pub fn exchange(&mut self, r: u8) {
        let old = self.reg(r);
        self.set_reg(r, self.acc);
        self.acc = old;
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

// --- ALU helpers ---

/// Add two nibbles with carry-in. Returns the 4-bit sum and the carry out of bit 3.
#[inline(always)]
pub fn add_nibble(a: u8, b: u8, carry_in: bool) -> (u8, bool) {
    let sum = (a & NIBBLE_MASK) as u16 + (b & NIBBLE_MASK) as u16 + carry_in as u16;
    ((sum & 0x0F) as u8, sum > 0x0F)
}

/// `a - b - borrow` as one's-complement addition. Carry out set means no borrow.
#[inline(always)]
pub fn sub_nibble(a: u8, b: u8, carry_in: bool) -> (u8, bool) {
    add_nibble(a, !b & NIBBLE_MASK, !carry_in)
}

impl Mcs4 {
    /// Execute a single decoded instruction.
    ///
    /// The PC is advanced past the instruction before the handler runs, so
    /// page-relative targets (JCN, ISZ, FIN, JIN) use the page of the next
    /// instruction. Faults are returned to the caller; the machine state is
    /// always left consistent.
    pub fn execute_inst(&mut self, inst: Instruction, size: u8) -> Result<(), Fault> {
        self.stack.advance(size as u16);

        match inst {
            Instruction::Nop => {}

            // -- Jumps and subroutines --
            Instruction::Jcn { cond, addr } => {
                let mut take = (cond & 4 != 0 && self.cpu.acc() == 0)
                    || (cond & 2 != 0 && self.cpu.carry)
                    || (cond & 1 != 0 && !self.test_input());
                if cond & 8 != 0 { take = !take; }
                if take { self.jump_in_page(addr); }
            }
            Instruction::Jin { pair } => {
                let low = self.cpu.pair(pair);
                self.jump_in_page(low);
            }
            Instruction::Jun { addr } => self.stack.jump(addr),
            Instruction::Jms { addr } => self.stack.call(addr)?,
            Instruction::Bbl { n } => {
                self.stack.ret()?;
                self.cpu.set_acc(n);
            }
            Instruction::Isz { r, addr } => {
                let v = self.cpu.reg(r).wrapping_add(1) & NIBBLE_MASK;
                self.cpu.set_reg(r, v);
                if v == 0 { self.jump_in_page(addr); }
            }

            // -- Register pairs --
            Instruction::Fim { pair, data } => self.cpu.set_pair(pair, data),
            Instruction::Src { pair } => self.decoder.select(self.cpu.pair(pair)),
            Instruction::Fin { pair } => {
                let addr = self.page() | self.cpu.pair(0) as u16;
                let v = self.mem.read_rom(addr);
                self.cpu.set_pair(pair, v);
            }

            // -- Index register operations --
            Instruction::Inc { r } => self.cpu.set_reg(r, self.cpu.reg(r).wrapping_add(1)),
            Instruction::Add { r } => {
                let (v, c) = add_nibble(self.cpu.acc(), self.cpu.reg(r), self.cpu.carry);
                self.cpu.set_acc(v);
                self.cpu.carry = c;
            }
            Instruction::Sub { r } => {
                let (v, c) = sub_nibble(self.cpu.acc(), self.cpu.reg(r), self.cpu.carry);
                self.cpu.set_acc(v);
                self.cpu.carry = c;
            }
            Instruction::Ld { r } => self.cpu.set_acc(self.cpu.reg(r)),
            Instruction::Xch { r } => self.cpu.exchange(r),
            Instruction::Ldm { n } => self.cpu.set_acc(n),

            // -- RAM and I/O --
            Instruction::Wrm => {
                let a = self.decoder.resolve(self.test_mode());
                let v = self.cpu.acc();
                let old = self.mem.read_char(a.bank, a.group, a.character);
                self.debugger.check_access(a, WatchKind::Write, old, v);
                self.mem.write_char(a.bank, a.group, a.character, v);
            }
            Instruction::Wmp => {
                let bank = self.decoder.resolve(self.test_mode()).bank;
                self.mem.write_port(bank, self.cpu.acc());
            }
            Instruction::Wrr => {
                let port = (self.decoder.command() >> 4) as usize;
                self.mem.write_rom_port(port, self.cpu.acc());
            }
            Instruction::Wr { i } => {
                let a = self.decoder.resolve(self.test_mode());
                self.mem.write_status(a.bank, a.group, i as usize, self.cpu.acc());
            }
            Instruction::Sbm => {
                let m = self.read_ram_char();
                let (v, c) = sub_nibble(self.cpu.acc(), m, self.cpu.carry);
                self.cpu.set_acc(v);
                self.cpu.carry = c;
            }
            Instruction::Rdm => {
                let m = self.read_ram_char();
                self.cpu.set_acc(m);
            }
            Instruction::Rdr => {
                let port = (self.decoder.command() >> 4) as usize;
                self.cpu.set_acc(self.mem.read_rom_port(port));
            }
            Instruction::Adm => {
                let m = self.read_ram_char();
                let (v, c) = add_nibble(self.cpu.acc(), m, self.cpu.carry);
                self.cpu.set_acc(v);
                self.cpu.carry = c;
            }
            Instruction::Rd { i } => {
                let a = self.decoder.resolve(self.test_mode());
                let v = self.mem.read_status(a.bank, a.group, i as usize);
                self.cpu.set_acc(v);
            }

            // -- Accumulator group --
            Instruction::Clb => {
                self.cpu.set_acc(0);
                self.cpu.carry = false;
            }
            Instruction::Clc => self.cpu.carry = false,
            Instruction::Iac => {
                let (v, c) = add_nibble(self.cpu.acc(), 1, false);
                self.cpu.set_acc(v);
                self.cpu.carry = c;
            }
            Instruction::Cmc => self.cpu.carry = !self.cpu.carry,
            Instruction::Cma => self.cpu.set_acc(!self.cpu.acc()),
            Instruction::Ral => {
                let a = self.cpu.acc();
                self.cpu.set_acc((a << 1) | self.cpu.carry as u8);
                self.cpu.carry = a & 0x08 != 0;
            }
            Instruction::Rar => {
                let a = self.cpu.acc();
                self.cpu.set_acc((a >> 1) | ((self.cpu.carry as u8) << 3));
                self.cpu.carry = a & 0x01 != 0;
            }
            Instruction::Tcc => {
                self.cpu.set_acc(self.cpu.carry as u8);
                self.cpu.carry = false;
            }
            Instruction::Dac => {
                let (v, c) = add_nibble(self.cpu.acc(), 0x0F, false);
                self.cpu.set_acc(v);
                self.cpu.carry = c;
            }
            Instruction::Tcs => {
                self.cpu.set_acc(9 + self.cpu.carry as u8);
                self.cpu.carry = false;
            }
            Instruction::Stc => self.cpu.carry = true,
            Instruction::Daa => {
                if self.cpu.acc() > 9 || self.cpu.carry {
                    let (v, c) = add_nibble(self.cpu.acc(), 6, false);
                    self.cpu.set_acc(v);
                    self.cpu.carry = c;
                }
            }
            Instruction::Kbp => {
                let v = KBP_TABLE[(self.cpu.acc() & NIBBLE_MASK) as usize];
                self.cpu.set_acc(v);
            }
            Instruction::Dcl => {
                let lines = DCL_TABLE[(self.cpu.acc() & 7) as usize];
                self.decoder.designate(lines);
            }

            Instruction::Unknown(_) => return Err(Fault::UnimplementedOpcode),
        }
        Ok(())
    }

    /// ROM page of the (already advanced) active PC.
    #[inline(always)]
    fn page(&self) -> u16 {
        self.stack.current() & 0x0F00
    }

    fn jump_in_page(&mut self, low: u8) {
        let target = self.page() | low as u16;
        self.stack.jump(target);
    }

    /// Read the RAM character selected by the command register.
    fn read_ram_char(&mut self) -> u8 {
        let a = self.decoder.resolve(self.test_mode());
        let v = self.mem.read_char(a.bank, a.group, a.character);
        self.debugger.check_access(a, WatchKind::Read, v, v);
        v
    }
}
