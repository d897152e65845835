//! 4004 instruction disassembler.
//!
//! Converts decoded [`Instruction`] values back to assembly text for the
//! step debugger, register dumps and trace logging.

use crate::opcodes::{self, Instruction, OPCODE_TABLE};
use crate::ADDR_MASK;

/// Format a decoded instruction as an assembly string.
///
/// `pc` is the address the instruction was fetched from; it resolves the
/// in-page targets of JCN and ISZ, which are appended as a comment.
pub fn disassemble(inst: Instruction, pc: u16) -> String {
    let in_page = |addr: u8| (pc.wrapping_add(2) & ADDR_MASK & 0x0F00) | addr as u16;
    match inst {
        Instruction::Nop => "NOP".into(),
        Instruction::Jcn { cond, addr } => {
            format!("JCN {}, 0x{:02X}  ; 0x{:03X}", cond_name(cond), addr, in_page(addr))
        }
        Instruction::Fim { pair, data } => format!("FIM P{}, 0x{:02X}", pair, data),
        Instruction::Src { pair } => format!("SRC P{}", pair),
        Instruction::Fin { pair } => format!("FIN P{}", pair),
        Instruction::Jin { pair } => format!("JIN P{}", pair),
        Instruction::Jun { addr } => format!("JUN 0x{:03X}", addr),
        Instruction::Jms { addr } => format!("JMS 0x{:03X}", addr),
        Instruction::Inc { r } => format!("INC R{}", r),
        Instruction::Isz { r, addr } => {
            format!("ISZ R{}, 0x{:02X}  ; 0x{:03X}", r, addr, in_page(addr))
        }
        Instruction::Add { r } => format!("ADD R{}", r),
        Instruction::Sub { r } => format!("SUB R{}", r),
        Instruction::Ld { r }  => format!("LD R{}", r),
        Instruction::Xch { r } => format!("XCH R{}", r),
        Instruction::Bbl { n } => format!("BBL {}", n),
        Instruction::Ldm { n } => format!("LDM {}", n),
        Instruction::Wr { i } => format!("WR{}", i),
        Instruction::Rd { i } => format!("RD{}", i),
        Instruction::Unknown(op) => format!(".db 0x{:02X}", op),
        Instruction::Wrm => "WRM".into(),
        Instruction::Wmp => "WMP".into(),
        Instruction::Wrr => "WRR".into(),
        Instruction::Sbm => "SBM".into(),
        Instruction::Rdm => "RDM".into(),
        Instruction::Rdr => "RDR".into(),
        Instruction::Adm => "ADM".into(),
        Instruction::Clb => "CLB".into(),
        Instruction::Clc => "CLC".into(),
        Instruction::Iac => "IAC".into(),
        Instruction::Cmc => "CMC".into(),
        Instruction::Cma => "CMA".into(),
        Instruction::Ral => "RAL".into(),
        Instruction::Rar => "RAR".into(),
        Instruction::Tcc => "TCC".into(),
        Instruction::Dac => "DAC".into(),
        Instruction::Tcs => "TCS".into(),
        Instruction::Stc => "STC".into(),
        Instruction::Daa => "DAA".into(),
        Instruction::Kbp => "KBP".into(),
        Instruction::Dcl => "DCL".into(),
    }
}

/// Mnemonic of a JCN condition nibble, e.g. `AZ`, `NC`, `TZ`.
///
/// Bit 2 tests A == 0, bit 1 carry, bit 0 TEST low; bit 3 inverts.
/// Combinations without a standard name are printed numerically.
fn cond_name(cond: u8) -> String {
    let name = match cond {
        0x1 => "TZ",
        0x2 => "C1",
        0x4 => "AZ",
        0x9 => "TN",
        0xA => "C0",
        0xC => "AN",
        _ => return format!("{}", cond),
    };
    name.into()
}

/// Disassemble an opcode byte pair without a machine.
pub fn disassemble_bytes(opcode: u8, next: u8, pc: u16) -> String {
    let (inst, _) = opcodes::decode(opcode, next);
    disassemble(inst, pc)
}

/// Family mnemonic for an opcode byte.
pub fn mnemonic(opcode: u8) -> &'static str {
    OPCODE_TABLE[opcode as usize].mnemonic
}

/// Format the flags as "ct" (lowercase=clear, UPPER=set).
pub fn format_flags(carry: bool, test: bool) -> String {
    let mut s = String::with_capacity(2);
    s.push(if carry { 'C' } else { 'c' });
    s.push(if test { 'T' } else { 't' });
    s
}

/// Disassemble a range of ROM.
///
/// Returns lines of `"0xAAA: OP [OP]  MNEMONIC"`. A two-byte instruction
/// straddling `end` is still listed in full.
pub fn disassemble_range(rom: &[u8], start: usize, end: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let end = end.min(rom.len());
    let mut addr = start;
    while addr < end {
        let op = rom[addr];
        let next = rom.get(addr + 1).copied().unwrap_or(0);
        let (inst, size) = opcodes::decode(op, next);
        let asm = disassemble(inst, addr as u16);
        if size == 2 {
            lines.push(format!("0x{:03X}: {:02X} {:02X}  {}", addr, op, next, asm));
        } else {
            lines.push(format!("0x{:03X}: {:02X}     {}", addr, op, asm));
        }
        addr += size as usize;
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disasm_basic() {
        assert_eq!(disassemble(Instruction::Nop, 0), "NOP");
        assert_eq!(disassemble(Instruction::Add { r: 2 }, 0), "ADD R2");
        assert_eq!(disassemble(Instruction::Fim { pair: 1, data: 0x95 }, 0), "FIM P1, 0x95");
        assert_eq!(disassemble(Instruction::Jms { addr: 0x123 }, 0), "JMS 0x123");
        assert_eq!(disassemble(Instruction::Unknown(0xFE), 0), ".db 0xFE");
    }

    #[test]
    fn test_disasm_in_page_target() {
        let s = disassemble(Instruction::Jcn { cond: 4, addr: 0x10 }, 0x1FE);
        assert_eq!(s, "JCN AZ, 0x10  ; 0x210");
        let s = disassemble(Instruction::Isz { r: 3, addr: 0x40 }, 0x100);
        assert_eq!(s, "ISZ R3, 0x40  ; 0x140");
        let s = disassemble(Instruction::Jcn { cond: 6, addr: 0x00 }, 0);
        assert!(s.starts_with("JCN 6, "));
    }

    #[test]
    fn test_disassemble_bytes() {
        assert_eq!(disassemble_bytes(0xD7, 0, 0), "LDM 7");
        assert_eq!(disassemble_bytes(0x40, 0x20, 0), "JUN 0x020");
        assert_eq!(mnemonic(0xEC), "RD0");
    }

    #[test]
    fn test_accumulator_group_matches_table() {
        for op in 0xE0u8..=0xFD {
            let info = &crate::opcodes::OPCODE_TABLE[op as usize];
            if info.implemented {
                assert_eq!(disassemble_bytes(op, 0, 0), info.mnemonic, "opcode 0x{:02X}", op);
            }
        }
    }

    #[test]
    fn test_format_flags() {
        assert_eq!(format_flags(false, false), "ct");
        assert_eq!(format_flags(true, false), "Ct");
        assert_eq!(format_flags(true, true), "CT");
    }

    #[test]
    fn test_disassemble_range() {
        let rom = [0x20, 0x95, 0x21, 0xE0, 0x40];
        let lines = disassemble_range(&rom, 0, rom.len());
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "0x000: 20 95  FIM P0, 0x95");
        assert_eq!(lines[1], "0x002: 21     SRC P0");
        assert_eq!(lines[3], "0x004: 40 00  JUN 0x000");
    }
}
