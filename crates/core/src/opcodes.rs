//! Intel 4004 instruction decoder.
//!
//! Every opcode is one byte `OPR OPA`: the high nibble selects the
//! instruction family, the low nibble carries a register, pair, condition or
//! immediate. Five families (JCN, FIM, JUN, JMS, ISZ) take a second byte.
//! [`decode`] turns the byte pair into a typed [`Instruction`], and
//! [`OPCODE_TABLE`] holds the static width/cycle/mnemonic data for all 256
//! opcodes.

/// Decoded 4004 instruction with operands.
///
/// `r` is an index register (0–15), `pair` a register pair (0–7), `n` a
/// 4-bit immediate and `addr` either an 8-bit in-page address or a full
/// 12-bit address for JUN/JMS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    // Two-byte
    Jcn { cond: u8, addr: u8 },
    Fim { pair: u8, data: u8 },
    Jun { addr: u16 },
    Jms { addr: u16 },
    Isz { r: u8, addr: u8 },
    // Pair operations
    Src { pair: u8 },
    Fin { pair: u8 },
    Jin { pair: u8 },
    // Index register
    Inc { r: u8 },
    Add { r: u8 },
    Sub { r: u8 },
    Ld { r: u8 },
    Xch { r: u8 },
    Bbl { n: u8 },
    Ldm { n: u8 },
    // RAM / I/O (0xE_)
    Wrm,
    Wmp,
    Wrr,
    Wr { i: u8 },
    Sbm,
    Rdm,
    Rdr,
    Adm,
    Rd { i: u8 },
    // Accumulator group (0xF_)
    Clb,
    Clc,
    Iac,
    Cmc,
    Cma,
    Ral,
    Rar,
    Tcc,
    Dac,
    Tcs,
    Stc,
    Daa,
    Kbp,
    Dcl,
    /// No handler; executes as a one-byte no-op and raises a fault
    Unknown(u8),
}

impl Instruction {
    /// Encoded size in bytes.
    pub fn width(&self) -> u8 {
        match self {
            Instruction::Jcn { .. }
            | Instruction::Fim { .. }
            | Instruction::Jun { .. }
            | Instruction::Jms { .. }
            | Instruction::Isz { .. } => 2,
            _ => 1,
        }
    }
}

/// Decode the opcode at the PC. `next` is the following ROM byte, used only
/// by two-byte instructions. Returns the instruction and its width.
pub fn decode(byte: u8, next: u8) -> (Instruction, u8) {
    let opr = byte >> 4;
    let opa = byte & 0x0F;
    let inst = match opr {
        0x0 if opa == 0 => Instruction::Nop,
        0x0 => Instruction::Unknown(byte),
        0x1 => Instruction::Jcn { cond: opa, addr: next },
        0x2 if opa & 1 == 0 => Instruction::Fim { pair: opa >> 1, data: next },
        0x2 => Instruction::Src { pair: opa >> 1 },
        0x3 if opa & 1 == 0 => Instruction::Fin { pair: opa >> 1 },
        0x3 => Instruction::Jin { pair: opa >> 1 },
        0x4 => Instruction::Jun { addr: ((opa as u16) << 8) | next as u16 },
        0x5 => Instruction::Jms { addr: ((opa as u16) << 8) | next as u16 },
        0x6 => Instruction::Inc { r: opa },
        0x7 => Instruction::Isz { r: opa, addr: next },
        0x8 => Instruction::Add { r: opa },
        0x9 => Instruction::Sub { r: opa },
        0xA => Instruction::Ld { r: opa },
        0xB => Instruction::Xch { r: opa },
        0xC => Instruction::Bbl { n: opa },
        0xD => Instruction::Ldm { n: opa },
        0xE => match opa {
            0x0 => Instruction::Wrm,
            0x1 => Instruction::Wmp,
            0x2 => Instruction::Wrr,
            0x4..=0x7 => Instruction::Wr { i: opa - 4 },
            0x8 => Instruction::Sbm,
            0x9 => Instruction::Rdm,
            0xA => Instruction::Rdr,
            0xB => Instruction::Adm,
            0xC..=0xF => Instruction::Rd { i: opa - 0xC },
            _ => Instruction::Unknown(byte), // E3: WPM needs 4008/4009
        },
        _ => match opa {
            0x0 => Instruction::Clb,
            0x1 => Instruction::Clc,
            0x2 => Instruction::Iac,
            0x3 => Instruction::Cmc,
            0x4 => Instruction::Cma,
            0x5 => Instruction::Ral,
            0x6 => Instruction::Rar,
            0x7 => Instruction::Tcc,
            0x8 => Instruction::Dac,
            0x9 => Instruction::Tcs,
            0xA => Instruction::Stc,
            0xB => Instruction::Daa,
            0xC => Instruction::Kbp,
            0xD => Instruction::Dcl,
            _ => Instruction::Unknown(byte),
        },
    };
    let size = inst.width();
    (inst, size)
}

/// Static data for one opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    /// Family mnemonic, or "???" for opcodes with no handler
    pub mnemonic: &'static str,
    /// Size in bytes (1 or 2)
    pub width: u8,
    /// Instruction cycles (8 clock periods each)
    pub cycles: u8,
    pub implemented: bool,
}

const E_GROUP: [&str; 16] = [
    "WRM", "WMP", "WRR", "???", "WR0", "WR1", "WR2", "WR3",
    "SBM", "RDM", "RDR", "ADM", "RD0", "RD1", "RD2", "RD3",
];

const F_GROUP: [&str; 16] = [
    "CLB", "CLC", "IAC", "CMC", "CMA", "RAL", "RAR", "TCC",
    "DAC", "TCS", "STC", "DAA", "KBP", "DCL", "???", "???",
];

const fn opcode_info(op: u8) -> OpcodeInfo {
    let opa = (op & 0x0F) as usize;
    let (mnemonic, width) = match op >> 4 {
        0x0 => (if opa == 0 { "NOP" } else { "???" }, 1),
        0x1 => ("JCN", 2),
        0x2 => if opa & 1 == 0 { ("FIM", 2) } else { ("SRC", 1) },
        0x3 => if opa & 1 == 0 { ("FIN", 1) } else { ("JIN", 1) },
        0x4 => ("JUN", 2),
        0x5 => ("JMS", 2),
        0x6 => ("INC", 1),
        0x7 => ("ISZ", 2),
        0x8 => ("ADD", 1),
        0x9 => ("SUB", 1),
        0xA => ("LD", 1),
        0xB => ("XCH", 1),
        0xC => ("BBL", 1),
        0xD => ("LDM", 1),
        0xE => (E_GROUP[opa], 1),
        _ => (F_GROUP[opa], 1),
    };
    let implemented = !(mnemonic.len() == 3
        && mnemonic.as_bytes()[0] == b'?');
    OpcodeInfo { mnemonic, width, cycles: width, implemented }
}

const fn build_table() -> [OpcodeInfo; 256] {
    let mut table = [OpcodeInfo { mnemonic: "???", width: 1, cycles: 1, implemented: false }; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = opcode_info(i as u8);
        i += 1;
    }
    table
}

/// Metadata for every opcode byte, indexed by opcode.
pub static OPCODE_TABLE: [OpcodeInfo; 256] = build_table();
