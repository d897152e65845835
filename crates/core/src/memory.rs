//! MCS-4 memory subsystem.
//!
//! | Space           | Geometry                              |
//! |-----------------|---------------------------------------|
//! | Program ROM     | 4096 × 8-bit, addressed by the PC     |
//! | RAM characters  | 8 banks × 4 groups × 16 nibbles       |
//! | Status chars    | 8 banks × 4 groups × 4 nibbles        |
//! | RAM output port | one 4-bit latch per bank              |
//! | ROM I/O port    | 16 × 4-bit, one per ROM chip          |
//!
//! Data memory is not addressed by the PC. An SRC instruction latches an
//! 8-bit command into the [`AddressDecoder`], and the RAM instructions then
//! act on whatever location that command resolves to.

use serde::{Deserialize, Serialize};

use crate::{ADDR_MASK, NIBBLE_MASK, RAM_BANKS, RAM_CHARS, RAM_GROUPS, ROM_PORTS, ROM_SIZE, STATUS_CHARS};

/// Program ROM plus 4002-style data RAM and I/O latches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    /// Program memory
    pub rom: Vec<u8>,
    ram: [[[u8; RAM_CHARS]; RAM_GROUPS]; RAM_BANKS],
    status: [[[u8; STATUS_CHARS]; RAM_GROUPS]; RAM_BANKS],
    ports: [u8; RAM_BANKS],
    rom_ports: [u8; ROM_PORTS],
}

impl Memory {
    pub fn new() -> Self {
        Memory {
            rom: vec![0u8; ROM_SIZE],
            ram: [[[0; RAM_CHARS]; RAM_GROUPS]; RAM_BANKS],
            status: [[[0; STATUS_CHARS]; RAM_GROUPS]; RAM_BANKS],
            ports: [0; RAM_BANKS],
            rom_ports: [0; ROM_PORTS],
        }
    }

    /// Zero RAM, status characters and all ports. ROM is untouched.
    pub fn clear_data(&mut self) {
        self.ram = [[[0; RAM_CHARS]; RAM_GROUPS]; RAM_BANKS];
        self.status = [[[0; STATUS_CHARS]; RAM_GROUPS]; RAM_BANKS];
        self.ports = [0; RAM_BANKS];
        self.rom_ports = [0; ROM_PORTS];
    }

    // --- Program ROM ---

    #[inline(always)]
    pub fn read_rom(&self, addr: u16) -> u8 {
        self.rom[(addr & ADDR_MASK) as usize]
    }

    #[inline(always)]
    pub fn write_rom(&mut self, addr: u16, v: u8) {
        self.rom[(addr & ADDR_MASK) as usize] = v;
    }

    // --- RAM characters ---

    #[inline(always)]
    pub fn read_char(&self, bank: usize, group: usize, ch: usize) -> u8 {
        debug_assert!(bank < RAM_BANKS && group < RAM_GROUPS && ch < RAM_CHARS,
            "RAM address out of range: {}/{}/{}", bank, group, ch);
        self.ram[bank % RAM_BANKS][group % RAM_GROUPS][ch % RAM_CHARS]
    }

    #[inline(always)]
    pub fn write_char(&mut self, bank: usize, group: usize, ch: usize, v: u8) {
        debug_assert!(bank < RAM_BANKS && group < RAM_GROUPS && ch < RAM_CHARS,
            "RAM address out of range: {}/{}/{}", bank, group, ch);
        self.ram[bank % RAM_BANKS][group % RAM_GROUPS][ch % RAM_CHARS] = v & NIBBLE_MASK;
    }

    // --- Status characters ---

    pub fn read_status(&self, bank: usize, group: usize, index: usize) -> u8 {
        debug_assert!(bank < RAM_BANKS && group < RAM_GROUPS && index < STATUS_CHARS,
            "status address out of range: {}/{}/{}", bank, group, index);
        self.status[bank % RAM_BANKS][group % RAM_GROUPS][index % STATUS_CHARS]
    }

    pub fn write_status(&mut self, bank: usize, group: usize, index: usize, v: u8) {
        debug_assert!(bank < RAM_BANKS && group < RAM_GROUPS && index < STATUS_CHARS,
            "status address out of range: {}/{}/{}", bank, group, index);
        self.status[bank % RAM_BANKS][group % RAM_GROUPS][index % STATUS_CHARS] = v & NIBBLE_MASK;
    }

    // --- Ports ---

    /// Raw output latch of a RAM bank.
    pub fn port(&self, bank: usize) -> u8 {
        self.ports[bank % RAM_BANKS]
    }

    pub fn write_port(&mut self, bank: usize, v: u8) {
        self.ports[bank % RAM_BANKS] = v & NIBBLE_MASK;
    }

    /// Port read as seen by the CPU. In test mode the bank 1 latch answers
    /// regardless of which bank is selected.
    pub fn read_port(&self, bank: usize, test_mode: bool) -> u8 {
        if test_mode { self.ports[1] } else { self.port(bank) }
    }

    pub fn read_rom_port(&self, port: usize) -> u8 {
        self.rom_ports[port % ROM_PORTS]
    }

    pub fn write_rom_port(&mut self, port: usize, v: u8) {
        self.rom_ports[port % ROM_PORTS] = v & NIBBLE_MASK;
    }

    /// Restore invariants after deserializing: ROM is exactly 4 KB.
    pub fn normalize(&mut self) {
        self.rom.resize(ROM_SIZE, 0);
        for b in self.ram.iter_mut().flatten().flatten() { *b &= NIBBLE_MASK; }
        for b in self.status.iter_mut().flatten().flatten() { *b &= NIBBLE_MASK; }
        for b in self.ports.iter_mut().chain(self.rom_ports.iter_mut()) { *b &= NIBBLE_MASK; }
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolved data RAM location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RamAddress {
    pub bank: usize,
    pub group: usize,
    pub character: usize,
}

/// SRC command register and DCL bank lines.
///
/// Command layout: bits 7–6 pick one of four one-hot select lines
/// (`0001`, `0010`, `0100`, `1000`), bits 5–4 the register group and bits
/// 3–0 the character. DCL latches the bank-line pattern; anything other than
/// the reset pattern `0001` addresses the upper page of banks (4–7).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressDecoder {
    command: u8,
    lines: u8,
}

impl AddressDecoder {
    pub fn new() -> Self {
        AddressDecoder { command: 0, lines: 0b0001 }
    }

    /// Latch an SRC command value.
    #[inline(always)]
    pub fn select(&mut self, command: u8) {
        self.command = command;
    }

    /// Latch a DCL bank-line pattern.
    pub fn designate(&mut self, lines: u8) {
        self.lines = lines & NIBBLE_MASK;
    }

    /// Re-clamp the bank lines after loading from outside data.
    pub fn normalize(&mut self) {
        self.lines &= NIBBLE_MASK;
    }

    pub fn command(&self) -> u8 {
        self.command
    }

    pub fn bank_lines(&self) -> u8 {
        self.lines
    }

    /// One-hot select line driven by command bits 7–6.
    pub fn select_lines(&self) -> u8 {
        1 << (self.command >> 6)
    }

    pub fn resolve(&self, test_mode: bool) -> RamAddress {
        let mut bank = self.select_lines().trailing_zeros() as usize;
        if self.lines != 0b0001 {
            bank |= 4;
        }
        if test_mode {
            bank &= 1;
        }
        RamAddress {
            bank,
            group: ((self.command >> 4) & 3) as usize,
            character: (self.command & 0x0F) as usize,
        }
    }
}

impl Default for AddressDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_bank2_group1_char5() {
        let mut d = AddressDecoder::new();
        d.select(0b1001_0101);
        assert_eq!(d.select_lines(), 0b0100);
        assert_eq!(d.resolve(false), RamAddress { bank: 2, group: 1, character: 5 });
        assert_eq!(d.resolve(true), RamAddress { bank: 0, group: 1, character: 5 });
    }

    #[test]
    fn test_resolve_one_hot_lines() {
        let mut d = AddressDecoder::new();
        for (cmd, bank) in [(0x00, 0), (0x40, 1), (0x80, 2), (0xC0, 3)] {
            d.select(cmd);
            assert_eq!(d.resolve(false).bank, bank);
        }
    }

    #[test]
    fn test_upper_page_bit() {
        let mut d = AddressDecoder::new();
        d.select(0xC0);
        d.designate(2);
        assert_eq!(d.resolve(false).bank, 7);
        assert_eq!(d.resolve(true).bank, 1);
        d.designate(1);
        assert_eq!(d.resolve(false).bank, 3);
    }

    #[test]
    fn test_normalize_masks_bank_lines() {
        let mut d = AddressDecoder::new();
        d.lines = 0xF1;
        d.normalize();
        assert_eq!(d.bank_lines(), 0x1);
        d.select(0x40);
        assert_eq!(d.resolve(false).bank, 1);
    }

    #[test]
    fn test_char_masking() {
        let mut m = Memory::new();
        m.write_char(3, 2, 15, 0xFA);
        assert_eq!(m.read_char(3, 2, 15), 0xA);
        m.write_status(7, 3, 3, 0x19);
        assert_eq!(m.read_status(7, 3, 3), 0x9);
    }

    #[test]
    fn test_port_read_in_test_mode() {
        let mut m = Memory::new();
        m.write_port(1, 0x3);
        m.write_port(5, 0xC);
        assert_eq!(m.read_port(5, false), 0xC);
        assert_eq!(m.read_port(5, true), 0x3);
    }

    #[test]
    fn test_clear_data_keeps_rom() {
        let mut m = Memory::new();
        m.write_rom(0x10, 0xAB);
        m.write_char(0, 0, 0, 5);
        m.write_rom_port(2, 5);
        m.clear_data();
        assert_eq!(m.read_rom(0x10), 0xAB);
        assert_eq!(m.read_char(0, 0, 0), 0);
        assert_eq!(m.read_rom_port(2), 0);
    }

    #[test]
    fn test_normalize_resizes_rom() {
        let mut m = Memory::new();
        m.rom.truncate(10);
        m.normalize();
        assert_eq!(m.rom.len(), ROM_SIZE);
    }
}
