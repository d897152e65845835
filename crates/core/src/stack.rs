//! Program counter stack.
//!
//! The 4004 has no stack pointer and no stack in RAM. Four 12-bit address
//! registers live on chip: level 0 is the active program counter, levels 1–3
//! hold return addresses. A call shifts every level down by one, a return
//! shifts them back up.

use serde::{Deserialize, Serialize};

use crate::{Fault, ADDR_MASK, STACK_LEVELS};

/// Active PC plus three return levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcStack {
    levels: [u16; STACK_LEVELS],
    /// Number of return addresses currently held (0–3)
    depth: usize,
    /// Address width mask: 12 bits, or 8 bits in test mode
    mask: u16,
}

impl PcStack {
    pub fn new() -> Self {
        PcStack { levels: [0; STACK_LEVELS], depth: 0, mask: ADDR_MASK }
    }

    /// Clear all levels. The address width is kept.
    pub fn reset(&mut self) {
        self.levels = [0; STACK_LEVELS];
        self.depth = 0;
    }

    #[inline(always)]
    pub fn current(&self) -> u16 {
        self.levels[0]
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn levels(&self) -> &[u16; STACK_LEVELS] {
        &self.levels
    }

    /// Address held at `level`, or 0 for an out-of-range level.
    pub fn level(&self, level: usize) -> u16 {
        self.levels.get(level).copied().unwrap_or(0)
    }

    pub fn set_level(&mut self, level: usize, addr: u16) {
        if let Some(slot) = self.levels.get_mut(level) {
            *slot = addr & self.mask;
        }
    }

    pub fn address_mask(&self) -> u16 {
        self.mask
    }

    /// Change the address width. Saved return addresses are narrowed too.
    pub fn set_address_mask(&mut self, mask: u16) {
        self.mask = mask;
        for level in self.levels.iter_mut() {
            *level &= mask;
        }
    }

    /// Re-clamp levels and depth after loading from outside data.
    pub fn normalize(&mut self) {
        self.mask &= ADDR_MASK;
        self.depth = self.depth.min(STACK_LEVELS - 1);
        for level in self.levels.iter_mut() {
            *level &= self.mask;
        }
    }

    /// Load the active PC.
    #[inline(always)]
    pub fn jump(&mut self, addr: u16) {
        self.levels[0] = addr & self.mask;
    }

    /// Move the active PC forward by `n` bytes, wrapping at the address width.
    #[inline(always)]
    pub fn advance(&mut self, n: u16) {
        self.levels[0] = self.levels[0].wrapping_add(n) & self.mask;
    }

    /// Push the active PC and transfer control to `target`.
    ///
    /// With all three return levels in use the call does not transfer
    /// control; the PC stays where it is (already past the operand).
    pub fn call(&mut self, target: u16) -> Result<(), Fault> {
        if self.depth == STACK_LEVELS - 1 {
            return Err(Fault::StackOverflow);
        }
        self.levels.copy_within(0..STACK_LEVELS - 1, 1);
        self.levels[0] = target & self.mask;
        self.depth += 1;
        Ok(())
    }

    /// Pop the most recent return address into the active PC.
    pub fn ret(&mut self) -> Result<(), Fault> {
        if self.depth == 0 {
            return Err(Fault::StackUnderflow);
        }
        self.levels.copy_within(1..STACK_LEVELS, 0);
        self.levels[0] &= self.mask;
        self.levels[STACK_LEVELS - 1] = 0;
        self.depth -= 1;
        Ok(())
    }
}

impl Default for PcStack {
    fn default() -> Self {
        Self::new()
    }
}
