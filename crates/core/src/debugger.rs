//! Debugging facilities.
//!
//! - **RAM Viewer**: nibble dump of one bank's characters and status characters
//! - **Port Viewer**: RAM output latches and ROM I/O ports
//! - **Watchpoints**: trigger on RAM character reads/writes at a resolved address
//!
//! Watchpoints are checked by the WRM, RDM, ADM and SBM handlers.

use crate::memory::{Memory, RamAddress};
use crate::{RAM_BANKS, RAM_CHARS, RAM_GROUPS, ROM_PORTS, STATUS_CHARS};

/// Watchpoint trigger type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    Write,
    Read,
    ReadWrite,
}

/// A RAM character watchpoint.
#[derive(Debug, Clone)]
pub struct Watchpoint {
    pub addr: RamAddress,
    pub kind: WatchKind,
    /// Only trigger when a write stores this value
    pub value_match: Option<u8>,
    pub hits: u64,
    pub enabled: bool,
}

/// Watchpoint trigger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchHit {
    /// Watchpoint index
    pub index: usize,
    pub addr: RamAddress,
    /// Old value (for writes) or current value (for reads)
    pub old_val: u8,
    /// New value (for writes, same as old for reads)
    pub new_val: u8,
    /// Access kind that triggered
    pub access: WatchKind,
}

/// Debugger state.
pub struct Debugger {
    pub watchpoints: Vec<Watchpoint>,
    /// First unconsumed watchpoint hit; the scheduler stops on it
    pub watch_hit: Option<WatchHit>,
}

impl Debugger {
    pub fn new() -> Self {
        Debugger {
            watchpoints: Vec::new(),
            watch_hit: None,
        }
    }

    /// Add a watchpoint. Returns its index.
    pub fn add_watchpoint(&mut self, addr: RamAddress, kind: WatchKind) -> usize {
        let idx = self.watchpoints.len();
        self.watchpoints.push(Watchpoint {
            addr, kind, value_match: None, hits: 0, enabled: true,
        });
        idx
    }

    pub fn remove_watchpoint(&mut self, idx: usize) -> bool {
        if idx < self.watchpoints.len() {
            self.watchpoints.remove(idx);
            true
        } else { false }
    }

    /// Check watchpoints for an access. For reads pass the current value twice.
    #[inline]
    pub fn check_access(&mut self, addr: RamAddress, access: WatchKind, old_val: u8, new_val: u8) {
        if self.watchpoints.is_empty() { return; }
        for (i, wp) in self.watchpoints.iter_mut().enumerate() {
            if !wp.enabled || wp.addr != addr { continue; }
            let kind_ok = match access {
                WatchKind::Write => wp.kind != WatchKind::Read,
                _ => wp.kind != WatchKind::Write,
            };
            if !kind_ok { continue; }
            if access == WatchKind::Write {
                if let Some(v) = wp.value_match {
                    if new_val != v { continue; }
                }
            }
            wp.hits += 1;
            if self.watch_hit.is_none() {
                log::debug!("watchpoint {} hit at {}/{}/{}", i, addr.bank, addr.group, addr.character);
                self.watch_hit = Some(WatchHit { index: i, addr, old_val, new_val, access });
            }
        }
    }

    /// Take pending watchpoint hit (returns and clears it).
    pub fn take_hit(&mut self) -> Option<WatchHit> {
        self.watch_hit.take()
    }

    pub fn list_watchpoints(&self) -> String {
        if self.watchpoints.is_empty() { return "No watchpoints set.\n".into(); }
        let mut s = String::new();
        for (i, wp) in self.watchpoints.iter().enumerate() {
            let k = match wp.kind {
                WatchKind::Write => "W",
                WatchKind::Read => "R",
                WatchKind::ReadWrite => "RW",
            };
            let en = if wp.enabled { " " } else { "!" };
            let vm = match wp.value_match {
                Some(v) => format!(" ={:X}", v),
                None => String::new(),
            };
            s.push_str(&format!("  [{}]{} bank {} group {} char {:2} {}  hits={}{}\n",
                i, en, wp.addr.bank, wp.addr.group, wp.addr.character, k, wp.hits, vm));
        }
        s
    }
}

impl Default for Debugger {
    fn default() -> Self { Self::new() }
}

// --- RAM Viewer ---

/// Dump one bank: a row per register group with 16 characters and 4 status
/// characters, e.g. `G0: 0123456789ABCDEF  S: 0000`.
pub fn dump_ram(mem: &Memory, bank: usize) -> String {
    let bank = bank % RAM_BANKS;
    let mut s = format!("Bank {}\n", bank);
    for g in 0..RAM_GROUPS {
        s.push_str(&format!("  G{}: ", g));
        for c in 0..RAM_CHARS {
            s.push_str(&format!("{:X}", mem.read_char(bank, g, c)));
        }
        s.push_str("  S: ");
        for i in 0..STATUS_CHARS {
            s.push_str(&format!("{:X}", mem.read_status(bank, g, i)));
        }
        s.push('\n');
    }
    s
}

/// Dump RAM output latches and ROM I/O ports.
pub fn dump_ports(mem: &Memory) -> String {
    let mut s = String::from("RAM ports: ");
    for b in 0..RAM_BANKS {
        s.push_str(&format!("{:X}", mem.port(b)));
    }
    s.push_str("\nROM ports: ");
    for p in 0..ROM_PORTS {
        s.push_str(&format!("{:X}", mem.read_rom_port(p)));
    }
    s.push('\n');
    s
}
