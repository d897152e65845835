//! Execution profiler for 4004 programs.
//!
//! Tracks instruction-level execution statistics:
//! - Per-address hit counts (PC histogram)
//! - Total instruction and cycle counts
//! - Hotspots with disassembly
//! - Call edges (JMS caller and target)
//!
//! Off by default. [`Mcs4::step`](crate::Mcs4::step) only feeds it when
//! `enabled` is set.

use std::collections::HashMap;

use crate::disasm;

/// Execution profiler state.
pub struct Profiler {
    /// Whether profiling is currently active
    pub enabled: bool,
    /// Per-PC hit counts
    pc_hits: HashMap<u16, u64>,
    /// Total instructions executed while profiling
    pub total_instructions: u64,
    /// Total instruction cycles elapsed while profiling
    pub total_cycles: u64,
    start_tick: u64,
    /// (caller_pc, callee_pc) → count
    call_graph: HashMap<(u16, u16), u64>,
}

impl Profiler {
    pub fn new() -> Self {
        Profiler {
            enabled: false,
            pc_hits: HashMap::new(),
            total_instructions: 0,
            total_cycles: 0,
            start_tick: 0,
            call_graph: HashMap::new(),
        }
    }

    /// Start or restart profiling, clearing all accumulated data.
    pub fn start(&mut self, tick: u64) {
        self.pc_hits.clear();
        self.call_graph.clear();
        self.total_instructions = 0;
        self.total_cycles = 0;
        self.start_tick = tick;
        self.enabled = true;
    }

    /// Stop profiling, finalize cycle count.
    pub fn stop(&mut self, tick: u64) {
        self.total_cycles = tick.saturating_sub(self.start_tick);
        self.enabled = false;
    }

    #[inline]
    pub fn record(&mut self, pc: u16) {
        *self.pc_hits.entry(pc).or_insert(0) += 1;
        self.total_instructions += 1;
    }

    #[inline]
    pub fn record_call(&mut self, caller_pc: u16, target_pc: u16) {
        *self.call_graph.entry((caller_pc, target_pc)).or_insert(0) += 1;
    }

    pub fn hits(&self, pc: u16) -> u64 {
        self.pc_hits.get(&pc).copied().unwrap_or(0)
    }

    /// Top-N hottest addresses by execution count. Ties go to the lower address.
    fn top_hits(&self, n: usize) -> Vec<(u16, u64)> {
        let mut v: Vec<_> = self.pc_hits.iter().map(|(&pc, &cnt)| (pc, cnt)).collect();
        v.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        v.truncate(n);
        v
    }

    /// Top-N call edges by invocation count.
    fn top_calls(&self, n: usize) -> Vec<((u16, u16), u64)> {
        let mut v: Vec<_> = self.call_graph.iter()
            .map(|(&edge, &cnt)| (edge, cnt)).collect();
        v.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        v.truncate(n);
        v
    }

    /// Addresses grouped into contiguous ranges, hottest first.
    /// Returns (start_addr, end_addr, total_hits).
    pub fn flat_profile(&self) -> Vec<(u16, u16, u64)> {
        let mut addrs: Vec<_> = self.pc_hits.keys().copied().collect();
        addrs.sort();
        let Some((&first, rest)) = addrs.split_first() else { return vec![]; };

        let mut ranges = Vec::new();
        let (mut start, mut end, mut hits) = (first, first, self.hits(first));
        for &addr in rest {
            // Gap of one byte allowed for two-byte instructions
            if addr <= end + 2 {
                end = addr;
                hits += self.hits(addr);
            } else {
                ranges.push((start, end, hits));
                start = addr;
                end = addr;
                hits = self.hits(addr);
            }
        }
        ranges.push((start, end, hits));
        ranges.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
        ranges
    }

    fn percent(&self, hits: u64) -> f64 {
        if self.total_instructions > 0 {
            hits as f64 / self.total_instructions as f64 * 100.0
        } else { 0.0 }
    }

    /// Format a full profiling report, disassembling hotspots from `rom`.
    pub fn report(&self, rom: &[u8]) -> String {
        let mut s = String::new();
        s.push_str("=== Profiler Report ===\n");
        s.push_str(&format!("Instructions: {}\n", self.total_instructions));
        s.push_str(&format!("Cycles: {}\n", self.total_cycles));
        s.push_str(&format!("Unique addresses: {}\n", self.pc_hits.len()));
        if self.total_instructions > 0 {
            let cpi = self.total_cycles as f64 / self.total_instructions as f64;
            s.push_str(&format!("Cycles/instruction: {:.2}\n", cpi));
        }

        s.push_str("\n--- Top 20 Hotspots ---\n");
        s.push_str(&format!("{:>5}  {:>8}  {:>7}  {}\n", "Addr", "Hits", "%", "Instruction"));
        for (pc, cnt) in self.top_hits(20) {
            let op = rom.get(pc as usize).copied().unwrap_or(0);
            let next = rom.get(pc as usize + 1).copied().unwrap_or(0);
            let asm = disasm::disassemble_bytes(op, next, pc);
            s.push_str(&format!("0x{:03X}  {:>8}  {:>6.2}%  {}\n", pc, cnt, self.percent(cnt), asm));
        }

        let calls = self.top_calls(10);
        if !calls.is_empty() {
            s.push_str("\n--- Top 10 Call Edges ---\n");
            s.push_str(&format!("{:>6} -> {:>6}  {:>6}\n", "Caller", "Callee", "Count"));
            for ((from, to), cnt) in calls {
                s.push_str(&format!(" 0x{:03X} ->  0x{:03X}  {:>6}\n", from, to, cnt));
            }
        }

        let blocks = self.flat_profile();
        if !blocks.is_empty() {
            s.push_str("\n--- Top 10 Hot Regions ---\n");
            for (start, end, hits) in blocks.iter().take(10) {
                s.push_str(&format!("0x{:03X}-0x{:03X}  {:>8} hits  ({:.1}%)\n",
                    start, end, hits, self.percent(*hits)));
            }
        }

        s
    }
}

impl Default for Profiler {
    fn default() -> Self { Self::new() }
}
