//! Command-line host for the MCS-4 simulator.
//!
//! Loads a hex-dump program, then either runs it headless for a cycle budget
//! or drops into an interactive step debugger. Save states can be loaded
//! before and written after execution.

mod savestate;

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use mcs4_core::debugger;
use mcs4_core::snapshot::RewindBuffer;
use mcs4_core::{Mcs4, RunState, Scheduler, StopReason, CLOCKS_PER_CYCLE, CLOCK_HZ};

#[derive(Parser, Debug)]
#[command(name = "mcs4-emu")]
#[command(about = "Intel 4004 (MCS-4) instruction-set simulator", long_about = None)]
struct Args {
    /// Hex-dump program to load (`*=$ADDR` sets the origin)
    program: Option<PathBuf>,

    /// Breakpoint at a hex ROM address (repeatable)
    #[arg(long = "break", value_name = "ADDR", value_parser = parse_addr)]
    breakpoints: Vec<u16>,

    /// Instruction cycles to run in headless mode
    #[arg(long, default_value_t = 10_000)]
    cycles: u64,

    /// Cycle budget per scheduler batch
    #[arg(long, default_value_t = 1_000)]
    batch: u64,

    /// Interactive step debugger
    #[arg(long, action = ArgAction::SetTrue)]
    step: bool,

    /// Start with test mode active (8-bit PC, banks 0/1)
    #[arg(long, action = ArgAction::SetTrue)]
    test_mode: bool,

    /// Drive the TEST input high
    #[arg(long, action = ArgAction::SetTrue)]
    test_pin: bool,

    /// Print a profiler report after the run
    #[arg(long, action = ArgAction::SetTrue)]
    profile: bool,

    /// Print RAM, status characters and ports after the run
    #[arg(long, action = ArgAction::SetTrue)]
    dump: bool,

    /// Restore a save state before execution
    #[arg(long)]
    load_state: Option<PathBuf>,

    /// Write a save state after execution
    #[arg(long)]
    save_state: Option<PathBuf>,

    /// Debug-level logging
    #[arg(long, action = ArgAction::SetTrue)]
    debug: bool,
}

fn parse_addr(s: &str) -> Result<u16, String> {
    let digits = s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .or_else(|| s.strip_prefix('$'))
        .unwrap_or(s);
    u16::from_str_radix(digits, 16)
        .map(|a| a & mcs4_core::ADDR_MASK)
        .map_err(|e| format!("invalid address '{}': {}", s, e))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut sys = Mcs4::new();
    match (&args.load_state, &args.program) {
        (Some(path), _) => {
            let snap = savestate::load_from_file(path)?;
            sys.restore(&snap);
            log::info!("restored state from {} (PC 0x{:03X})", path.display(), sys.pc());
        }
        (None, Some(path)) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let size = sys.load_hex(&text)
                .with_context(|| format!("loading {}", path.display()))?;
            log::info!("loaded {} bytes from {}", size, path.display());
        }
        (None, None) => bail!("nothing to run: pass a program or --load-state"),
    }
    if args.test_mode {
        sys.set_test_mode(true);
    }
    if args.test_pin {
        sys.set_test_pin(true);
    }
    if args.profile {
        let now = sys.cycles();
        sys.profiler.start(now);
    }
    for bp in &args.breakpoints {
        log::debug!("breakpoint 0x{:03X}", bp);
    }

    let mut sched = Scheduler::new(sys);
    if args.step {
        run_step_mode(&args, &mut sched)?;
    } else {
        run_headless(&args, &mut sched);
    }

    let sys = &mut sched.sys;
    if args.profile {
        let now = sys.cycles();
        sys.profiler.stop(now);
        println!("{}", sys.profiler_report());
    }
    if args.dump {
        print_memory(sys);
    }
    if let Some(path) = &args.save_state {
        savestate::save_to_file(&sys.snapshot(), path)?;
        log::info!("saved state to {}", path.display());
    }
    Ok(())
}

// --- Headless Mode ---

fn run_headless(args: &Args, sched: &mut Scheduler) {
    let mut total = 0u64;
    let mut faults = 0usize;
    while total < args.cycles {
        let budget = args.batch.max(1).min(args.cycles - total);
        let out = sched.run(budget, &args.breakpoints);
        total += out.cycles;
        faults += out.diagnostics.len();
        match out.stop {
            StopReason::BudgetExhausted => {}
            StopReason::Breakpoint(pc) => {
                println!("*** Breakpoint 0x{:03X}: {} ***", pc, sched.sys.disasm_at_pc());
                break;
            }
            StopReason::Watchpoint(hit) => {
                println!("*** Watchpoint {}: bank {} group {} char {} {:X} -> {:X} ***",
                    hit.index, hit.addr.bank, hit.addr.group, hit.addr.character,
                    hit.old_val, hit.new_val);
                break;
            }
        }
    }
    sched.stop();

    let micros = total * CLOCKS_PER_CYCLE as u64 * 1_000_000 / CLOCK_HZ as u64;
    log::info!("ran {} cycles ({} us at {} kHz), {} faults",
        total, micros, CLOCK_HZ / 1000, faults);
    println!("{}", sched.sys.dump_regs());
}

// --- Step Mode ---

fn run_step_mode(args: &Args, sched: &mut Scheduler) -> Result<()> {
    let mut rewind = RewindBuffer::new(1024, 1);

    println!("Step mode: Enter=step, N<enter>=step N, r=run to break, b=step back, d=dump, m=RAM, q=quit");
    println!("{}", sched.sys.dump_regs());
    println!("Next: {}", sched.sys.disasm_at_pc());

    let stdin = std::io::stdin();
    let mut steps = 0usize;
    loop {
        print!("step> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let cmd = line.trim();
        match cmd {
            "q" | "quit" => break,
            "d" | "dump" => {
                println!("{}", sched.sys.dump_regs());
                continue;
            }
            "m" | "mem" => {
                print_memory(&sched.sys);
                continue;
            }
            "b" | "back" => {
                match rewind.pop() {
                    Some(snap) => {
                        sched.sys.restore(&snap);
                        steps = steps.saturating_sub(1);
                    }
                    None => println!("  (no history)"),
                }
                println!("{}", sched.sys.dump_regs());
                println!("Next: {}", sched.sys.disasm_at_pc());
                continue;
            }
            "r" | "run" => {
                rewind.push(sched.sys.snapshot());
                let mut ran = 0u64;
                while ran < args.cycles {
                    let out = sched.run(args.batch.max(1), &args.breakpoints);
                    ran += out.cycles;
                    steps += out.instructions as usize;
                    if sched.state() == RunState::Stopped {
                        match out.stop {
                            StopReason::Breakpoint(_) => {
                                println!("*** Breakpoint: {} ***", sched.sys.disasm_at_pc());
                            }
                            StopReason::Watchpoint(hit) => {
                                println!("*** Watchpoint {} ***", hit.index);
                            }
                            StopReason::BudgetExhausted => {}
                        }
                        break;
                    }
                }
                sched.stop();
                println!("{}", sched.sys.dump_regs());
                println!("Next: {}", sched.sys.disasm_at_pc());
                continue;
            }
            _ => {}
        }

        let n: usize = cmd.parse().unwrap_or(1).max(1);
        for i in 0..n {
            if rewind.tick_step() {
                rewind.push(sched.sys.snapshot());
            }
            let asm = sched.sys.disasm_at_pc();
            let r = sched.step();
            steps += 1;
            if n <= 20 {
                println!("  {}", asm);
            } else if i == n - 1 {
                println!("  ... {} steps, last: {}", n, asm);
            }
            if let Some(d) = r.diagnostic {
                println!("  !! {}", d);
            }
        }
        println!("{}", sched.sys.dump_regs());
        println!("Next: {}", sched.sys.disasm_at_pc());
    }
    println!("Total: {} steps, {} cycles", steps, sched.sys.cycles());
    Ok(())
}

fn print_memory(sys: &Mcs4) {
    for bank in 0..mcs4_core::RAM_BANKS {
        print!("{}", debugger::dump_ram(&sys.mem, bank));
    }
    print!("{}", debugger::dump_ports(&sys.mem));
    let diags: Vec<_> = sys.diagnostics().collect();
    if !diags.is_empty() {
        println!("Diagnostics:");
        for d in diags {
            println!("  {}", d);
        }
    }
}
