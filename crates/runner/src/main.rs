mod demo;

use std::thread;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use apu::{AccessKind, Cycle, Dsbr, UcacheStats, UsageClass};
use clap::{Parser, Subcommand, ValueEnum};
use cpu_core::{CpuConfig, CpuModel, LockDiscipline, LockMode, LockStats, Machine, MachineConfig};

#[derive(Parser, Debug)]
#[command(name = "dps8-sim", version, about = "Segmented memory, associative memory and memory-lock exerciser", long_about=None)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModelArg { Dps8m, L68 }

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DisciplineArg { Coarse, Fine }

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg { Read, Write, Execute }

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run processor threads over the demonstration tables
    Run {
        #[arg(long, default_value_t = 2)]
        cpus: usize,
        #[arg(long, value_enum, default_value_t = ModelArg::Dps8m)]
        model: ModelArg,
        #[arg(long)]
        no_wam: bool,
        #[arg(long)]
        no_ucache: bool,
        #[arg(long, value_enum, default_value_t = DisciplineArg::Coarse)]
        discipline: DisciplineArg,
        #[arg(long, default_value_t = 10_000)]
        iterations: u32,
        #[arg(long, default_value_t = 1 << 20)]
        memory: usize,
    },
    /// Translate one virtual address through the demonstration tables
    Translate {
        #[arg(long, value_parser = parse_octal)]
        segno: u32,
        #[arg(long, value_parser = parse_octal)]
        offset: u32,
        #[arg(long, value_enum, default_value_t = KindArg::Read)]
        kind: KindArg,
    },
}

fn parse_octal(s: &str) -> Result<u32, String> {
    let digits = s.strip_prefix("0o").unwrap_or(s);
    u32::from_str_radix(digits, 8).map_err(|e| format!("{s}: {e}"))
}

#[derive(Debug, Default)]
struct CpuReport {
    id: usize,
    faults: u64,
    locks: LockStats,
    ucache: UcacheStats,
    slept_left: Option<u64>,
}

const CYCLES: [Cycle; 5] = [Cycle::InstructionFetch, Cycle::OperandRead, Cycle::IndirectWordFetch, Cycle::OperandStore, Cycle::Transfer];

fn exercise(cpu: &mut cpu_core::Cpu, dsbr: Dsbr, iterations: u32, sleeper: bool) -> Result<CpuReport> {
    cpu.load_dsbr(dsbr);
    cpu.set_ring(4);
    let id = cpu.id();
    let mut report = CpuReport { id, ..Default::default() };
    for i in 0..iterations {
        let segno = (i.wrapping_mul(7).wrapping_add(id as u32) % demo::SEGMENTS as u32) as u16;
        let offset = i.wrapping_mul(131) % demo::segment_words(segno);
        cpu.acquire_memory(LockMode::Read)?;
        let r = cpu.append(CYCLES[i as usize % CYCLES.len()], segno, offset);
        cpu.release_memory();
        if r.is_err() { report.faults += 1; }

        let v = cpu.read_lock(demo::COUNTER)?;
        cpu.write_unlock(demo::COUNTER, v + 1)?;
    }
    if sleeper {
        report.slept_left = Some(cpu.sleep(1_000_000));
    }
    report.locks = *cpu.lock_stats();
    report.ucache = *cpu.ucache_stats();
    Ok(report)
}

fn run(config: MachineConfig, iterations: u32) -> Result<()> {
    let machine = Machine::new(config)?;
    let dsbr = demo::load(machine.memory())?;
    let last = config.cpus - 1;

    let handles = (0..config.cpus)
        .map(|id| machine.spawn_cpu(id, move |cpu| exercise(cpu, dsbr, iterations, id == last)))
        .collect::<Result<Vec<_>, _>>()?;
    for id in 0..config.cpus { machine.set_cpu_running(id, true)?; }

    // Cut the last processor's wait-state sleep short
    while !handles[last].is_finished() {
        if machine.cpu_sleeping(last)? {
            thread::sleep(Duration::from_millis(100));
            machine.wake_cpu(last)?;
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }

    let mut reports = Vec::new();
    for h in handles {
        let r = h.join().map_err(|_| anyhow::anyhow!("cpu thread panicked"))??;
        reports.push(r);
    }
    for r in &reports {
        println!("cpu {}: {} faults; {}", r.id, r.faults, r.locks);
        for c in UsageClass::ALL {
            let s = r.ucache.class(c);
            println!("  ucache {c:?}: hits {} misses {} skips {}", s.hits, s.misses, s.skips);
        }
        println!("  ucache skips: call6 {} ralr {} segno {}", r.ucache.call6_skips, r.ucache.ralr_skips, r.ucache.segno_skips);
        if let Some(left) = r.slept_left { println!("  woken with {left} us of 1000000 left"); }
    }
    let counter = machine.memory().read(demo::COUNTER)?;
    println!("counter {counter} (expected {})", config.cpus as u64 * iterations as u64);
    ensure!(counter == config.cpus as u64 * iterations as u64, "lost RMW updates");
    Ok(())
}

fn translate(segno: u32, offset: u32, kind: KindArg) -> Result<()> {
    let machine = Machine::new(MachineConfig { memory_words: demo::MIN_WORDS, ..Default::default() })?;
    let dsbr = demo::load(machine.memory())?;
    let segno = u16::try_from(segno).context("segment number")?;
    let kind = match kind { KindArg::Read => AccessKind::Read, KindArg::Write => AccessKind::Write, KindArg::Execute => AccessKind::Execute };
    match apu::translate(&dsbr, &**machine.memory(), segno, offset, kind) {
        Ok(t) => println!("{segno:05o}:{offset:06o} -> {:08o} ({t:?})", t.address),
        Err(f) => println!("{segno:05o}:{offset:06o} -> {f} ({:?}, subtype {:o})", f.kind(), f.subtype()),
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Run { cpus, model, no_wam, no_ucache, discipline, iterations, memory } => {
            let cpu = CpuConfig {
                model: match model { ModelArg::Dps8m => CpuModel::Dps8m, ModelArg::L68 => CpuModel::L68 },
                enable_wam: !no_wam,
                enable_ucache: !no_ucache,
                lock_discipline: match discipline { DisciplineArg::Coarse => LockDiscipline::Coarse, DisciplineArg::Fine => LockDiscipline::Fine },
                ..Default::default()
            };
            log::info!("{cpus} cpus, {memory} words, {cpu:?}");
            run(MachineConfig { memory_words: memory, cpus, cpu }, iterations)?;
        }
        Cmd::Translate { segno, offset, kind } => translate(segno, offset, kind)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use apu::{DirectedKind, Fault};

    #[test]
    fn octal_arguments() {
        assert_eq!(parse_octal("0o777"), Ok(0o777));
        assert_eq!(parse_octal("100"), Ok(0o100));
        assert!(parse_octal("8").is_err());
    }

    #[test]
    fn demo_tables_translate() {
        let mem = cpu_core::CoreMemory::new(demo::MIN_WORDS);
        let dsbr = demo::load(&mem).unwrap();
        let t = apu::translate(&dsbr, &mem, 2, 0o100, AccessKind::Read).unwrap();
        assert_eq!(t.address, demo::UNPAGED_BASE + 2 * 2048 + 0o100);
        let t = apu::translate(&dsbr, &mem, 9, 1024 + 5, AccessKind::Write).unwrap();
        assert_eq!(t.address, demo::PAGES_BASE + 5 * 1024 + 5);
        let f = apu::translate(&dsbr, &mem, 15, 3 * 1024, AccessKind::Read).unwrap_err();
        assert!(matches!(f, Fault::Directed { kind: DirectedKind::Page, code: 1, .. }));
        assert!(apu::translate(&dsbr, &mem, 3, 0, AccessKind::Write).is_err());
        assert!(apu::translate(&dsbr, &mem, 16, 0, AccessKind::Read).is_err());
    }

    #[test]
    fn small_run_counts_every_increment() {
        let cfg = MachineConfig { memory_words: demo::MIN_WORDS, cpus: 2, cpu: CpuConfig { lock_discipline: LockDiscipline::Fine, ..Default::default() } };
        run(cfg, 200).unwrap();
    }
}
