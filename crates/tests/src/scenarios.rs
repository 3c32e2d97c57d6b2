use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use apu::{AccessKind, AcvFlags, Cycle, DirectedKind, Fault, FaultKind, Sdw};
use cpu_core::{CollectFaults, CpuConfig, CpuModel, LockDiscipline, LockMode};
use proptest::prelude::*;

use crate::{load_tables, machine, ptw, sdw, DSBR_YPAIR};

#[test]
fn a_unpaged_in_bounds() {
    let m = machine(1, CpuConfig::default());
    load_tables(&m, &[(1, sdw(0o20000, 0o777, true))]).unwrap();
    let mut cpu = m.cpu(0).unwrap();
    cpu.ldbr(DSBR_YPAIR).unwrap();
    let t = cpu.translate(1, 0o100, AccessKind::Read).unwrap();
    assert_eq!(t.address, 0o20000 + 0o100);
}

#[test]
fn b_offset_at_bound() {
    let faults = Arc::new(CollectFaults::default());
    let m = machine(1, CpuConfig::default()).with_fault_sink(faults.clone());
    load_tables(&m, &[(1, sdw(0o20000, 0o777, true))]).unwrap();
    let mut cpu = m.cpu(0).unwrap();
    cpu.ldbr(DSBR_YPAIR).unwrap();
    let err = cpu.translate(1, 16 * (0o777 + 1), AccessKind::Read).unwrap_err();
    assert_eq!(err, Fault::AccessViolation { segno: 1, offset: 16 * 0o1000, acv: AcvFlags::OOSB });
    let got = faults.take();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].kind, FaultKind::AccessViolation);
    assert_eq!(got[0].subtype, AcvFlags::OOSB.bits());
}

#[test]
fn c_segment_fault_skips_page_walk() {
    let m = machine(1, CpuConfig::default());
    // Paged SDW whose page table lies outside memory: walking it would be a store fault
    let absent = Sdw { present: false, fault_code: 3, ..sdw(0o77777770, 0o777, false) };
    load_tables(&m, &[(2, absent)]).unwrap();
    let mut cpu = m.cpu(0).unwrap();
    cpu.ldbr(DSBR_YPAIR).unwrap();
    let err = cpu.translate(2, 0o100, AccessKind::Read).unwrap_err();
    assert_eq!(err, Fault::Directed { segno: 2, offset: 0o100, kind: DirectedKind::Segment, code: 3 });
    assert_eq!(err.kind(), FaultKind::Directed(3));
}

fn rmw_contention(discipline: LockDiscipline) {
    let cfg = CpuConfig { lock_discipline: discipline, deadlock_limit: u64::MAX, ..Default::default() };
    let m = machine(2, cfg);
    let mut a = m.cpu(0).unwrap();
    let mut b = m.cpu(1).unwrap();
    let addr = 0o500;
    let barrier = Arc::new(Barrier::new(2));
    let released = Arc::new(AtomicBool::new(false));

    let (bar, rel) = (barrier.clone(), released.clone());
    let holder = thread::spawn(move || {
        let v = a.read_lock(addr).unwrap();
        bar.wait();
        thread::sleep(Duration::from_millis(50));
        rel.store(true, Ordering::SeqCst);
        a.write_unlock(addr, v + 1).unwrap();
        *a.lock_stats()
    });
    let waiter = thread::spawn(move || {
        barrier.wait();
        let v = b.read_lock(addr).unwrap();
        let after_release = released.load(Ordering::SeqCst);
        b.write_unlock(addr, v + 1).unwrap();
        (after_release, *b.lock_stats())
    });

    let a_stats = holder.join().unwrap();
    let (after_release, b_stats) = waiter.join().unwrap();
    assert_eq!(a_stats.lock_immediate, 1);
    assert_eq!(a_stats.lock_wait, 0);
    assert!(after_release, "waiter entered before release");
    assert_eq!(b_stats.lock_immediate, 0);
    assert!(b_stats.lock_wait > 0);
    assert!(b_stats.lock_yield > 0);
    assert_eq!(m.memory().read(addr).unwrap(), 2);
}

#[test]
fn d_rmw_contention_coarse() { rmw_contention(LockDiscipline::Coarse); }

#[test]
fn d_rmw_contention_fine() { rmw_contention(LockDiscipline::Fine); }

#[test]
fn e_wake_cuts_sleep_short() {
    let m = machine(2, CpuConfig::default());
    let sleeper = m.spawn_cpu(0, |cpu| {
        let start = Instant::now();
        (cpu.sleep(1_000_000), start.elapsed())
    }).unwrap();
    m.set_cpu_running(0, true).unwrap();
    while !m.cpu_sleeping(0).unwrap() { thread::yield_now(); }
    thread::sleep(Duration::from_millis(100));
    m.wake_cpu(0).unwrap();
    let (left, slept) = sleeper.join().unwrap();
    assert!(left > 600_000 && left < 910_000, "left {left}");
    assert!(slept < Duration::from_millis(500), "slept {slept:?}");
}

#[test]
fn e_wake_of_idle_cpu_is_noop() {
    let m = machine(2, CpuConfig::default());
    m.wake_cpu(1).unwrap();
    let cpu = m.cpu(1).unwrap();
    assert_eq!(cpu.sleep(10_000), 0);
}

#[test]
fn double_rmw_single_diagnostic() {
    for discipline in [LockDiscipline::Coarse, LockDiscipline::Fine] {
        let m = machine(2, CpuConfig { lock_discipline: discipline, ..Default::default() });
        let mut a = m.cpu(0).unwrap();
        let mut b = m.cpu(1).unwrap();
        a.acquire_memory(LockMode::Rmw(0o40)).unwrap();
        a.acquire_memory(LockMode::Rmw(0o40)).unwrap();
        assert_eq!(a.lock_stats().diagnostics, 1);
        a.release_memory();
        assert_eq!(a.held_lock(), None);
        b.acquire_memory(LockMode::Rmw(0o40)).unwrap();
        assert_eq!(b.lock_stats().lock_immediate, 1);
        b.release_memory();
    }
}

#[test]
fn ldbr_invalidates_caches() {
    let m = machine(1, CpuConfig { model: CpuModel::L68, ..Default::default() });
    load_tables(&m, &[(1, sdw(0o20000, 0o777, true)), (2, sdw(0o30000, 0o777, true))]).unwrap();
    let mut cpu = m.cpu(0).unwrap();
    cpu.ldbr(DSBR_YPAIR).unwrap();
    cpu.append(Cycle::OperandRead, 1, 0).unwrap();
    assert_eq!(cpu.apu().wams().sdw.len(), 1);
    cpu.ldbr(DSBR_YPAIR).unwrap();
    assert!(cpu.apu().wams().sdw.is_empty());
    assert_eq!(cpu.append(Cycle::OperandRead, 1, 0).unwrap().address, 0o20000);
    assert_eq!(cpu.ucache_stats().operand_read.hits, 0);
}

fn tables(m: &cpu_core::Machine) {
    let mut sdws = Vec::new();
    for s in 0..6u16 {
        sdws.push((s, sdw(0o10000 + s as u32 * 0o2000, 0o77, true)));
    }
    for s in 6..12u16 {
        let table = 0o4000 + (s as u32 - 6) * 0o10;
        sdws.push((s, sdw(table, 0o377, false)));
        for p in 0..4u32 {
            let frame = 0o100000 + ((s as u32 - 6) * 4 + p) * 1024;
            let w = if (s as u32 + p) % 7 == 0 { apu::Ptw { fault_code: 2, ..Default::default() } } else { ptw(frame) };
            m.memory().load(table + p, &[w.to_word()]).unwrap();
        }
    }
    load_tables(m, &sdws).unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn cached_and_uncached_cpus_agree(refs in proptest::collection::vec((0u16..14, 0u32..0o10000, 0usize..5), 1..100), ring in 0u8..8) {
        let cycles = [Cycle::InstructionFetch, Cycle::OperandRead, Cycle::IndirectWordFetch, Cycle::OperandStore, Cycle::Transfer];
        let m = machine(2, CpuConfig::default());
        tables(&m);
        let mut warm = m.cpu(0).unwrap();
        let mut cold = m.cpu(1).unwrap();
        cold.set_wam_enabled(false);
        cold.set_ucache_enabled(false);
        for cpu in [&mut warm, &mut cold] {
            cpu.ldbr(DSBR_YPAIR).unwrap();
            cpu.set_ring(ring);
        }
        for (segno, offset, c) in refs {
            let cycle = cycles[c];
            prop_assert_eq!(warm.append(cycle, segno, offset), cold.append(cycle, segno, offset));
        }
        warm.invalidate_all_caches();
        prop_assert!(warm.apu().wams().ptw.is_empty());
    }
}
