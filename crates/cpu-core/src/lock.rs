//! Memory lock manager.
//!
//! Coarse discipline: one reader/writer lock over all of memory; RMW takes it exclusively for the
//! whole read-lock/write-unlock pair. Fine discipline: bit 61 of each memory cell is a spin lock,
//! taken around every word access and held across an RMW pair.
//!
//! Misuse (double lock, release without lock, deadlock bound exceeded) is logged and counted, never fatal.

use std::fmt;
use std::sync::Arc;

use apu::{Word24, Word36, DMASK};
use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock, RwLock};
use serde::{Deserialize, Serialize};

use crate::config::LockDiscipline;
use crate::memory::{AtomicWord, CoreMemory, MemError, MEM_LOCKED};

const YIELD_EVERY: u64 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockMode {
    Read,
    Write,
    /// Read-modify-write of the word at the given address.
    Rmw(Word24),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStats {
    /// Acquisitions, including per-word locks taken by fine-discipline reads and writes.
    pub lock_cnt: u64,
    pub lock_immediate: u64,
    /// Spin iterations spent waiting, summed over all acquisitions.
    pub lock_wait: u64,
    pub lock_wait_max: u64,
    pub lock_yield: u64,
    /// Warnings logged for lock misuse or deadlock.
    pub diagnostics: u64,
}

impl LockStats {
    fn record(&mut self, spin: Spin) {
        self.lock_cnt += 1;
        if spin.waits == 0 { self.lock_immediate += 1; }
        self.lock_wait += spin.waits;
        self.lock_wait_max = self.lock_wait_max.max(spin.waits);
        self.lock_yield += spin.yields;
    }
}

impl fmt::Display for LockStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = if self.lock_cnt == 0 { 0.0 } else { 100.0 * self.lock_immediate as f64 / self.lock_cnt as f64 };
        write!(f, "locks {} immediate {} ({pct:.1}%) wait {} max {} yields {}",
            self.lock_cnt, self.lock_immediate, self.lock_wait, self.lock_wait_max, self.lock_yield)?;
        if self.diagnostics > 0 { write!(f, " diagnostics {}", self.diagnostics)?; }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Spin { waits: u64, yields: u64 }

impl Spin {
    fn step(&mut self) {
        self.waits += 1;
        if self.waits % YIELD_EVERY == 0 {
            self.yields += 1;
            std::thread::yield_now();
        } else {
            std::hint::spin_loop();
        }
    }
}

/// Lock shared by every processor of a machine.
#[derive(Debug)]
pub struct MemoryLock {
    discipline: LockDiscipline,
    deadlock_limit: u64,
    rw: Arc<RwLock<()>>,
}

impl MemoryLock {
    pub fn new(discipline: LockDiscipline, deadlock_limit: u64) -> Self {
        Self { discipline, deadlock_limit: deadlock_limit.max(1), rw: Arc::new(RwLock::new(())) }
    }

    pub fn discipline(&self) -> LockDiscipline { self.discipline }
}

/// Guard of the coarse lock, owned by the processor that took it.
enum CoarseGuard {
    Shared(ArcRwLockReadGuard<RawRwLock, ()>),
    Exclusive(ArcRwLockWriteGuard<RawRwLock, ()>),
}

impl fmt::Debug for CoarseGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { CoarseGuard::Shared(_) => "Shared", CoarseGuard::Exclusive(_) => "Exclusive" })
    }
}

#[derive(Debug)]
struct Held {
    mode: LockMode,
    nested: u32,
    /// Dropping the guard releases the coarse lock; `None` under the fine discipline.
    guard: Option<CoarseGuard>,
}

/// One processor's handle on the memory lock. Not shared between threads.
#[derive(Debug)]
pub struct LockState {
    cpu: usize,
    lock: Arc<MemoryLock>,
    memory: Arc<CoreMemory>,
    held: Option<Held>,
    stats: LockStats,
}

impl LockState {
    pub fn new(cpu: usize, lock: Arc<MemoryLock>, memory: Arc<CoreMemory>) -> Self {
        Self { cpu, lock, memory, held: None, stats: LockStats::default() }
    }

    pub fn stats(&self) -> &LockStats { &self.stats }
    pub fn held(&self) -> Option<LockMode> { self.held.as_ref().map(|h| h.mode) }
    pub fn discipline(&self) -> LockDiscipline { self.lock.discipline }

    /// Address held under RMW, if any.
    pub fn locked_addr(&self) -> Option<Word24> {
        match self.held() { Some(LockMode::Rmw(addr)) => Some(addr), _ => None }
    }

    fn diagnose(&mut self, args: fmt::Arguments<'_>) {
        self.stats.diagnostics += 1;
        log::warn!("cpu {}: {args}; {}", self.cpu, self.stats);
    }

    pub fn acquire(&mut self, mode: LockMode) -> Result<(), MemError> {
        if let Some(held) = self.held() {
            match (held, mode) {
                (LockMode::Rmw(_), LockMode::Read | LockMode::Write) => {
                    if let Some(h) = self.held.as_mut() { h.nested += 1; }
                }
                (h, m) => self.diagnose(format_args!("{m:?} lock requested while holding {h:?}")),
            }
            return Ok(());
        }
        let (spin, guard) = match (self.lock.discipline, mode) {
            (LockDiscipline::Coarse, LockMode::Read) => self.spin_coarse(false, mode),
            (LockDiscipline::Coarse, LockMode::Write) => self.spin_coarse(true, mode),
            (LockDiscipline::Coarse, LockMode::Rmw(addr)) => {
                self.memory.cell(addr)?;
                self.spin_coarse(true, mode)
            }
            (LockDiscipline::Fine, LockMode::Rmw(addr)) => (self.spin_word(addr)?, None),
            (LockDiscipline::Fine, _) => (Spin::default(), None),
        };
        self.stats.record(spin);
        self.held = Some(Held { mode, nested: 0, guard });
        Ok(())
    }

    pub fn release(&mut self) {
        let Some(held) = self.held.as_mut() else {
            self.diagnose(format_args!("release with no lock held"));
            return;
        };
        if held.nested > 0 {
            held.nested -= 1;
            return;
        }
        let mode = held.mode;
        // Dropping the held state releases a coarse guard
        self.held = None;
        if let (LockDiscipline::Fine, LockMode::Rmw(addr)) = (self.lock.discipline, mode) {
            if let Ok(cell) = self.memory.cell(addr) { cell.clear_bits(MEM_LOCKED); }
        }
    }

    /// Drop whatever is held, ignoring nesting. Used when a fault abandons an RMW sequence.
    pub fn unlock_all(&mut self) {
        if let Some(h) = self.held.as_mut() {
            h.nested = 0;
            self.release();
        }
    }

    /// Start an RMW sequence on `addr` and return the word.
    pub fn read_lock(&mut self, addr: Word24) -> Result<Word36, MemError> {
        self.acquire(LockMode::Rmw(addr))?;
        self.memory.read(addr)
    }

    /// Store `data` at `addr` and end the RMW sequence started by `read_lock`.
    pub fn write_unlock(&mut self, addr: Word24, data: Word36) -> Result<(), MemError> {
        if self.locked_addr() != Some(addr) {
            self.diagnose(format_args!("write-unlock of {addr:08o} while holding {:?}", self.held()));
            return self.write_word(addr, data);
        }
        let cell = self.memory.cell(addr)?;
        match self.lock.discipline {
            LockDiscipline::Coarse => cell.store_release(data & DMASK),
            LockDiscipline::Fine => cell.store_release((data & DMASK) | MEM_LOCKED),
        }
        self.release();
        Ok(())
    }

    /// Read one word under the active discipline. Coarse callers bracket with `acquire`.
    pub fn read_word(&mut self, addr: Word24) -> Result<Word36, MemError> {
        if self.lock.discipline == LockDiscipline::Coarse || self.locked_addr() == Some(addr) {
            return self.memory.read(addr);
        }
        let spin = self.spin_word(addr)?;
        self.stats.record(spin);
        let cell = self.memory.cell(addr)?;
        let val = cell.load_acquire() & DMASK;
        cell.clear_bits(MEM_LOCKED);
        Ok(val)
    }

    pub fn write_word(&mut self, addr: Word24, data: Word36) -> Result<(), MemError> {
        let memory = Arc::clone(&self.memory);
        let cell = memory.cell(addr)?;
        match self.lock.discipline {
            LockDiscipline::Coarse => cell.store_release(data & DMASK),
            LockDiscipline::Fine if self.locked_addr() == Some(addr) => cell.store_release((data & DMASK) | MEM_LOCKED),
            LockDiscipline::Fine => {
                let spin = self.spin_word(addr)?;
                self.stats.record(spin);
                // Storing the data clears the lock bit
                cell.store_release(data & DMASK);
            }
        }
        Ok(())
    }

    /// Spin for the coarse lock. Past the deadlock bound the wait is reported once and continues.
    fn spin_coarse(&mut self, exclusive: bool, mode: LockMode) -> (Spin, Option<CoarseGuard>) {
        let lock = Arc::clone(&self.lock);
        let mut spin = Spin::default();
        loop {
            let guard = if exclusive {
                lock.rw.try_write_arc().map(CoarseGuard::Exclusive)
            } else {
                lock.rw.try_read_arc().map(CoarseGuard::Shared)
            };
            if guard.is_some() { return (spin, guard); }
            spin.step();
            if spin.waits == lock.deadlock_limit {
                self.diagnose(format_args!("possible deadlock waiting for {mode:?} lock"));
            }
        }
    }

    /// Spin on the lock bit of `addr`. Past the deadlock bound the wait is reported and abandoned.
    fn spin_word(&mut self, addr: Word24) -> Result<Spin, MemError> {
        let memory = Arc::clone(&self.memory);
        let cell = memory.cell(addr)?;
        let mut spin = Spin::default();
        while cell.set_bits(MEM_LOCKED) & MEM_LOCKED != 0 {
            spin.step();
            if spin.waits >= self.lock.deadlock_limit {
                self.diagnose(format_args!("deadlock: holding {:?}, waiting for {addr:08o}", self.locked_addr()));
                break;
            }
        }
        Ok(spin)
    }
}

impl Drop for LockState {
    fn drop(&mut self) {
        if let Some(mode) = self.held() {
            log::warn!("cpu {}: dropping {mode:?} lock", self.cpu);
            self.unlock_all();
        }
    }
}
