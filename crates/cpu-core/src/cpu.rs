use std::sync::Arc;

use apu::{AccessKind, Apu, Cycle, Dsbr, Fault, Translation, UcacheStats, Word15, Word18, Word24, Word3, Word36};

use crate::config::CpuConfig;
use crate::faults::FaultSink;
use crate::lock::{LockMode, LockState, LockStats, MemoryLock};
use crate::memory::{CoreMemory, MemError};
use crate::sched::ThreadControl;

/// Context of one emulated processor: appending unit, lock handle and thread control.
/// Owned by the processor's host thread and passed explicitly to every operation.
pub struct Cpu {
    id: usize,
    config: CpuConfig,
    apu: Apu,
    memory: Arc<CoreMemory>,
    lock: LockState,
    thread: Arc<ThreadControl>,
    faults: Arc<dyn FaultSink>,
}

impl Cpu {
    pub(crate) fn new(id: usize, config: CpuConfig, memory: Arc<CoreMemory>, lock: Arc<MemoryLock>, thread: Arc<ThreadControl>, faults: Arc<dyn FaultSink>) -> Self {
        let mut apu = Apu::new(config.model.wam_entries());
        apu.set_wam_enabled(config.enable_wam);
        apu.set_ucache_enabled(config.enable_ucache);
        Self { id, config, apu, lock: LockState::new(id, lock, memory.clone()), memory, thread, faults }
    }

    pub fn id(&self) -> usize { self.id }
    pub fn config(&self) -> &CpuConfig { &self.config }
    pub fn apu(&self) -> &Apu { &self.apu }
    pub fn memory(&self) -> &CoreMemory { &self.memory }

    fn report<T>(&self, r: Result<T, Fault>) -> Result<T, Fault> {
        if let Err(f) = &r {
            self.faults.fault(f.kind(), f.subtype(), &format!("cpu {}: {f}", self.id));
        }
        r
    }

    // Appending unit

    pub fn translate(&mut self, segno: Word15, offset: Word18, kind: AccessKind) -> Result<Translation, Fault> {
        let r = self.apu.translate(&*self.memory, segno, offset, kind);
        self.report(r)
    }

    pub fn append(&mut self, cycle: Cycle, segno: Word15, offset: Word18) -> Result<Translation, Fault> {
        let r = self.apu.append(&*self.memory, cycle, segno, offset);
        self.report(r)
    }

    pub fn load_dsbr(&mut self, dsbr: Dsbr) { self.apu.load_dsbr(dsbr); }

    /// LDBR from the Y-pair at `addr`.
    pub fn ldbr(&mut self, addr: Word24) -> Result<(), MemError> {
        let ypair = [self.lock.read_word(addr)?, self.lock.read_word(addr + 1)?];
        self.apu.load_dsbr(Dsbr::from_ypair(ypair));
        Ok(())
    }

    pub fn invalidate_all_caches(&mut self) { self.apu.invalidate_all(); }

    pub fn set_wam_enabled(&mut self, on: bool) {
        self.config.enable_wam = on;
        self.apu.set_wam_enabled(on);
    }

    pub fn set_ucache_enabled(&mut self, on: bool) {
        self.config.enable_ucache = on;
        self.apu.set_ucache_enabled(on);
    }

    pub fn ring(&self) -> Word3 { self.apu.ring() }
    pub fn set_ring(&mut self, ring: Word3) { self.apu.set_ring(ring); }
    pub fn set_ralr(&mut self, ralr: Word3) { self.apu.set_ralr(ralr); }
    pub fn ucache_stats(&self) -> &UcacheStats { self.apu.ucache_stats() }

    // Memory and locks

    pub fn acquire_memory(&mut self, mode: LockMode) -> Result<(), MemError> { self.lock.acquire(mode) }
    pub fn release_memory(&mut self) { self.lock.release(); }
    pub fn lock_stats(&self) -> &LockStats { self.lock.stats() }
    pub fn held_lock(&self) -> Option<LockMode> { self.lock.held() }

    pub fn read_word(&mut self, addr: Word24) -> Result<Word36, MemError> { self.lock.read_word(addr) }
    pub fn write_word(&mut self, addr: Word24, data: Word36) -> Result<(), MemError> { self.lock.write_word(addr, data) }
    pub fn read_lock(&mut self, addr: Word24) -> Result<Word36, MemError> { self.lock.read_lock(addr) }
    pub fn write_unlock(&mut self, addr: Word24, data: Word36) -> Result<(), MemError> { self.lock.write_unlock(addr, data) }
    pub fn unlock_all(&mut self) { self.lock.unlock_all(); }

    // Thread control

    /// Wait-state sleep; returns 0 on timeout or the microseconds left when woken early.
    pub fn sleep(&self, usec: u64) -> u64 { self.thread.sleep(usec) }

    /// Block until this processor is started.
    pub fn run_wait(&self) { self.thread.wait_running(); }

    pub fn is_running(&self) -> bool { self.thread.is_running() }
}
