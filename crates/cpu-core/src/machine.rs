use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::{MachineConfig, MAX_CPUS, MAX_MEMORY_WORDS};
use crate::cpu::Cpu;
use crate::faults::{FaultSink, LogFaults};
use crate::lock::MemoryLock;
use crate::memory::CoreMemory;
use crate::sched::ThreadControl;

#[derive(Debug, thiserror::Error)]
pub enum MachineError {
    #[error("no cpu {0}")] NoSuchCpu(usize),
    #[error("cpu count {0} not in 1..={max}", max = MAX_CPUS)] BadCpuCount(usize),
    #[error("memory size {0} words not in 1..={max}", max = MAX_MEMORY_WORDS)] BadMemorySize(usize),
    #[error("spawning cpu thread: {0}")] Spawn(#[from] std::io::Error),
}

/// Memory, memory lock and processor thread controls shared by every processor.
pub struct Machine {
    config: MachineConfig,
    memory: Arc<CoreMemory>,
    lock: Arc<MemoryLock>,
    threads: Vec<Arc<ThreadControl>>,
    faults: Arc<dyn FaultSink>,
}

impl Machine {
    pub fn new(config: MachineConfig) -> Result<Self, MachineError> {
        if config.cpus == 0 || config.cpus > MAX_CPUS { return Err(MachineError::BadCpuCount(config.cpus)); }
        if config.memory_words == 0 || config.memory_words > MAX_MEMORY_WORDS {
            return Err(MachineError::BadMemorySize(config.memory_words));
        }
        Ok(Self {
            config,
            memory: Arc::new(CoreMemory::new(config.memory_words)),
            lock: Arc::new(MemoryLock::new(config.cpu.lock_discipline, config.cpu.deadlock_limit)),
            threads: (0..config.cpus).map(|_| Arc::new(ThreadControl::new())).collect(),
            faults: Arc::new(LogFaults),
        })
    }

    pub fn with_fault_sink(mut self, faults: Arc<dyn FaultSink>) -> Self {
        self.faults = faults;
        self
    }

    pub fn config(&self) -> &MachineConfig { &self.config }
    pub fn memory(&self) -> &Arc<CoreMemory> { &self.memory }
    pub fn cpus(&self) -> usize { self.threads.len() }

    fn thread(&self, id: usize) -> Result<&Arc<ThreadControl>, MachineError> {
        self.threads.get(id).ok_or(MachineError::NoSuchCpu(id))
    }

    /// Context for processor `id`. Normally owned by that processor's thread.
    pub fn cpu(&self, id: usize) -> Result<Cpu, MachineError> {
        let thread = self.thread(id)?.clone();
        Ok(Cpu::new(id, self.config.cpu, self.memory.clone(), self.lock.clone(), thread, self.faults.clone()))
    }

    /// Start processor `id` on its own thread. The thread waits on the run gate before calling `body`.
    pub fn spawn_cpu<T, F>(&self, id: usize, body: F) -> Result<JoinHandle<T>, MachineError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Cpu) -> T + Send + 'static,
    {
        let mut cpu = self.cpu(id)?;
        let handle = thread::Builder::new().name(format!("cpu-{id}")).spawn(move || {
            cpu.run_wait();
            log::debug!("cpu {id} running");
            body(&mut cpu)
        })?;
        Ok(handle)
    }

    pub fn set_cpu_running(&self, id: usize, on: bool) -> Result<(), MachineError> {
        self.thread(id)?.set_running(on);
        Ok(())
    }

    pub fn cpu_running(&self, id: usize) -> Result<bool, MachineError> { Ok(self.thread(id)?.is_running()) }
    pub fn cpu_sleeping(&self, id: usize) -> Result<bool, MachineError> { Ok(self.thread(id)?.is_sleeping()) }

    /// Cut short the wait-state sleep of processor `id`, if it is sleeping.
    pub fn wake_cpu(&self, id: usize) -> Result<(), MachineError> {
        self.thread(id)?.wake();
        Ok(())
    }
}
