//! cpu-core: processor contexts, shared core memory, the memory lock manager and
//! processor thread scheduling around the appending unit.

pub mod config;
pub mod cpu;
pub mod faults;
pub mod lock;
pub mod machine;
pub mod memory;
pub mod sched;

pub use config::{CpuConfig, CpuModel, LockDiscipline, MachineConfig};
pub use cpu::Cpu;
pub use faults::{CollectFaults, FaultRecord, FaultSink, LogFaults};
pub use lock::{LockMode, LockStats};
pub use machine::{Machine, MachineError};
pub use memory::{AtomicWord, CoreMemory, MemError};
