use serde::{Deserialize, Serialize};

/// Largest configurable memory, in words (24-bit absolute addresses).
pub const MAX_MEMORY_WORDS: usize = 1 << 24;
pub const MAX_CPUS: usize = 8;
/// Spin iterations before a lock wait is reported as a deadlock.
pub const DEADLOCK_DETECT: u64 = 0x4000_0000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuModel {
    #[default]
    Dps8m,
    L68,
}

impl CpuModel {
    /// Entries in each of the SDWAM and PTWAM.
    pub fn wam_entries(self) -> usize {
        match self { CpuModel::Dps8m => 64, CpuModel::L68 => 16 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockDiscipline {
    /// One reader/writer lock over all of memory.
    #[default]
    Coarse,
    /// A lock bit in every memory word.
    Fine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuConfig {
    pub model: CpuModel,
    pub enable_wam: bool,
    pub enable_ucache: bool,
    pub lock_discipline: LockDiscipline,
    pub deadlock_limit: u64,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            model: CpuModel::Dps8m,
            enable_wam: true,
            enable_ucache: true,
            lock_discipline: LockDiscipline::Coarse,
            deadlock_limit: DEADLOCK_DETECT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    pub memory_words: usize,
    pub cpus: usize,
    pub cpu: CpuConfig,
}

impl Default for MachineConfig {
    fn default() -> Self { Self { memory_words: 1 << 20, cpus: 1, cpu: CpuConfig::default() } }
}
