//! Workspace-level tests: machine fixtures shared by the scenario modules.

use apu::{Dsbr, Ptw, RingBrackets, Sdw, SdwAccess, Word15, Word24};
use cpu_core::{CpuConfig, Machine, MachineConfig, MemError};

pub const DS_BASE: Word24 = 0o1000;
pub const DSBR_YPAIR: Word24 = 0o100;

pub fn machine(cpus: usize, cpu: CpuConfig) -> Machine {
    match Machine::new(MachineConfig { memory_words: 0o200000, cpus, cpu }) {
        Ok(m) => m,
        Err(e) => panic!("machine: {e}"),
    }
}

pub fn sdw(addr: Word24, bound: u16, unpaged: bool) -> Sdw {
    Sdw {
        addr,
        brackets: RingBrackets::new(0, 4, 4),
        present: true,
        bound,
        access: SdwAccess::R | SdwAccess::W | SdwAccess::E,
        unpaged,
        ..Default::default()
    }
}

pub fn ptw(frame: Word24) -> Ptw { Ptw { addr: frame >> 6, present: true, ..Default::default() } }

/// Unpaged descriptor segment at `DS_BASE` holding `sdws`, with its LDBR Y-pair at `DSBR_YPAIR`.
pub fn load_tables(m: &Machine, sdws: &[(Word15, Sdw)]) -> Result<Dsbr, MemError> {
    let count = sdws.iter().map(|(s, _)| *s as u32 + 1).max().unwrap_or(1);
    let dsbr = Dsbr { addr: DS_BASE, bound: ((2 * count).div_ceil(16) - 1) as u16, unpaged: true, stack: 0 };
    for (segno, sdw) in sdws {
        let (e, o) = sdw.to_pair();
        m.memory().load(DS_BASE + 2 * *segno as u32, &[e, o])?;
    }
    m.memory().load(DSBR_YPAIR, &dsbr.to_ypair())?;
    Ok(dsbr)
}

#[cfg(test)]
mod scenarios;
#[cfg(test)]
mod smoke;
