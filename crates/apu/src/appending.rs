use serde::{Deserialize, Serialize};

use crate::fault::Fault;
use crate::types::{Word15, Word18, Word3};
use crate::ucache::{Cycle, MicroCache, UcacheStats};
use crate::walk::{PhysMem, Translation};
use crate::wam::Wams;
use crate::words::{AccessKind, Dsbr};

/// Segmentation state visible to the appending unit of one processor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApuState { pub dsbr: Dsbr, pub ring: Word3, pub ralr: Word3 }

/// Per-processor appending unit: DSBR, ring state and the caches derived from them.
#[derive(Debug, Clone)]
pub struct Apu {
    state: ApuState,
    wams: Wams,
    ucache: MicroCache,
}

impl Apu {
    pub fn new(wam_capacity: usize) -> Self {
        Self { state: ApuState::default(), wams: Wams::new(wam_capacity), ucache: MicroCache::new() }
    }

    pub fn state(&self) -> &ApuState { &self.state }
    pub fn dsbr(&self) -> &Dsbr { &self.state.dsbr }
    pub fn ring(&self) -> Word3 { self.state.ring }
    pub fn ralr(&self) -> Word3 { self.state.ralr }
    pub fn wams(&self) -> &Wams { &self.wams }
    pub fn ucache_stats(&self) -> &UcacheStats { self.ucache.stats() }

    /// LDBR: switching descriptor segments empties every cache.
    pub fn load_dsbr(&mut self, dsbr: Dsbr) {
        self.state.dsbr = dsbr;
        self.invalidate_all();
    }

    pub fn set_ring(&mut self, ring: Word3) {
        let ring = ring & 7;
        if ring != self.state.ring { self.ucache.invalidate(); }
        self.state.ring = ring;
    }

    pub fn set_ralr(&mut self, ralr: Word3) {
        let ralr = ralr & 7;
        if ralr != self.state.ralr { self.ucache.invalidate(); }
        self.state.ralr = ralr;
    }

    pub fn set_wam_enabled(&mut self, on: bool) {
        self.wams.set_enabled(on);
        self.ucache.invalidate();
    }

    pub fn set_ucache_enabled(&mut self, on: bool) { self.ucache.set_enabled(on); }

    pub fn invalidate_all(&mut self) {
        log::debug!("invalidate SDWAM, PTWAM and micro-cache");
        self.wams.invalidate();
        self.ucache.invalidate();
    }

    /// Translate through the WAMs only.
    pub fn translate<M: PhysMem + ?Sized>(&mut self, mem: &M, segno: Word15, offset: Word18, kind: AccessKind) -> Result<Translation, Fault> {
        self.wams.translate(&self.state.dsbr, mem, segno, offset, kind)
    }

    /// Translate for a memory cycle, consulting the micro-cache first.
    pub fn append<M: PhysMem + ?Sized>(&mut self, mem: &M, cycle: Cycle, segno: Word15, offset: Word18) -> Result<Translation, Fault> {
        let ApuState { ring, ralr, .. } = self.state;
        let class = match cycle {
            Cycle::Call6 => { self.ucache.note_call6_skip(); None }
            Cycle::Transfer if ralr != 0 && ring >= ralr => { self.ucache.note_ralr_skip(); None }
            c => c.class(),
        };
        if let Some(class) = class {
            if let Some(t) = self.ucache.check(class, segno, offset, ring) {
                return Ok(t);
            }
        }
        let t = self.translate(mem, segno, offset, cycle.kind())?;
        if let Some(class) = class {
            self.ucache.save(class, segno, offset, ring, &t);
        }
        Ok(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::AcvFlags;
    use crate::walk::{self, fixture::*};
    use crate::ucache::UsageClass;
    use crate::words::Ptw;

    fn setup() -> (Tables, Apu) {
        let mut t = Tables::unpaged(0o100000, 8);
        t.put_sdw(1, &rw_sdw(0o4000, 0o777, true));
        t.put_sdw(2, &rw_sdw(0o3000, 0o3777, false));
        t.put_ptw(0o3000, 0, &present_ptw(0o20000));
        t.put_ptw(0o3000, 1, &present_ptw(0o30000));
        let mut apu = Apu::new(16);
        apu.load_dsbr(t.dsbr);
        (t, apu)
    }

    #[test]
    fn ucache_hit_matches_cold_walk() {
        let (t, mut apu) = setup();
        for offset in [0o10, 0o20, 1024 + 3, 1024 + 900, 5] {
            let cold = walk::translate(&t.dsbr, &t.mem, 2, offset, AccessKind::Read).unwrap();
            assert_eq!(apu.append(&t.mem, Cycle::OperandRead, 2, offset).unwrap(), cold);
        }
        let s = apu.ucache_stats().class(UsageClass::OperandRead);
        assert!(s.hits >= 2, "{s:?}");
    }

    #[test]
    fn store_cycles_skip_ucache_and_fault() {
        let (mut t, mut apu) = setup();
        let mut sdw = rw_sdw(0o4000, 0o777, true);
        sdw.access = crate::words::SdwAccess::R;
        t.put_sdw(3, &sdw);
        apu.append(&t.mem, Cycle::OperandRead, 3, 0).unwrap();
        let err = apu.append(&t.mem, Cycle::OperandStore, 3, 0).unwrap_err();
        assert_eq!(err.acv(), AcvFlags::W_OFF);
    }

    #[test]
    fn call6_and_ring_alarm_bypass() {
        let (t, mut apu) = setup();
        apu.append(&t.mem, Cycle::Call6, 1, 0).unwrap();
        apu.append(&t.mem, Cycle::Call6, 1, 0).unwrap();
        assert_eq!(apu.ucache_stats().call6_skips, 2);
        assert_eq!(apu.ucache_stats().instruction_fetch.hits, 0);

        apu.set_ring(4);
        apu.set_ralr(3);
        apu.append(&t.mem, Cycle::Transfer, 1, 0).unwrap();
        apu.append(&t.mem, Cycle::Transfer, 1, 0).unwrap();
        assert_eq!(apu.ucache_stats().ralr_skips, 2);

        apu.set_ralr(0);
        apu.append(&t.mem, Cycle::Transfer, 1, 0).unwrap();
        apu.append(&t.mem, Cycle::Transfer, 1, 0).unwrap();
        assert_eq!(apu.ucache_stats().instruction_fetch.hits, 1);
    }

    #[test]
    fn table_change_visible_after_invalidate() {
        let (mut t, mut apu) = setup();
        assert_eq!(apu.append(&t.mem, Cycle::OperandRead, 2, 7).unwrap().address, 0o20007);
        t.put_ptw(0o3000, 0, &Ptw { fault_code: 1, ..Default::default() });
        // Stale until the caller signals the change
        assert!(apu.append(&t.mem, Cycle::OperandRead, 2, 7).is_ok());
        apu.invalidate_all();
        assert!(apu.append(&t.mem, Cycle::OperandRead, 2, 7).is_err());
    }

    #[test]
    fn disabling_caches_keeps_results() {
        let (t, mut apu) = setup();
        let warm = apu.append(&t.mem, Cycle::InstructionFetch, 2, 1030).unwrap();
        apu.set_wam_enabled(false);
        apu.set_ucache_enabled(false);
        assert_eq!(apu.append(&t.mem, Cycle::InstructionFetch, 2, 1030).unwrap(), warm);
        assert!(apu.wams().sdw.is_empty());
    }
}
