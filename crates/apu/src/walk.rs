use serde::{Deserialize, Serialize};

use crate::fault::{AcvFlags, DirectedKind, Fault};
use crate::types::{Word14, Word15, Word18, Word24, Word36, PAGE_WORDS, PAMASK};
use crate::words::{AccessKind, Dsbr, Ptw, RingBrackets, Sdw, SdwAccess};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PhysMemError {
    #[error("non-existent address {0:08o}")]
    NonExistent(Word24),
}

impl From<PhysMemError> for Fault {
    fn from(e: PhysMemError) -> Self {
        match e { PhysMemError::NonExistent(addr) => Fault::NonExistentAddress { addr } }
    }
}

/// Absolute memory as seen by the descriptor walk.
pub trait PhysMem {
    fn read_word(&self, addr: Word24) -> Result<Word36, PhysMemError>;
}

impl PhysMem for [Word36] {
    fn read_word(&self, addr: Word24) -> Result<Word36, PhysMemError> {
        self.get(addr as usize).copied().ok_or(PhysMemError::NonExistent(addr))
    }
}

impl PhysMem for Vec<Word36> {
    fn read_word(&self, addr: Word24) -> Result<Word36, PhysMemError> { self.as_slice().read_word(addr) }
}

/// Result of a successful walk. Carries what a caller needs for ring and privilege checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    pub address: Word24,
    /// Page origin for paged segments, segment origin otherwise.
    pub page_base: Word24,
    pub paged: bool,
    pub bound: Word14,
    pub brackets: RingBrackets,
    pub access: SdwAccess,
}

impl Translation {
    #[inline]
    pub fn privileged(&self) -> bool { self.access.contains(SdwAccess::P) }
}

/// Fetch the SDW of `segno` through the descriptor segment. Does not inspect the SDW;
/// `offset` is only carried into faults.
pub fn fetch_sdw<M: PhysMem + ?Sized>(dsbr: &Dsbr, mem: &M, segno: Word15, offset: Word18) -> Result<Sdw, Fault> {
    if !dsbr.covers(segno) {
        return Err(Fault::AccessViolation { segno, offset, acv: AcvFlags::OOSB });
    }
    let pair = 2 * segno as u32;
    let at = if dsbr.unpaged {
        dsbr.addr.wrapping_add(pair) & PAMASK
    } else {
        let (x1, y1) = (pair / PAGE_WORDS, pair % PAGE_WORDS);
        let ptw = Ptw::from_word(mem.read_word(dsbr.addr.wrapping_add(x1) & PAMASK)?);
        if !ptw.present {
            return Err(Fault::Directed { segno, offset, kind: DirectedKind::DescriptorPage, code: ptw.fault_code });
        }
        (ptw.page_base() + y1) & PAMASK
    };
    let even = mem.read_word(at)?;
    let odd = mem.read_word((at + 1) & PAMASK)?;
    Ok(Sdw::from_pair(even, odd))
}

/// Presence, bound, permission and ring order checks on a fetched SDW.
/// All access violations found are reported together.
pub fn check_sdw(sdw: &Sdw, segno: Word15, offset: Word18, kind: AccessKind) -> Result<(), Fault> {
    if !sdw.present {
        return Err(Fault::Directed { segno, offset, kind: DirectedKind::Segment, code: sdw.fault_code });
    }
    let mut acv = sdw.access.violations(kind);
    if !sdw.in_bounds(offset) { acv |= AcvFlags::OOSB; }
    if !sdw.brackets.ordered() { acv |= AcvFlags::IRO; }
    if acv.is_empty() { Ok(()) } else { Err(Fault::AccessViolation { segno, offset, acv }) }
}

/// Fetch the PTW covering `offset` in a paged segment.
pub fn fetch_ptw<M: PhysMem + ?Sized>(sdw: &Sdw, mem: &M, offset: Word18) -> Result<Ptw, Fault> {
    let x2 = offset / PAGE_WORDS;
    Ok(Ptw::from_word(mem.read_word(sdw.addr.wrapping_add(x2) & PAMASK)?))
}

pub fn check_ptw(ptw: &Ptw, segno: Word15, offset: Word18) -> Result<(), Fault> {
    if ptw.present { Ok(()) } else { Err(Fault::Directed { segno, offset, kind: DirectedKind::Page, code: ptw.fault_code }) }
}

/// Final address from a checked SDW and, for paged segments, its checked PTW.
pub fn finish(sdw: &Sdw, ptw: Option<&Ptw>, offset: Word18) -> Translation {
    let (page_base, address) = match ptw {
        Some(ptw) => (ptw.page_base(), ptw.page_base() + offset % PAGE_WORDS),
        None => (sdw.base(), sdw.base() + offset),
    };
    Translation {
        address: address & PAMASK,
        page_base,
        paged: ptw.is_some(),
        bound: sdw.bound,
        brackets: sdw.brackets,
        access: sdw.access,
    }
}

/// Uncached translation of `segno|offset` for a reference of `kind`.
pub fn translate<M: PhysMem + ?Sized>(dsbr: &Dsbr, mem: &M, segno: Word15, offset: Word18, kind: AccessKind) -> Result<Translation, Fault> {
    let sdw = fetch_sdw(dsbr, mem, segno, offset)?;
    check_sdw(&sdw, segno, offset, kind)?;
    if sdw.unpaged {
        return Ok(finish(&sdw, None, offset));
    }
    let ptw = fetch_ptw(&sdw, mem, offset)?;
    check_ptw(&ptw, segno, offset)?;
    Ok(finish(&sdw, Some(&ptw), offset))
}
