//! DSBR, SDW and PTW: decoded views of the descriptor words held in main memory.
//!
//! Decoding is a pure function of the memory words; nothing here writes back to the tables.

use serde::{Deserialize, Serialize};

use crate::fault::AcvFlags;
use crate::types::{bit, field, with_bit, with_field, Word12, Word14, Word15, Word18, Word2, Word24, Word3, Word36};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessKind { Read, Write, Execute }

/// Descriptor segment base register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dsbr {
    /// Descriptor segment origin if unpaged, else its page table.
    pub addr: Word24,
    pub bound: Word14,
    pub unpaged: bool,
    /// Upper 12 bits of the stack segment number used by CALL6.
    pub stack: Word12,
}

impl Dsbr {
    /// Decode the Y-pair operand of LDBR.
    pub fn from_ypair(ypair: [Word36; 2]) -> Self {
        Self {
            addr: field(ypair[0], 12, 24) as Word24,
            bound: field(ypair[1], 21, 14) as Word14,
            unpaged: bit(ypair[1], 16),
            stack: field(ypair[1], 0, 12) as Word12,
        }
    }

    pub fn to_ypair(&self) -> [Word36; 2] {
        let even = with_field(0, 12, 24, self.addr as u64);
        let odd = with_field(0, 21, 14, self.bound as u64);
        let odd = with_bit(odd, 16, self.unpaged);
        [even, with_field(odd, 0, 12, self.stack as u64)]
    }

    /// True when the SDW pair of `segno` lies within the descriptor segment bound.
    pub fn covers(&self, segno: Word15) -> bool {
        2 * (segno as u32) < 16 * (self.bound as u32 + 1)
    }
}

bitflags::bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct SdwAccess: u8 {
        const R = 1<<0; // Read
        const E = 1<<1; // Execute
        const W = 1<<2; // Write
        const P = 1<<3; // Privileged
        const G = 1<<4; // Gate (call limiter disabled)
        const C = 1<<5; // Cacheable
    }
}

impl SdwAccess {
    /// Permission bits missing for a reference of `kind`.
    pub fn violations(self, kind: AccessKind) -> AcvFlags {
        match kind {
            AccessKind::Read if !self.contains(SdwAccess::R) => AcvFlags::R_OFF,
            AccessKind::Write if !self.contains(SdwAccess::W) => AcvFlags::W_OFF,
            AccessKind::Execute if !self.contains(SdwAccess::E) => AcvFlags::E_OFF,
            _ => AcvFlags::empty(),
        }
    }
}

/// R1 <= R2 <= R3: write, read/execute and call bracket tops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RingBrackets {
    pub r1: Word3,
    pub r2: Word3,
    pub r3: Word3,
}

impl RingBrackets {
    pub fn new(r1: Word3, r2: Word3, r3: Word3) -> Self { Self { r1, r2, r3 } }

    pub fn ordered(&self) -> bool { self.r1 <= self.r2 && self.r2 <= self.r3 }

    /// Bracket violations for a reference of `kind` made from `ring`.
    pub fn check(&self, kind: AccessKind, ring: Word3) -> AcvFlags {
        match kind {
            AccessKind::Read if ring > self.r2 => AcvFlags::ORB,
            AccessKind::Write if ring > self.r1 => AcvFlags::OWB,
            AccessKind::Execute if ring < self.r1 || ring > self.r2 => AcvFlags::OEB,
            _ => AcvFlags::empty(),
        }
    }
}

/// Segment descriptor word pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sdw {
    /// Segment origin if unpaged, else the segment's page table.
    pub addr: Word24,
    pub brackets: RingBrackets,
    /// Directed fault flag: clear means the segment is not active.
    pub present: bool,
    pub fault_code: Word2,
    pub bound: Word14,
    pub access: SdwAccess,
    pub unpaged: bool,
    /// Highest entry offset for calls when the gate bit is off.
    pub call_limiter: Word14,
}

impl Sdw {
    pub fn from_pair(even: Word36, odd: Word36) -> Self {
        let mut access = SdwAccess::empty();
        access.set(SdwAccess::R, bit(odd, 20));
        access.set(SdwAccess::E, bit(odd, 19));
        access.set(SdwAccess::W, bit(odd, 18));
        access.set(SdwAccess::P, bit(odd, 17));
        access.set(SdwAccess::G, bit(odd, 15));
        access.set(SdwAccess::C, bit(odd, 14));
        Self {
            addr: field(even, 12, 24) as Word24,
            brackets: RingBrackets {
                r1: field(even, 9, 3) as Word3,
                r2: field(even, 6, 3) as Word3,
                r3: field(even, 3, 3) as Word3,
            },
            present: bit(even, 2),
            fault_code: field(even, 0, 2) as Word2,
            bound: field(odd, 21, 14) as Word14,
            access,
            unpaged: bit(odd, 16),
            call_limiter: field(odd, 0, 14) as Word14,
        }
    }

    pub fn to_pair(&self) -> (Word36, Word36) {
        let mut even = with_field(0, 12, 24, self.addr as u64);
        even = with_field(even, 9, 3, self.brackets.r1 as u64);
        even = with_field(even, 6, 3, self.brackets.r2 as u64);
        even = with_field(even, 3, 3, self.brackets.r3 as u64);
        even = with_bit(even, 2, self.present);
        even = with_field(even, 0, 2, self.fault_code as u64);

        let mut odd = with_field(0, 21, 14, self.bound as u64);
        odd = with_bit(odd, 20, self.access.contains(SdwAccess::R));
        odd = with_bit(odd, 19, self.access.contains(SdwAccess::E));
        odd = with_bit(odd, 18, self.access.contains(SdwAccess::W));
        odd = with_bit(odd, 17, self.access.contains(SdwAccess::P));
        odd = with_bit(odd, 16, self.unpaged);
        odd = with_bit(odd, 15, self.access.contains(SdwAccess::G));
        odd = with_bit(odd, 14, self.access.contains(SdwAccess::C));
        odd = with_field(odd, 0, 14, self.call_limiter as u64);
        (even, odd)
    }

    /// Origin of an unpaged segment; the hardware ignores the low four address bits.
    #[inline]
    pub fn base(&self) -> Word24 { self.addr & 0o77777760 }

    /// `offset < 16 * (bound + 1)`
    #[inline]
    pub fn in_bounds(&self, offset: Word18) -> bool { (offset >> 4) <= self.bound as u32 }

    #[inline]
    pub fn privileged(&self) -> bool { self.access.contains(SdwAccess::P) }
}

/// Page table word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ptw {
    /// High-order 18 bits of the page's 24-bit address.
    pub addr: Word18,
    pub used: bool,
    pub modified: bool,
    pub present: bool,
    pub fault_code: Word2,
}

impl Ptw {
    pub fn from_word(word: Word36) -> Self {
        Self {
            addr: field(word, 18, 18) as Word18,
            used: bit(word, 9),
            modified: bit(word, 6),
            present: bit(word, 2),
            fault_code: field(word, 0, 2) as Word2,
        }
    }

    pub fn to_word(&self) -> Word36 {
        let mut w = with_field(0, 18, 18, self.addr as u64);
        w = with_bit(w, 9, self.used);
        w = with_bit(w, 6, self.modified);
        w = with_bit(w, 2, self.present);
        with_field(w, 0, 2, self.fault_code as u64)
    }

    /// Absolute address of word 0 of the page. Address bits below the page size are ignored.
    #[inline]
    pub fn page_base(&self) -> Word24 { (self.addr & 0o777760) << 6 }
}
