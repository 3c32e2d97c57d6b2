//! Micro-cache in front of the WAMs: one direct-mapped table per usage class, indexed by segment number.

use serde::{Deserialize, Serialize};

use crate::types::{Word15, Word18, Word3, OS18MASK, PAMASK, PG18MASK};
use crate::walk::Translation;
use crate::words::AccessKind;

pub const UCACHE_ENTRIES: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UsageClass { InstructionFetch, IndirectWordFetch, OperandRead }

impl UsageClass {
    pub const ALL: [UsageClass; 3] = [UsageClass::InstructionFetch, UsageClass::IndirectWordFetch, UsageClass::OperandRead];
}

/// Kind of memory cycle the appending unit is asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cycle { InstructionFetch, IndirectWordFetch, OperandRead, OperandStore, Transfer, Call6 }

impl Cycle {
    pub fn kind(self) -> AccessKind {
        match self {
            Cycle::InstructionFetch | Cycle::Transfer | Cycle::Call6 => AccessKind::Execute,
            Cycle::IndirectWordFetch | Cycle::OperandRead => AccessKind::Read,
            Cycle::OperandStore => AccessKind::Write,
        }
    }

    /// Micro-cache class serving this cycle, if any.
    pub fn class(self) -> Option<UsageClass> {
        match self {
            Cycle::InstructionFetch | Cycle::Transfer => Some(UsageClass::InstructionFetch),
            Cycle::IndirectWordFetch => Some(UsageClass::IndirectWordFetch),
            Cycle::OperandRead => Some(UsageClass::OperandRead),
            Cycle::OperandStore | Cycle::Call6 => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UcacheEntry {
    pub valid: bool,
    pub segno: Word15,
    /// Offset of the reference that filled the entry; its page bits are the tag.
    pub offset: Word18,
    pub ring: Word3,
    pub translation: Translation,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassStats { pub hits: u64, pub misses: u64, pub skips: u64 }

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UcacheStats {
    pub instruction_fetch: ClassStats,
    pub indirect_word_fetch: ClassStats,
    pub operand_read: ClassStats,
    pub call6_skips: u64,
    pub ralr_skips: u64,
    pub segno_skips: u64,
}

impl UcacheStats {
    pub fn class(&self, c: UsageClass) -> &ClassStats {
        match c {
            UsageClass::InstructionFetch => &self.instruction_fetch,
            UsageClass::IndirectWordFetch => &self.indirect_word_fetch,
            UsageClass::OperandRead => &self.operand_read,
        }
    }

    fn class_mut(&mut self, c: UsageClass) -> &mut ClassStats {
        match c {
            UsageClass::InstructionFetch => &mut self.instruction_fetch,
            UsageClass::IndirectWordFetch => &mut self.indirect_word_fetch,
            UsageClass::OperandRead => &mut self.operand_read,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MicroCache {
    tables: [Box<[UcacheEntry]>; 3],
    enabled: bool,
    stats: UcacheStats,
}

impl Default for MicroCache {
    fn default() -> Self { Self::new() }
}

impl MicroCache {
    pub fn new() -> Self {
        let table = || vec![UcacheEntry::default(); UCACHE_ENTRIES].into_boxed_slice();
        Self { tables: [table(), table(), table()], enabled: true, stats: UcacheStats::default() }
    }

    pub fn enabled(&self) -> bool { self.enabled }

    pub fn set_enabled(&mut self, on: bool) {
        if !on { self.invalidate(); }
        self.enabled = on;
    }

    pub fn stats(&self) -> &UcacheStats { &self.stats }
    pub fn reset_stats(&mut self) { self.stats = UcacheStats::default(); }

    pub fn invalidate(&mut self) {
        for t in self.tables.iter_mut() {
            t.iter_mut().for_each(|e| e.valid = false);
        }
    }

    pub fn note_call6_skip(&mut self) { self.stats.call6_skips += 1; }
    pub fn note_ralr_skip(&mut self) { self.stats.ralr_skips += 1; }

    /// Cached translation of `segno|offset`, or `None` when the reference must take the WAM path.
    pub fn check(&mut self, class: UsageClass, segno: Word15, offset: Word18, ring: Word3) -> Option<Translation> {
        if !self.enabled { return None; }
        if segno as usize >= UCACHE_ENTRIES {
            self.stats.segno_skips += 1;
            self.stats.class_mut(class).skips += 1;
            return None;
        }
        let e = &self.tables[class as usize][segno as usize];
        let hit = e.valid
            && e.ring == ring
            && (!e.translation.paged || (e.offset & PG18MASK) == (offset & PG18MASK))
            && (offset >> 4) <= e.translation.bound as u32;
        if !hit {
            self.stats.class_mut(class).misses += 1;
            return None;
        }
        let mut t = e.translation;
        let disp = if t.paged { offset & OS18MASK } else { offset };
        t.address = (t.page_base + disp) & PAMASK;
        self.stats.class_mut(class).hits += 1;
        Some(t)
    }

    pub fn save(&mut self, class: UsageClass, segno: Word15, offset: Word18, ring: Word3, translation: &Translation) {
        if !self.enabled || segno as usize >= UCACHE_ENTRIES { return; }
        self.tables[class as usize][segno as usize] = UcacheEntry { valid: true, segno, offset, ring, translation: *translation };
    }
}
