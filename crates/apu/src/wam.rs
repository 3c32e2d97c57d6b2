//! Working associative memories: small fully-associative caches of SDWs and PTWs
//! with USE-counter FIFO replacement.

use serde::{Deserialize, Serialize};

use crate::fault::Fault;
use crate::types::{Word15, Word18, PAGE_WORDS};
use crate::walk::{self, PhysMem, Translation};
use crate::words::{AccessKind, Dsbr, Ptw, Sdw};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WamEntry<K, T> {
    pub tag: K,
    pub payload: T,
    pub full: bool,
    /// Age rank; the entry with USE 0 is replaced next.
    pub usage: usize,
}

/// USE values always form a permutation of `0..capacity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wam<K, T> {
    entries: Vec<WamEntry<K, T>>,
    enabled: bool,
}

impl<K: Copy + Default + PartialEq, T: Copy + Default> Wam<K, T> {
    pub fn new(capacity: usize) -> Self {
        let entries = (0..capacity).map(|i| WamEntry { usage: i, ..Default::default() }).collect();
        Self { entries, enabled: true }
    }

    pub fn capacity(&self) -> usize { self.entries.len() }
    pub fn enabled(&self) -> bool { self.enabled }
    pub fn entries(&self) -> &[WamEntry<K, T>] { &self.entries }
    pub fn len(&self) -> usize { self.entries.iter().filter(|e| e.full).count() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// A disabled WAM misses every lookup and ignores installs. Either transition empties it.
    pub fn set_enabled(&mut self, on: bool) {
        if self.enabled != on { self.invalidate(); }
        self.enabled = on;
    }

    pub fn invalidate(&mut self) {
        for (i, e) in self.entries.iter_mut().enumerate() {
            e.full = false;
            e.usage = i;
        }
    }

    pub fn lookup(&mut self, tag: K) -> Option<T> {
        if !self.enabled { return None; }
        let i = self.entries.iter().position(|e| e.full && e.tag == tag)?;
        self.touch(i);
        Some(self.entries[i].payload)
    }

    /// Install `payload` into the oldest entry, or refresh an existing entry for `tag`.
    pub fn install(&mut self, tag: K, payload: T) {
        if !self.enabled || self.entries.is_empty() { return; }
        let i = self.entries.iter().position(|e| e.full && e.tag == tag)
            .or_else(|| self.entries.iter().position(|e| e.usage == 0))
            .unwrap_or(0);
        self.entries[i] = WamEntry { tag, payload, full: true, usage: self.entries[i].usage };
        self.touch(i);
    }

    /// Make entry `i` the most recently used.
    fn touch(&mut self, i: usize) {
        let u = self.entries[i].usage;
        for e in self.entries.iter_mut() {
            if e.usage > u { e.usage -= 1; }
        }
        self.entries[i].usage = self.entries.len() - 1;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageTag { pub segno: Word15, pub page: Word18 }

impl PageTag {
    pub fn of(segno: Word15, offset: Word18) -> Self { Self { segno, page: offset / PAGE_WORDS } }
}

pub type SdwWam = Wam<Word15, Sdw>;
pub type PtwWam = Wam<PageTag, Ptw>;

/// The SDWAM and PTWAM of one processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wams {
    pub sdw: SdwWam,
    pub ptw: PtwWam,
}

impl Wams {
    pub fn new(capacity: usize) -> Self { Self { sdw: Wam::new(capacity), ptw: Wam::new(capacity) } }

    pub fn invalidate(&mut self) {
        self.sdw.invalidate();
        self.ptw.invalidate();
    }

    pub fn set_enabled(&mut self, on: bool) {
        self.sdw.set_enabled(on);
        self.ptw.set_enabled(on);
    }

    /// Translate through the WAMs, walking the tables on a miss. Only present descriptors are cached,
    /// so the outcome is the same as `walk::translate` against unchanged tables.
    pub fn translate<M: PhysMem + ?Sized>(&mut self, dsbr: &Dsbr, mem: &M, segno: Word15, offset: Word18, kind: AccessKind) -> Result<Translation, Fault> {
        let sdw = match self.sdw.lookup(segno) {
            Some(sdw) => { log::trace!("SDWAM hit {segno:05o}"); sdw }
            None => {
                let sdw = walk::fetch_sdw(dsbr, mem, segno, offset)?;
                log::trace!("SDWAM miss {segno:05o}");
                if sdw.present { self.sdw.install(segno, sdw); }
                sdw
            }
        };
        walk::check_sdw(&sdw, segno, offset, kind)?;
        if sdw.unpaged {
            return Ok(walk::finish(&sdw, None, offset));
        }

        let tag = PageTag::of(segno, offset);
        let ptw = match self.ptw.lookup(tag) {
            Some(ptw) => ptw,
            None => {
                let ptw = walk::fetch_ptw(&sdw, mem, offset)?;
                log::trace!("PTWAM miss {segno:05o}:{:o}", tag.page);
                if ptw.present { self.ptw.install(tag, ptw); }
                ptw
            }
        };
        walk::check_ptw(&ptw, segno, offset)?;
        Ok(walk::finish(&sdw, Some(&ptw), offset))
    }
}
