//! Demonstration descriptor segment: eight unpaged and eight paged segments.

use anyhow::{ensure, Result};
use apu::{Dsbr, Ptw, RingBrackets, Sdw, SdwAccess, Word15, Word24, PAGE_WORDS};
use cpu_core::CoreMemory;

pub const DS_BASE: Word24 = 0o1000;
pub const SEGMENTS: Word15 = 16;
pub const UNPAGED_BASE: Word24 = 0o10000;
pub const PAGE_TABLES: Word24 = 0o4000;
pub const PAGES_BASE: Word24 = 0o100000;
pub const PAGES_PER_SEGMENT: u32 = 4;
/// Shared word incremented by every processor under RMW.
pub const COUNTER: Word24 = 0o77000;
pub const MIN_WORDS: usize = (PAGES_BASE + 8 * PAGES_PER_SEGMENT * PAGE_WORDS) as usize;

/// Segment bound in 16-word units; unpaged segments are 2048 words, paged ones 4 pages.
pub fn segment_words(segno: Word15) -> u32 { if segno < 8 { 2048 } else { PAGES_PER_SEGMENT * PAGE_WORDS } }

fn sdw_for(segno: Word15) -> Sdw {
    let unpaged = segno < 8;
    let addr = if unpaged { UNPAGED_BASE + segno as u32 * 2048 } else { PAGE_TABLES + (segno as u32 - 8) * 0o10 };
    // Every fourth segment is read-only
    let access = if segno % 4 == 3 { SdwAccess::R } else { SdwAccess::R | SdwAccess::W | SdwAccess::E };
    Sdw {
        addr,
        brackets: RingBrackets::new(0, 4, 5),
        present: true,
        bound: (segment_words(segno) / 16 - 1) as u16,
        access,
        unpaged,
        ..Default::default()
    }
}

/// Write the tables into `mem` and return the DSBR that describes them.
pub fn load(mem: &CoreMemory) -> Result<Dsbr> {
    ensure!(mem.len() >= MIN_WORDS, "demo tables need {MIN_WORDS} words of memory, have {}", mem.len());
    for segno in 0..SEGMENTS {
        let (even, odd) = sdw_for(segno).to_pair();
        mem.load(DS_BASE + 2 * segno as u32, &[even, odd])?;
        if segno < 8 { continue; }
        let table = PAGE_TABLES + (segno as u32 - 8) * 0o10;
        for page in 0..PAGES_PER_SEGMENT {
            let frame = PAGES_BASE + ((segno as u32 - 8) * PAGES_PER_SEGMENT + page) * PAGE_WORDS;
            // The last page of segment 15 is paged out
            let present = !(segno == 15 && page == PAGES_PER_SEGMENT - 1);
            let ptw = Ptw { addr: frame >> 6, present, fault_code: if present { 0 } else { 1 }, ..Default::default() };
            mem.load(table + page, &[ptw.to_word()])?;
        }
    }
    let bound = (2 * SEGMENTS as u32).div_ceil(16) as u16 - 1;
    Ok(Dsbr { addr: DS_BASE, bound, unpaged: true, stack: 0 })
}
