use std::sync::atomic::{AtomicU64, Ordering};

use apu::{PhysMem, PhysMemError, Word24, Word36, DMASK};

/// Spare bit above the 36 data bits, used as the per-word lock by the fine-grained discipline.
pub const MEM_LOCKED_BIT: u32 = 61;
pub const MEM_LOCKED: u64 = 1 << MEM_LOCKED_BIT;

/// The atomic operations the lock manager and memory need from a memory cell.
pub trait AtomicWord {
    fn load_acquire(&self) -> u64;
    fn store_release(&self, val: u64);
    /// `Ok(previous)` if the cell held `current` and now holds `new`, else `Err(actual)`.
    fn compare_swap(&self, current: u64, new: u64) -> Result<u64, u64>;
    /// Atomic fetch-or; returns the previous value.
    fn set_bits(&self, bits: u64) -> u64;
    /// Atomic fetch-and with `!bits`; returns the previous value.
    fn clear_bits(&self, bits: u64) -> u64;
}

impl AtomicWord for AtomicU64 {
    #[inline] fn load_acquire(&self) -> u64 { self.load(Ordering::Acquire) }
    #[inline] fn store_release(&self, val: u64) { self.store(val, Ordering::Release) }
    #[inline]
    fn compare_swap(&self, current: u64, new: u64) -> Result<u64, u64> {
        self.compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
    }
    #[inline] fn set_bits(&self, bits: u64) -> u64 { self.fetch_or(bits, Ordering::AcqRel) }
    #[inline] fn clear_bits(&self, bits: u64) -> u64 { self.fetch_and(!bits, Ordering::AcqRel) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MemError {
    #[error("address {0:08o} out of range")] OutOfRange(Word24),
}

impl From<MemError> for PhysMemError {
    fn from(e: MemError) -> Self { match e { MemError::OutOfRange(a) => PhysMemError::NonExistent(a) } }
}

/// Main memory shared by every processor thread. Each cell holds a 36-bit word plus the lock bit.
#[derive(Debug)]
pub struct CoreMemory {
    words: Box<[AtomicU64]>,
}

impl CoreMemory {
    pub fn new(words: usize) -> Self { Self { words: (0..words).map(|_| AtomicU64::new(0)).collect() } }

    pub fn len(&self) -> usize { self.words.len() }
    pub fn is_empty(&self) -> bool { self.words.is_empty() }

    pub fn cell(&self, addr: Word24) -> Result<&AtomicU64, MemError> {
        self.words.get(addr as usize).ok_or(MemError::OutOfRange(addr))
    }

    /// Unsynchronized read of the data bits.
    pub fn read(&self, addr: Word24) -> Result<Word36, MemError> { Ok(self.cell(addr)?.load_acquire() & DMASK) }

    /// Unsynchronized store of the data bits; clears the cell's lock bit.
    pub fn write(&self, addr: Word24, val: Word36) -> Result<(), MemError> {
        self.cell(addr)?.store_release(val & DMASK);
        Ok(())
    }

    pub fn is_word_locked(&self, addr: Word24) -> Result<bool, MemError> { Ok(self.cell(addr)?.load_acquire() & MEM_LOCKED != 0) }

    /// Copy `words` into memory starting at `base`.
    pub fn load(&self, base: Word24, words: &[Word36]) -> Result<(), MemError> {
        words.iter().enumerate().try_for_each(|(i, w)| self.write(base + i as Word24, *w))
    }
}

impl PhysMem for CoreMemory {
    fn read_word(&self, addr: Word24) -> Result<Word36, PhysMemError> { Ok(self.read(addr)?) }
}
