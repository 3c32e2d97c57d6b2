//! Machine word widths. Storage types are the smallest host integer that holds the field.

pub type Word36 = u64;
pub type Word24 = u32;
pub type Word18 = u32;
pub type Word15 = u16;
pub type Word14 = u16;
pub type Word12 = u16;
pub type Word3 = u8;
pub type Word2 = u8;

pub const DMASK: Word36 = (1 << 36) - 1;
pub const PAMASK: Word24 = (1 << 24) - 1;
pub const MASK18: Word18 = (1 << 18) - 1;
pub const MASK15: Word15 = (1 << 15) - 1;
pub const MASK14: Word14 = (1 << 14) - 1;

/// Page number bits of an 18-bit segment offset (1024-word pages).
pub const PG18MASK: Word18 = 0o776000;
/// Word-within-page bits of an 18-bit segment offset.
pub const OS18MASK: Word18 = 0o001777;
pub const PAGE_WORDS: u32 = 1024;

/// Extract `width` bits starting `shift` bits above the least significant bit.
#[inline]
pub fn field(word: Word36, shift: u32, width: u32) -> u64 { (word >> shift) & ((1u64 << width) - 1) }

/// Replace `width` bits starting at `shift` with `val` (excess bits of `val` are dropped).
#[inline]
pub fn with_field(word: Word36, shift: u32, width: u32, val: u64) -> Word36 {
    let mask = ((1u64 << width) - 1) << shift;
    (word & !mask) | ((val << shift) & mask)
}

#[inline]
pub fn bit(word: Word36, pos: u32) -> bool { (word >> pos) & 1 != 0 }

#[inline]
pub fn with_bit(word: Word36, pos: u32, on: bool) -> Word36 { with_field(word, pos, 1, on as u64) }
