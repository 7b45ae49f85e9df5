//! Row identifiers and their position in a bitmap vector
//!
//! TIDs are numbered from 1. Word `i` of every vector covers TIDs
//! `64*i + 1 ..= 64*i + 64`, least-significant bit first, so vectors for
//! different keys line up by absolute word index.

use crate::errors::{BitmapError, BitmapResult, ErrorContext};
use crate::hrl::WORD_BITS;

/// Row identifier as stored in a bitmap vector
pub type Tid = u64;

/// Highest TID an index accepts (48-bit heap address space)
pub const MAX_TID: Tid = (1 << 48) - 1;

/// Heap tuple address: block number and 1-based line pointer offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemPointer {
    pub block: u32,
    pub offset: u16,
}

impl ItemPointer {
    pub fn new(block: u32, offset: u16) -> Self {
        Self { block, offset }
    }

    /// Converts to the TID numbering used inside vectors.
    ///
    /// Offset 0 is not a valid line pointer and is rejected.
    pub fn to_tid(self) -> BitmapResult<Tid> {
        if self.offset == 0 {
            return Err(BitmapError::invalid_argument(
                format!("item pointer ({}, 0) has no line pointer", self.block),
                ErrorContext::none(),
            ));
        }
        Ok(((self.block as u64) << 16) | self.offset as u64)
    }

    pub fn from_tid(tid: Tid) -> Self {
        Self {
            block: (tid >> 16) as u32,
            offset: (tid & 0xFFFF) as u16,
        }
    }
}

/// Rejects TIDs outside `1..=MAX_TID`.
pub fn check_tid(tid: Tid) -> BitmapResult<()> {
    if tid == 0 || tid > MAX_TID {
        return Err(BitmapError::invalid_argument(
            format!("tid {} outside 1..={}", tid, MAX_TID),
            ErrorContext::tid(tid),
        ));
    }
    Ok(())
}

/// Absolute word index containing `tid`
pub fn word_index(tid: Tid) -> u64 {
    (tid - 1) / WORD_BITS
}

/// Bit position of `tid` within its word
pub fn bit_index(tid: Tid) -> u32 {
    ((tid - 1) % WORD_BITS) as u32
}

/// First TID covered by word `index`
pub fn first_tid_of_word(index: u64) -> Tid {
    index * WORD_BITS + 1
}
