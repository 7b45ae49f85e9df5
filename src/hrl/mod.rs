//! Hybrid Run-Length (HRL) word codec
//!
//! Bitmap vectors are sequences of 64-bit words. Each word is a literal
//! bitmap or a fill standing for a run of all-0 or all-1 words, and a
//! parallel header bit stream marks which is which.
//!
//! # Invariants
//!
//! - Stored fills have a run length of at least 2 and at most MAX_FILL_LENGTH
//! - Header bits and content words always have the same length
//! - Only the most recent complete word of a vector may still change

mod packer;
mod word;

pub use packer::{compress_words, expand_words, HrlPacker};
pub use word::{
    decode_words, encode_words, HeaderBits, HrlWord, FILL_LENGTH_BITS, FILL_VALUE_BIT,
    LITERAL_ALL_ONE, LITERAL_ALL_ZERO, MAX_FILL_LENGTH, WORD_BITS,
};
