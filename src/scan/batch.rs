//! Window of compressed words with a read cursor
//!
//! The cursor can stop inside a fill, so a batch tracks how many of the
//! current word's uncompressed words were already consumed.

use crate::hrl::{HrlWord, WORD_BITS};
use crate::tid::Tid;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchWords {
    words: Vec<HrlWord>,
    pos: usize,
    /// Uncompressed words of `words[pos]` already consumed
    consumed: u64,
    /// Absolute index of the next uncompressed word
    word_no: u64,
    /// Absolute index of the first word of the current window
    first_word_no: u64,
    /// The source has nothing more to load
    done: bool,
}

impl BatchWords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the consumed window with `words`, continuing at the same
    /// absolute position.
    pub fn load(&mut self, words: Vec<HrlWord>, done: bool) {
        self.words = words;
        self.pos = 0;
        self.consumed = 0;
        self.first_word_no = self.word_no;
        self.done = done;
    }

    pub fn mark_done(&mut self) {
        self.done = true;
    }

    /// Nothing left in the window
    pub fn is_empty(&self) -> bool {
        self.pos >= self.words.len()
    }

    /// Nothing left in the window or the source
    pub fn is_exhausted(&self) -> bool {
        self.is_empty() && self.done
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Absolute index of the next uncompressed word
    pub fn word_no(&self) -> u64 {
        self.word_no
    }

    /// TID of the first bit of the window
    pub fn first_tid(&self) -> Tid {
        self.first_word_no * WORD_BITS + 1
    }

    /// TID of the first bit not yet consumed
    pub fn next_tid(&self) -> Tid {
        self.word_no * WORD_BITS + 1
    }

    /// Words loaded in the current window
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// The unconsumed part of the current word.
    pub fn peek(&self) -> Option<HrlWord> {
        let word = *self.words.get(self.pos)?;
        Some(match word {
            HrlWord::Fill { bit, len } => HrlWord::Fill {
                bit,
                len: len - self.consumed,
            },
            literal => literal,
        })
    }

    /// Consumes `n` uncompressed words, never past the current word.
    pub fn advance(&mut self, n: u64) {
        let Some(word) = self.words.get(self.pos) else {
            return;
        };
        let remaining = word.word_len() - self.consumed;
        let n = n.min(remaining);
        self.word_no += n;
        if n == remaining {
            self.pos += 1;
            self.consumed = 0;
        } else {
            self.consumed += n;
        }
    }
}
