//! Fill/literal packing
//!
//! The packer holds back the most recent complete word because the next
//! word may still extend it: a fill can grow, and a single uniform literal
//! becomes a fill once a second uniform word of the same value arrives.
//! Everything older is final and is handed to the caller's sink.

use super::word::{HrlWord, MAX_FILL_LENGTH};

/// Incremental fill/literal packer with one word of look-behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HrlPacker {
    // Runs of length 1 are kept as fills here and leave as literals.
    pending: Option<HrlWord>,
}

impl HrlPacker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resumes packing after `tail`, the last word produced earlier.
    pub fn resume(tail: Option<HrlWord>) -> Self {
        Self {
            pending: tail.map(as_run),
        }
    }

    /// The word still held back, as it would be stored.
    pub fn pending(&self) -> Option<HrlWord> {
        self.pending.map(as_stored)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_none()
    }

    /// Uncompressed words held back
    pub fn pending_len(&self) -> u64 {
        self.pending.map(|w| w.word_len()).unwrap_or(0)
    }

    /// Appends one word, literal or fill.
    pub fn push<F: FnMut(HrlWord)>(&mut self, word: HrlWord, emit: &mut F) {
        match as_run(word) {
            HrlWord::Fill { bit, len } => self.push_run(bit, len, emit),
            literal => {
                self.flush(emit);
                self.pending = Some(literal);
            }
        }
    }

    /// Appends `len` uncompressed words that are all `bit`.
    pub fn push_run<F: FnMut(HrlWord)>(&mut self, bit: bool, mut len: u64, emit: &mut F) {
        while len > 0 {
            match self.pending {
                Some(HrlWord::Fill { bit: run_bit, len: run_len })
                    if run_bit == bit && run_len < MAX_FILL_LENGTH =>
                {
                    let take = len.min(MAX_FILL_LENGTH - run_len);
                    self.pending = Some(HrlWord::Fill {
                        bit,
                        len: run_len + take,
                    });
                    len -= take;
                }
                _ => {
                    self.flush(emit);
                    let take = len.min(MAX_FILL_LENGTH);
                    self.pending = Some(HrlWord::Fill { bit, len: take });
                    len -= take;
                }
            }
        }
    }

    /// Releases the held-back word.
    pub fn flush<F: FnMut(HrlWord)>(&mut self, emit: &mut F) {
        if let Some(word) = self.pending.take() {
            emit(as_stored(word));
        }
    }
}

fn as_run(word: HrlWord) -> HrlWord {
    match word.uniform() {
        Some(bit) if !word.is_fill() => HrlWord::Fill { bit, len: 1 },
        _ => word,
    }
}

fn as_stored(word: HrlWord) -> HrlWord {
    match word {
        HrlWord::Fill { len: 1, .. } => HrlWord::Literal(word.expanded()),
        other => other,
    }
}

/// Compresses a sequence of uncompressed words.
pub fn compress_words(words: &[u64]) -> Vec<HrlWord> {
    let mut packer = HrlPacker::new();
    let mut out = Vec::new();
    let mut sink = |w| out.push(w);
    for &w in words {
        packer.push(HrlWord::Literal(w), &mut sink);
    }
    packer.flush(&mut sink);
    out
}

/// Expands compressed words back to uncompressed words.
pub fn expand_words(words: &[HrlWord]) -> Vec<u64> {
    let mut out = Vec::new();
    for word in words {
        for _ in 0..word.word_len() {
            out.push(word.expanded());
        }
    }
    out
}
