//! TID reconstruction from a batch of words

use crate::hrl::{HrlWord, WORD_BITS};
use crate::tid::Tid;

use super::batch::BatchWords;

/// Decode cursor over a `BatchWords`.
///
/// The batch tracks the word position; the cursor adds the bit reached
/// inside the current uncompressed word, so decoding can stop after any
/// TID and resume there, mid-fill included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TidCursor {
    bit_pos: u32,
}

impl TidCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets to the start of a word, for a freshly positioned batch.
    pub fn reset(&mut self) {
        self.bit_pos = 0;
    }

    /// Next TID the cursor would look at.
    pub fn next_tid(&self, batch: &BatchWords) -> Tid {
        batch.next_tid() + self.bit_pos as u64
    }

    fn finish_word(&mut self, batch: &mut BatchWords) {
        batch.advance(1);
        self.bit_pos = 0;
    }

    /// Appends up to `max` set TIDs to `out` in ascending order.
    ///
    /// Returns how many were added; fewer than `max` means the batch
    /// window is used up.
    pub fn decode_next(&mut self, batch: &mut BatchWords, max: usize, out: &mut Vec<Tid>) -> usize {
        let mut added = 0;
        while added < max {
            let Some(word) = batch.peek() else {
                break;
            };
            match word {
                HrlWord::Fill { bit: false, len } => {
                    batch.advance(len);
                    self.bit_pos = 0;
                }
                HrlWord::Fill { bit: true, .. } => {
                    out.push(self.next_tid(batch));
                    added += 1;
                    self.bit_pos += 1;
                    if self.bit_pos as u64 == WORD_BITS {
                        self.finish_word(batch);
                    }
                }
                HrlWord::Literal(bits) => {
                    let rest = if self.bit_pos as u64 >= WORD_BITS {
                        0
                    } else {
                        bits & (u64::MAX << self.bit_pos)
                    };
                    if rest == 0 {
                        self.finish_word(batch);
                        continue;
                    }
                    let bit = rest.trailing_zeros();
                    out.push(batch.next_tid() + bit as u64);
                    added += 1;
                    self.bit_pos = bit + 1;
                    if self.bit_pos as u64 == WORD_BITS {
                        self.finish_word(batch);
                    }
                }
            }
        }
        added
    }

    /// Moves forward, without producing TIDs, until the cursor stands at
    /// or past `target`.
    ///
    /// Returns false when the window ran out first; the caller reloads the
    /// batch and calls again.
    pub fn catchup_to(&mut self, batch: &mut BatchWords, target: Tid) -> bool {
        let target_word = (target.max(1) - 1) / WORD_BITS;
        while let Some(word) = batch.peek() {
            if self.next_tid(batch) >= target {
                return true;
            }
            let word_no = batch.word_no();
            if target_word > word_no {
                batch.advance((target_word - word_no).min(word.word_len()));
                self.bit_pos = 0;
            } else {
                self.bit_pos = ((target - 1) % WORD_BITS) as u32;
                return true;
            }
        }
        false
    }
}
