//! Per-vector TID accumulator
//!
//! TIDs arrive in strictly increasing order. Bits collect in `last_word`
//! until a TID lands in a later word; the finished word then goes through
//! the packer, which holds back the newest complete word. Words the packer
//! releases are final and wait in `words` until the flush path moves them
//! onto pages.

use crate::errors::{BitmapError, BitmapResult, ErrorContext};
use crate::hrl::{HrlPacker, HrlWord};
use crate::lov::LovItem;
use crate::tid::{bit_index, check_tid, word_index, Tid};
use crate::wal::TailState;

/// Bytes charged per buffered word (content plus header share)
const WORD_FOOTPRINT: usize = 9;
/// Fixed bytes charged per buffer
const BUFFER_FOOTPRINT: usize = 96;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TidBuffer {
    start_tid: Tid,
    /// Last TID appended, set or not
    last_tid: Tid,
    last_setbit: Tid,
    /// Complete words so far; also the index of `last_word`
    words_covered: u64,
    packer: HrlPacker,
    last_word: u64,
    /// Final words not yet flushed
    words: Vec<HrlWord>,
}

impl TidBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continues a vector from the tail state kept in its LOV item.
    pub fn resume(item: &LovItem) -> Self {
        Self {
            start_tid: item.start_tid,
            last_tid: item.last_setbit,
            last_setbit: item.last_setbit,
            words_covered: item.words_covered,
            packer: HrlPacker::resume(item.last_compword),
            last_word: item.last_word,
            words: Vec::new(),
        }
    }

    pub fn last_tid(&self) -> Tid {
        self.last_tid
    }

    pub fn last_setbit(&self) -> Tid {
        self.last_setbit
    }

    pub fn words_covered(&self) -> u64 {
        self.words_covered
    }

    /// Final words waiting for a flush
    pub fn pending_words(&self) -> usize {
        self.words.len()
    }

    /// Approximate memory held by this buffer
    pub fn footprint(&self) -> usize {
        BUFFER_FOOTPRINT + self.words.len() * WORD_FOOTPRINT
    }

    /// Appends the presence bit of `tid`.
    ///
    /// TIDs between the previous one and `tid` are absent. Fails with a
    /// sequence error unless `tid` is above every TID appended so far.
    pub fn append(&mut self, tid: Tid, is_match: bool) -> BitmapResult<()> {
        check_tid(tid)?;
        if tid <= self.last_tid {
            return Err(BitmapError::sequence(
                format!("tid {} not above previous tid {}", tid, self.last_tid),
                ErrorContext::tid(tid),
            ));
        }

        let target = word_index(tid);
        if target > self.words_covered {
            self.complete_word();
            let gap = target - self.words_covered;
            if gap > 0 {
                let words = &mut self.words;
                self.packer.push_run(false, gap, &mut |w| words.push(w));
                self.words_covered += gap;
            }
        }

        if is_match {
            self.last_word |= 1u64 << bit_index(tid);
            self.last_setbit = tid;
            if self.start_tid == 0 {
                self.start_tid = tid;
            }
        }
        self.last_tid = tid;
        Ok(())
    }

    /// Appends one bit for the TID after the last one appended.
    pub fn encode_next_tid(&mut self, is_set: bool) -> BitmapResult<()> {
        self.append(self.last_tid + 1, is_set)
    }

    fn complete_word(&mut self) {
        let word = HrlWord::Literal(self.last_word);
        let words = &mut self.words;
        self.packer.push(word, &mut |w| words.push(w));
        self.words_covered += 1;
        self.last_word = 0;
    }

    /// Sets `tid` inside the held-back word, splitting a 0-fill if needed.
    ///
    /// Returns false when the bit was already set, including in words an
    /// earlier split released that are still waiting for a flush. Words a
    /// split releases join the flush queue.
    pub fn set_in_pending(&mut self, tid: Tid) -> BitmapResult<bool> {
        let pending = self.packer.pending().ok_or_else(|| {
            BitmapError::invalid_argument(
                "no held-back word to update",
                ErrorContext::tid(tid),
            )
        })?;
        let first = self.words_covered - pending.word_len();
        let index = word_index(tid);
        if index < first && self.released_bit(tid, first) == Some(true) {
            return Ok(false);
        }
        if index < first || index >= self.words_covered {
            return Err(BitmapError::invalid_argument(
                format!(
                    "tid {} outside held-back words {}..{}",
                    tid, first, self.words_covered
                ),
                ErrorContext::tid(tid),
            ));
        }
        let bit = 1u64 << bit_index(tid);
        let offset = index - first;

        let mut packer = HrlPacker::new();
        let words = &mut self.words;
        let mut emit = |w| words.push(w);
        match pending {
            HrlWord::Literal(w) if w & bit != 0 => return Ok(false),
            HrlWord::Literal(w) => packer.push(HrlWord::Literal(w | bit), &mut emit),
            HrlWord::Fill { bit: true, .. } => return Ok(false),
            HrlWord::Fill { bit: false, len } => {
                if offset > 0 {
                    packer.push_run(false, offset, &mut emit);
                }
                packer.push(HrlWord::Literal(bit), &mut emit);
                if len - offset - 1 > 0 {
                    packer.push_run(false, len - offset - 1, &mut emit);
                }
            }
        }
        self.packer = packer;
        if self.start_tid == 0 || tid < self.start_tid {
            self.start_tid = tid;
        }
        Ok(true)
    }

    /// Whether `tid` is set in the unflushed words, which end at word
    /// `end`. None when those words do not reach back to it.
    fn released_bit(&self, tid: Tid, end: u64) -> Option<bool> {
        let index = word_index(tid);
        let mut start = end;
        for word in self.words.iter().rev() {
            start = start.checked_sub(word.word_len())?;
            if index >= start {
                return Some(match *word {
                    HrlWord::Literal(w) => w & (1u64 << bit_index(tid)) != 0,
                    HrlWord::Fill { bit, .. } => bit,
                });
            }
        }
        None
    }

    /// Sets `tid` inside the partial word.
    pub fn set_in_last_word(&mut self, tid: Tid) -> bool {
        let bit = 1u64 << bit_index(tid);
        if self.last_word & bit != 0 {
            return false;
        }
        self.last_word |= bit;
        if tid > self.last_setbit {
            self.last_setbit = tid;
        }
        if self.start_tid == 0 || tid < self.start_tid {
            self.start_tid = tid;
        }
        true
    }

    /// Removes the final words for flushing.
    pub fn take_words(&mut self) -> Vec<HrlWord> {
        std::mem::take(&mut self.words)
    }

    /// The state that stays in the LOV item after a flush.
    pub fn tail(&self) -> TailState {
        TailState {
            start_tid: self.start_tid,
            last_compword: self.packer.pending(),
            last_word: self.last_word,
            last_setbit: self.last_setbit,
            words_covered: self.words_covered,
        }
    }
}
