//! OR of several vectors over their compressed words
//!
//! Every vector starts at word 0, so the readers that have not ended
//! always stand at the same absolute word. Each step consumes the same
//! number of uncompressed words from all of them: the shortest remaining
//! fill when every reader is inside a fill, one word otherwise. The
//! merged words are packed again, since fills of different vectors rarely
//! line up into one fill.

use crate::errors::BitmapResult;
use crate::hrl::{HrlPacker, HrlWord};
use crate::page::PageStore;

use super::reader::VectorReader;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorUnion {
    packer: HrlPacker,
    finished: bool,
}

impl VectorUnion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every input has ended and the last merged word was produced.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Produces up to `max_words` merged words, refilling readers whose
    /// window ran dry. Fewer words come back only once the union is
    /// finished.
    pub fn merge<S: PageStore + ?Sized>(
        &mut self,
        readers: &mut [VectorReader],
        store: &S,
        max_words: usize,
    ) -> BitmapResult<Vec<HrlWord>> {
        let mut out = Vec::new();
        while !self.finished && out.len() < max_words.max(1) {
            for reader in readers.iter_mut() {
                if reader.batch.is_empty() && !reader.batch.is_done() {
                    reader.refill(store)?;
                }
            }

            let mut step = u64::MAX;
            let mut all_fills = true;
            let mut merged = 0u64;
            let mut any_active = false;
            for word in readers.iter().filter_map(|r| r.batch.peek()) {
                any_active = true;
                step = step.min(word.word_len());
                all_fills &= word.is_fill();
                merged |= word.expanded();
            }

            if !any_active {
                self.packer.flush(&mut |w| out.push(w));
                self.finished = true;
                break;
            }

            if all_fills {
                self.packer.push_run(merged != 0, step, &mut |w| out.push(w));
            } else {
                step = 1;
                self.packer.push(HrlWord::Literal(merged), &mut |w| out.push(w));
            }
            for reader in readers.iter_mut() {
                reader.batch.advance(step);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hrl::expand_words;
    use crate::lov::{LovItem, LovLocation};
    use crate::page::MemoryPageStore;

    /// Vector with no pages, just the tail words.
    fn tail_only(compword: Option<HrlWord>, last_word: u64) -> VectorReader {
        let words_covered = compword.map(|w| w.word_len()).unwrap_or(0);
        let item = LovItem {
            start_tid: 1,
            last_compword: compword,
            last_word,
            last_setbit: 1,
            words_covered,
            ..LovItem::default()
        };
        VectorReader::new(LovLocation::new(1, 0), item, 4)
    }

    fn merge_all(readers: &mut [VectorReader]) -> Vec<u64> {
        let store = MemoryPageStore::new(256);
        let mut union = VectorUnion::new();
        let mut words = Vec::new();
        while !union.is_finished() {
            words.extend(union.merge(readers, &store, 1).unwrap());
        }
        expand_words(&words)
    }

    #[test]
    fn test_fills_of_different_lengths() {
        let mut readers = vec![
            tail_only(Some(HrlWord::Fill { bit: false, len: 3 }), 0b1),
            tail_only(Some(HrlWord::Fill { bit: true, len: 2 }), 0),
        ];
        // the second vector has no partial word, so it ends after two words
        assert_eq!(merge_all(&mut readers), vec![u64::MAX, u64::MAX, 0, 1]);
    }

    #[test]
    fn test_literals_are_ored() {
        let mut readers = vec![
            tail_only(Some(HrlWord::Literal(0b0011)), 0b1000),
            tail_only(Some(HrlWord::Literal(0b0100)), 0),
        ];
        assert_eq!(merge_all(&mut readers), vec![0b0111, 0b1000]);
    }

    #[test]
    fn test_no_inputs_finishes_empty() {
        let mut readers: Vec<VectorReader> = Vec::new();
        assert!(merge_all(&mut readers).is_empty());
    }
}
