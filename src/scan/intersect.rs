//! AND of several vectors over their compressed words
//!
//! Steps the readers in lockstep like the union. A TID survives only when
//! every vector has it, so the first reader to end ends the result: the
//! words past a vector's end are all zero.

use crate::errors::BitmapResult;
use crate::hrl::{HrlPacker, HrlWord};
use crate::page::PageStore;

use super::reader::VectorReader;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorIntersect {
    packer: HrlPacker,
    finished: bool,
}

impl VectorIntersect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Produces up to `max_words` intersected words. Fewer come back only
    /// once the intersection is finished.
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
            let mut merged = u64::MAX;
            let mut any_ended = readers.is_empty();
            for reader in readers.iter() {
                match reader.batch.peek() {
                    Some(word) => {
                        step = step.min(word.word_len());
                        all_fills &= word.is_fill();
                        merged &= word.expanded();
                    }
                    None => any_ended = true,
                }
            }

            if any_ended {
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

    fn intersect_all(readers: &mut [VectorReader]) -> Vec<u64> {
        let store = MemoryPageStore::new(256);
        let mut intersect = VectorIntersect::new();
        let mut words = Vec::new();
        while !intersect.is_finished() {
            words.extend(intersect.merge(readers, &store, 1).unwrap());
        }
        expand_words(&words)
    }

    #[test]
    fn test_shortest_vector_ends_result() {
        let mut readers = vec![
            tail_only(Some(HrlWord::Fill { bit: true, len: 3 }), 0b1),
            tail_only(Some(HrlWord::Fill { bit: true, len: 2 }), 0),
        ];
        assert_eq!(intersect_all(&mut readers), vec![u64::MAX, u64::MAX]);
    }

    #[test]
    fn test_literals_are_anded() {
        let mut readers = vec![
            tail_only(Some(HrlWord::Literal(0b0111)), 0b1100),
            tail_only(Some(HrlWord::Literal(0b0110)), 0b0101),
        ];
        assert_eq!(intersect_all(&mut readers), vec![0b0110, 0b0100]);
    }

    #[test]
    fn test_zero_fill_masks_literals() {
        let mut readers = vec![
            tail_only(Some(HrlWord::Fill { bit: false, len: 2 }), 0b11),
            tail_only(Some(HrlWord::Literal(0b1)), 0b10),
        ];
        assert_eq!(intersect_all(&mut readers), vec![0, 0]);
    }

    #[test]
    fn test_no_inputs_finishes_empty() {
        let mut readers: Vec<VectorReader> = Vec::new();
        assert!(intersect_all(&mut readers).is_empty());
    }
}
