//! Scan position: per-vector readers, how their words combine, and the
//! decode state over the combined words.
//!
//! A position is plain owned data, so marking one is a clone and
//! restoring never rereads storage.

use std::collections::VecDeque;

use crate::errors::BitmapResult;
use crate::hrl::HrlWord;
use crate::page::PageStore;
use crate::tid::Tid;

use super::batch::BatchWords;
use super::intersect::VectorIntersect;
use super::iterate::TidCursor;
use super::reader::VectorReader;
use super::union::VectorUnion;

/// OR for disjunctive predicates, AND for conjunctive ones.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Combine {
    Union(VectorUnion),
    Intersect(VectorIntersect),
}

impl Combine {
    fn is_finished(&self) -> bool {
        match self {
            Combine::Union(u) => u.is_finished(),
            Combine::Intersect(i) => i.is_finished(),
        }
    }

    fn merge<S: PageStore + ?Sized>(
        &mut self,
        readers: &mut [VectorReader],
        store: &S,
        max_words: usize,
    ) -> BitmapResult<Vec<HrlWord>> {
        match self {
            Combine::Union(u) => u.merge(readers, store, max_words),
            Combine::Intersect(i) => i.merge(readers, store, max_words),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPosition {
    readers: Vec<VectorReader>,
    combine: Combine,
    merged: BatchWords,
    cursor: TidCursor,
    /// Decoded TIDs not yet handed out
    pending: VecDeque<Tid>,
    done: bool,
}

impl ScanPosition {
    /// TIDs in any of the vectors.
    pub fn new(readers: Vec<VectorReader>) -> Self {
        Self::with_combine(readers, Combine::Union(VectorUnion::new()))
    }

    /// TIDs in all of the vectors.
    pub fn intersect(readers: Vec<VectorReader>) -> Self {
        Self::with_combine(readers, Combine::Intersect(VectorIntersect::new()))
    }

    fn with_combine(readers: Vec<VectorReader>, combine: Combine) -> Self {
        Self {
            readers,
            combine,
            merged: BatchWords::new(),
            cursor: TidCursor::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }

    pub fn vector_count(&self) -> usize {
        self.readers.len()
    }

    /// No TID is left.
    pub fn is_done(&self) -> bool {
        self.done && self.pending.is_empty()
    }

    /// Makes the merged window non-empty, or returns false at the end.
    fn ensure_merged<S: PageStore + ?Sized>(
        &mut self,
        store: &S,
        batch_words: usize,
    ) -> BitmapResult<bool> {
        while self.merged.is_empty() {
            if self.merged.is_done() {
                self.done = true;
                return Ok(false);
            }
            let words = self.combine.merge(&mut self.readers, store, batch_words)?;
            self.merged.load(words, self.combine.is_finished());
        }
        Ok(true)
    }

    /// Decodes the next group of at most `batch_tids` TIDs.
    pub fn prime<S: PageStore + ?Sized>(
        &mut self,
        store: &S,
        batch_words: usize,
        batch_tids: usize,
    ) -> BitmapResult<()> {
        let mut out = Vec::with_capacity(batch_tids);
        while self.pending.is_empty() && !self.done {
            if !self.ensure_merged(store, batch_words)? {
                break;
            }
            self.cursor.decode_next(&mut self.merged, batch_tids.max(1), &mut out);
            self.pending.extend(out.drain(..));
        }
        Ok(())
    }

    pub fn next_tid<S: PageStore + ?Sized>(
        &mut self,
        store: &S,
        batch_words: usize,
        batch_tids: usize,
    ) -> BitmapResult<Option<Tid>> {
        if self.pending.is_empty() {
            self.prime(store, batch_words, batch_tids)?;
        }
        Ok(self.pending.pop_front())
    }

    /// Positions on the first TID at or above `target`.
    pub fn skip_to<S: PageStore + ?Sized>(
        &mut self,
        store: &S,
        batch_words: usize,
        target: Tid,
    ) -> BitmapResult<()> {
        while self.pending.front().is_some_and(|&tid| tid < target) {
            self.pending.pop_front();
        }
        if !self.pending.is_empty() {
            return Ok(());
        }
        while self.ensure_merged(store, batch_words)? {
            if self.cursor.catchup_to(&mut self.merged, target) {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hrl::HrlWord;
    use crate::lov::{LovItem, LovLocation};
    use crate::page::MemoryPageStore;

    fn position() -> ScanPosition {
        let item = LovItem {
            start_tid: 3,
            last_compword: Some(HrlWord::Literal(0b100)),
            last_word: 0b11,
            last_setbit: 66,
            words_covered: 1,
            ..LovItem::default()
        };
        ScanPosition::new(vec![VectorReader::new(LovLocation::new(1, 0), item, 2)])
    }

    #[test]
    fn test_walks_all_tids() {
        let store = MemoryPageStore::new(256);
        let mut pos = position();
        let mut tids = Vec::new();
        while let Some(tid) = pos.next_tid(&store, 2, 1).unwrap() {
            tids.push(tid);
        }
        assert_eq!(tids, vec![3, 65, 66]);
        assert!(pos.is_done());
    }

    #[test]
    fn test_clone_resumes_identically() {
        let store = MemoryPageStore::new(256);
        let mut pos = position();
        pos.next_tid(&store, 2, 1).unwrap();
        let mut copy = pos.clone();
        assert_eq!(pos.next_tid(&store, 2, 1).unwrap(), Some(65));
        assert_eq!(copy.next_tid(&store, 2, 1).unwrap(), Some(65));
    }

    #[test]
    fn test_intersect_keeps_common_tids() {
        let store = MemoryPageStore::new(256);
        let other = LovItem {
            start_tid: 1,
            last_compword: Some(HrlWord::Literal(0b101)),
            last_word: 0b10,
            last_setbit: 66,
            words_covered: 1,
            ..LovItem::default()
        };
        let mut base = position();
        let mut pos = ScanPosition::intersect(vec![
            base.readers.remove(0),
            VectorReader::new(LovLocation::new(1, 1), other, 2),
        ]);
        let mut tids = Vec::new();
        while let Some(tid) = pos.next_tid(&store, 2, 1).unwrap() {
            tids.push(tid);
        }
        assert_eq!(tids, vec![3, 66]);
    }

    #[test]
    fn test_skip_to() {
        let store = MemoryPageStore::new(256);
        let mut pos = position();
        pos.skip_to(&store, 2, 60).unwrap();
        assert_eq!(pos.next_tid(&store, 2, 4).unwrap(), Some(65));
        pos.skip_to(&store, 2, 100).unwrap();
        assert_eq!(pos.next_tid(&store, 2, 4).unwrap(), None);
    }
}
