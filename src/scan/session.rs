//! Index scan sessions
//!
//! States: `Uninitialized -> Positioned -> Exhausted`. `first` resolves
//! the predicate to LOV entries and opens one reader per vector, each on
//! a snapshot of its LOV item. Conjunctive predicates intersect the
//! vectors, all others merge them. An error or the end of the vectors
//! exhausts the scan, which then yields nothing until `first` or `rescan`
//! is called again.

use crate::errors::{BitmapError, BitmapResult, ErrorContext};
use crate::index::BitmapIndex;
use crate::lov::ScanPredicate;
use crate::observability::Logger;
use crate::page::PageStore;
use crate::tid::Tid;
use crate::wal::WalSink;

use super::position::ScanPosition;
use super::reader::VectorReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    Forward,
    /// Not supported by bitmap vectors
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Uninitialized,
    Positioned,
    Exhausted,
}

/// Saved scan position, restored with `IndexScan::restore`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanMark {
    state: ScanState,
    position: Option<ScanPosition>,
}

pub struct IndexScan<'a, S: PageStore, W: WalSink> {
    index: &'a BitmapIndex<S, W>,
    predicate: ScanPredicate,
    state: ScanState,
    position: Option<ScanPosition>,
}

impl<'a, S: PageStore, W: WalSink> IndexScan<'a, S, W> {
    pub(crate) fn new(index: &'a BitmapIndex<S, W>, predicate: ScanPredicate) -> Self {
        Self {
            index,
            predicate,
            state: ScanState::Uninitialized,
            position: None,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn predicate(&self) -> &ScanPredicate {
        &self.predicate
    }

    fn check_direction(direction: ScanDirection) -> BitmapResult<()> {
        match direction {
            ScanDirection::Forward => Ok(()),
            ScanDirection::Backward => Err(BitmapError::invalid_argument(
                "bitmap scans only move forward",
                ErrorContext::none(),
            )),
        }
    }

    /// Positions the scan before its first TID, starting over if it was
    /// already positioned or exhausted.
    pub fn first(&mut self, direction: ScanDirection) -> BitmapResult<()> {
        Self::check_direction(direction)?;
        let locations = self.index.matching_entries(&self.predicate)?;
        let conjunctive = self.predicate.is_conjunctive();
        let batch_words = self.index.options().batch_words;
        let mut readers = Vec::with_capacity(locations.len());
        for location in locations {
            let item = self.index.read_item(location)?;
            if item.is_empty() {
                if conjunctive {
                    // one empty vector empties the intersection
                    readers.clear();
                    break;
                }
                continue;
            }
            readers.push(VectorReader::new(location, item, batch_words));
        }
        Logger::trace(
            "BITMAP_SCAN_POSITIONED",
            &[
                ("conjunctive", if conjunctive { "true" } else { "false" }),
                ("vectors", &readers.len().to_string()),
            ],
        );

        let mut position = if conjunctive {
            ScanPosition::intersect(readers)
        } else {
            ScanPosition::new(readers)
        };
        let options = self.index.options();
        position.prime(self.index.store(), options.batch_words, options.batch_tids)?;
        self.index.metrics.increment_scans();
        self.state = if position.is_done() {
            ScanState::Exhausted
        } else {
            ScanState::Positioned
        };
        self.position = Some(position);
        Ok(())
    }

    /// Next matching TID in ascending order. A storage error exhausts
    /// the scan.
    pub fn next_tid(&mut self, direction: ScanDirection) -> BitmapResult<Option<Tid>> {
        Self::check_direction(direction)?;
        let result = self.advance(direction);
        if result.is_err() {
            self.state = ScanState::Exhausted;
        }
        result
    }

    fn advance(&mut self, direction: ScanDirection) -> BitmapResult<Option<Tid>> {
        if self.state == ScanState::Uninitialized {
            self.first(direction)?;
        }
        if self.state == ScanState::Exhausted {
            return Ok(None);
        }
        let options = self.index.options();
        let Some(position) = self.position.as_mut() else {
            self.state = ScanState::Exhausted;
            return Ok(None);
        };
        match position.next_tid(self.index.store(), options.batch_words, options.batch_tids)? {
            Some(tid) => {
                self.index.metrics.add_tids_returned(1);
                Ok(Some(tid))
            }
            None => {
                self.state = ScanState::Exhausted;
                Ok(None)
            }
        }
    }

    /// Up to `k` TIDs; an empty result means the scan is exhausted.
    pub fn next_batch(&mut self, k: usize) -> BitmapResult<Vec<Tid>> {
        let mut tids = Vec::with_capacity(k.min(1024));
        while tids.len() < k {
            match self.next_tid(ScanDirection::Forward)? {
                Some(tid) => tids.push(tid),
                None => break,
            }
        }
        Ok(tids)
    }

    /// Moves to the first matching TID at or above `target` and returns it.
    pub fn skip_to(&mut self, target: Tid) -> BitmapResult<Option<Tid>> {
        if let Err(e) = self.position_at(target) {
            self.state = ScanState::Exhausted;
            return Err(e);
        }
        self.next_tid(ScanDirection::Forward)
    }

    fn position_at(&mut self, target: Tid) -> BitmapResult<()> {
        if self.state == ScanState::Uninitialized {
            self.first(ScanDirection::Forward)?;
        }
        if self.state == ScanState::Positioned {
            if let Some(position) = self.position.as_mut() {
                position.skip_to(self.index.store(), self.index.options().batch_words, target)?;
            }
        }
        Ok(())
    }

    /// Every remaining TID, ascending.
    pub fn collect_bitmap(&mut self) -> BitmapResult<Vec<Tid>> {
        let mut tids = Vec::new();
        while let Some(tid) = self.next_tid(ScanDirection::Forward)? {
            tids.push(tid);
        }
        Ok(tids)
    }

    pub fn mark(&self) -> ScanMark {
        ScanMark {
            state: self.state,
            position: self.position.clone(),
        }
    }

    pub fn restore(&mut self, mark: &ScanMark) {
        self.state = mark.state;
        self.position = mark.position.clone();
    }

    /// Replaces the predicate; the next pull starts a new pass.
    pub fn rescan(&mut self, predicate: ScanPredicate) {
        self.predicate = predicate;
        self.state = ScanState::Uninitialized;
        self.position = None;
    }
}

impl<S: PageStore, W: WalSink> Iterator for IndexScan<'_, S, W> {
    type Item = BitmapResult<Tid>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_tid(ScanDirection::Forward).transpose()
    }
}

impl<S: PageStore, W: WalSink> BitmapIndex<S, W> {
    /// Opens a scan over the vectors whose keys satisfy `predicate`.
    pub fn scan(&self, predicate: ScanPredicate) -> IndexScan<'_, S, W> {
        IndexScan::new(self, predicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexOptions;
    use crate::lov::{AttributeType, IndexSchema, LovKey};
    use crate::page::{MemoryPageStore, Page};
    use crate::wal::MemoryWal;

    fn index() -> BitmapIndex<MemoryPageStore, MemoryWal> {
        let schema = IndexSchema::new(vec![AttributeType::Text]).unwrap();
        BitmapIndex::create(
            MemoryPageStore::new(256),
            MemoryWal::new(),
            schema,
            IndexOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_backward_rejected() {
        let index = index();
        let mut scan = index.scan(ScanPredicate::Eq(LovKey::text("A")));
        let err = scan.first(ScanDirection::Backward).unwrap_err();
        assert_eq!(err.code(), "AERO_BITMAP_INVALID_ARGUMENT");
        assert_eq!(scan.state(), ScanState::Uninitialized);
    }

    #[test]
    fn test_missing_key_is_exhausted() {
        let index = index();
        let mut scan = index.scan(ScanPredicate::Eq(LovKey::text("nothing")));
        scan.first(ScanDirection::Forward).unwrap();
        assert_eq!(scan.state(), ScanState::Exhausted);
        assert!(scan.collect_bitmap().unwrap().is_empty());
    }

    #[test]
    fn test_state_transitions_and_rescan() {
        let index = index();
        let mut session = index.build();
        session.add(&LovKey::text("A"), 4).unwrap();
        session.add(&LovKey::text("B"), 7).unwrap();
        session.finish().unwrap();

        let mut scan = index.scan(ScanPredicate::Eq(LovKey::text("A")));
        assert_eq!(scan.next_tid(ScanDirection::Forward).unwrap(), Some(4));
        assert_eq!(scan.state(), ScanState::Positioned);
        assert_eq!(scan.next_tid(ScanDirection::Forward).unwrap(), None);
        assert_eq!(scan.state(), ScanState::Exhausted);

        scan.rescan(ScanPredicate::Eq(LovKey::text("B")));
        assert_eq!(scan.state(), ScanState::Uninitialized);
        assert_eq!(scan.collect_bitmap().unwrap(), vec![7]);
        assert_eq!(index.metrics().scans_opened, 2);
        assert_eq!(index.metrics().tids_returned, 2);
    }

    #[test]
    fn test_storage_error_exhausts_scan() {
        let index = index();
        let mut session = index.build();
        for n in 0..200u64 {
            session.add(&LovKey::text("A"), n * 64 + 1 + (n % 7)).unwrap();
        }
        session.finish().unwrap();

        let (_, entry) = index.entries().unwrap().remove(0);
        let head = entry.item.head_page.unwrap();
        let mut page = index.store().read_bitmap(head).unwrap();
        page.next = None;
        index.store().write(head, &Page::Bitmap(page)).unwrap();

        let mut scan = index.scan(ScanPredicate::Eq(LovKey::text("A")));
        let err = loop {
            match scan.next_tid(ScanDirection::Forward) {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("scan ended without reporting the broken chain"),
                Err(e) => break e,
            }
        };
        assert_eq!(err.code(), "AERO_BITMAP_FORMAT");
        assert_eq!(scan.state(), ScanState::Exhausted);
        assert_eq!(scan.next_tid(ScanDirection::Forward).unwrap(), None);
    }

    #[test]
    fn test_conjunctive_scan_intersects() {
        let index = index();
        for tid in [3u64, 70, 200, 5000] {
            index.insert(&LovKey::text("A"), tid).unwrap();
        }
        for tid in [70u64, 71, 5000, 9000] {
            index.insert(&LovKey::text("B"), tid).unwrap();
        }
        let both = vec![LovKey::text("A"), LovKey::text("B")];
        let mut scan = index.scan(ScanPredicate::All(both));
        assert_eq!(scan.collect_bitmap().unwrap(), vec![70, 5000]);

        scan.rescan(ScanPredicate::All(vec![LovKey::text("A"), LovKey::text("Z")]));
        assert!(scan.collect_bitmap().unwrap().is_empty());
    }

    #[test]
    fn test_skip_to_and_batches() {
        let index = index();
        let mut session = index.build();
        for tid in (10..1000u64).step_by(10) {
            session.add(&LovKey::text("A"), tid).unwrap();
        }
        session.finish().unwrap();

        let mut scan = index.scan(ScanPredicate::Eq(LovKey::text("A")));
        assert_eq!(scan.next_batch(3).unwrap(), vec![10, 20, 30]);
        assert_eq!(scan.skip_to(455).unwrap(), Some(460));
        assert_eq!(scan.skip_to(461).unwrap(), Some(470));
        let rest: Vec<Tid> = scan.map(|r| r.unwrap()).collect();
        assert_eq!(rest.first(), Some(&480));
        assert_eq!(rest.last(), Some(&990));
    }
}
