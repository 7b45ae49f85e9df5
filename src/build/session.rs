//! Bulk build session
//!
//! Accepts `(key, tid)` pairs in strictly increasing TID order and keeps
//! one `TidBuffer` per distinct key. A buffer is flushed once it holds a
//! page worth of final words; every buffer is flushed, and the buffers
//! dropped, when their combined footprint exceeds `build_buffer_bytes`.
//!
//! A session that is dropped without `finish` keeps everything flushed so
//! far; unflushed TIDs are lost and the index stays consistent.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::buffer::TidBuffer;
use super::flush::FlushOutcome;
use crate::errors::{BitmapError, BitmapResult, ErrorContext};
use crate::index::BitmapIndex;
use crate::lov::{LovKey, LovLocation};
use crate::observability::ObservationScope;
use crate::page::PageStore;
use crate::tid::{check_tid, Tid};
use crate::wal::WalSink;

/// Totals reported when a build finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub tuples: u64,
    pub distinct_keys: u64,
    pub words_written: u64,
    pub pages_written: u64,
    pub flushes: u64,
}

impl BuildStats {
    fn record(&mut self, outcome: FlushOutcome) {
        self.words_written += outcome.words_written;
        self.pages_written += outcome.pages_written;
        if outcome.words_written > 0 {
            self.flushes += 1;
        }
    }
}

struct VectorBuffer {
    key: String,
    buffer: TidBuffer,
}

pub struct BuildSession<'a, S: PageStore, W: WalSink> {
    index: &'a BitmapIndex<S, W>,
    buffers: HashMap<LovLocation, VectorBuffer>,
    /// Keys seen by this session
    keys: HashSet<LovLocation>,
    footprint: usize,
    last_tid: Tid,
    stats: BuildStats,
    scope: Option<ObservationScope<'static>>,
    aborted: bool,
}

impl<'a, S: PageStore, W: WalSink> BuildSession<'a, S, W> {
    pub(crate) fn new(index: &'a BitmapIndex<S, W>) -> Self {
        let scope = ObservationScope::with_fields(
            "BITMAP_BUILD",
            &[("use_wal", if index.options().use_wal { "true" } else { "false" })],
        );
        Self {
            index,
            buffers: HashMap::new(),
            keys: HashSet::new(),
            footprint: 0,
            last_tid: 0,
            stats: BuildStats::default(),
            scope: Some(scope),
            aborted: false,
        }
    }

    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    /// Highest TID accepted so far
    pub fn last_tid(&self) -> Tid {
        self.last_tid
    }

    /// Adds one row. After a sequence or format error the session is dead.
    pub fn add(&mut self, key: &LovKey, tid: Tid) -> BitmapResult<()> {
        if self.aborted {
            return Err(BitmapError::invalid_argument(
                "build session aborted by an earlier error",
                ErrorContext::tid(tid),
            ));
        }
        match self.add_inner(key, tid) {
            Ok(()) => Ok(()),
            Err(e) => {
                if e.is_fatal() {
                    self.abort(&e);
                }
                Err(e)
            }
        }
    }

    fn add_inner(&mut self, key: &LovKey, tid: Tid) -> BitmapResult<()> {
        check_tid(tid)?;
        if tid <= self.last_tid {
            return Err(BitmapError::sequence(
                format!("build tid {} not above previous tid {}", tid, self.last_tid),
                ErrorContext::tid(tid).with_key(key.to_string()),
            ));
        }

        let location = self.index.lookup_or_create(key)?;
        if !self.buffers.contains_key(&location) {
            let item = self.index.read_item(location)?;
            let buffer = VectorBuffer {
                key: key.to_string(),
                buffer: TidBuffer::resume(&item),
            };
            self.footprint += buffer.buffer.footprint();
            self.buffers.insert(location, buffer);
            self.keys.insert(location);
        }

        let entry = self.buffers.get_mut(&location).ok_or_else(|| {
            BitmapError::resource("build buffer vanished", ErrorContext::tid(tid))
        })?;
        let before = entry.buffer.footprint();
        entry
            .buffer
            .append(tid, true)
            .map_err(|e| e.for_key(&entry.key))?;
        self.footprint = self.footprint - before + entry.buffer.footprint();
        let page_full = entry.buffer.pending_words() >= self.index.words_per_page();

        self.last_tid = tid;
        self.stats.tuples += 1;
        self.index.metrics.add_tids_inserted(1);

        if page_full {
            self.flush_one(location)?;
        }
        if self.footprint > self.index.options().build_buffer_bytes {
            self.flush_all()?;
        }
        Ok(())
    }

    fn flush_one(&mut self, location: LovLocation) -> BitmapResult<()> {
        let Some(entry) = self.buffers.get_mut(&location) else {
            return Ok(());
        };
        let before = entry.buffer.footprint();
        let words = entry.buffer.take_words();
        let tail = entry.buffer.tail();
        let index = self.index;
        let outcome = index
            .locks
            .with_exclusive(location.page, || {
                let mut item = index.read_item(location)?;
                index.flush_vector(location, &mut item, words, tail)
            })
            .map_err(|e| e.for_key(&entry.key))?;
        self.footprint = self.footprint - before + entry.buffer.footprint();
        self.stats.record(outcome);
        Ok(())
    }

    /// Flushes every buffer and releases them; vectors resume from their
    /// LOV items when their key shows up again.
    pub fn flush_all(&mut self) -> BitmapResult<()> {
        let mut locations: Vec<LovLocation> = self.buffers.keys().copied().collect();
        locations.sort();
        for location in locations {
            self.flush_one(location)?;
        }
        self.buffers.clear();
        self.footprint = 0;
        Ok(())
    }

    /// Flushes everything and closes the session.
    ///
    /// An unlogged build is made durable here: pages are synced and the
    /// WAL emptied, since it no longer describes the store.
    pub fn finish(mut self) -> BitmapResult<BuildStats> {
        if self.aborted {
            return Err(BitmapError::invalid_argument(
                "build session aborted by an earlier error",
                ErrorContext::none(),
            ));
        }
        let result = self.finish_inner();
        match &result {
            Ok(stats) => {
                if let Some(scope) = self.scope.take() {
                    scope.complete_with_fields(&[
                        ("tuples", &stats.tuples.to_string()),
                        ("distinct_keys", &stats.distinct_keys.to_string()),
                        ("words_written", &stats.words_written.to_string()),
                    ]);
                }
            }
            Err(e) => self.abort(e),
        }
        result
    }

    fn finish_inner(&mut self) -> BitmapResult<BuildStats> {
        self.flush_all()?;
        self.index.note_max_tid(self.last_tid)?;
        if self.index.options().use_wal {
            self.index.store.sync()?;
        } else {
            self.index.checkpoint()?;
        }
        self.stats.distinct_keys = self.keys.len() as u64;
        Ok(self.stats)
    }

    fn abort(&mut self, error: &BitmapError) {
        self.aborted = true;
        self.buffers.clear();
        if let Some(scope) = self.scope.take() {
            scope.fail(error);
        }
    }
}

impl<S: PageStore, W: WalSink> BitmapIndex<S, W> {
    /// Opens a bulk build session.
    pub fn build(&self) -> BuildSession<'_, S, W> {
        BuildSession::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexOptions;
    use crate::lov::{AttributeType, IndexSchema};
    use crate::page::MemoryPageStore;
    use crate::wal::MemoryWal;

    fn index(options: IndexOptions) -> BitmapIndex<MemoryPageStore, MemoryWal> {
        let schema = IndexSchema::new(vec![AttributeType::Text]).unwrap();
        BitmapIndex::create(MemoryPageStore::new(256), MemoryWal::new(), schema, options).unwrap()
    }

    #[test]
    fn test_build_reports_stats() {
        let index = index(IndexOptions::default());
        let mut session = index.build();
        for tid in 1..=300u64 {
            let key = if tid % 3 == 0 { "fizz" } else { "other" };
            session.add(&LovKey::text(key), tid).unwrap();
        }
        let stats = session.finish().unwrap();
        assert_eq!(stats.tuples, 300);
        assert_eq!(stats.distinct_keys, 2);
        assert_eq!(index.meta().unwrap().max_tid, 300);
        assert_eq!(index.metrics().tids_inserted, 300);
    }

    #[test]
    fn test_out_of_order_tid_aborts_session() {
        let index = index(IndexOptions::default());
        let mut session = index.build();
        session.add(&LovKey::text("A"), 10).unwrap();
        let err = session.add(&LovKey::text("B"), 10).unwrap_err();
        assert_eq!(err.code(), "AERO_BITMAP_SEQUENCE");
        let err = session.add(&LovKey::text("B"), 11).unwrap_err();
        assert_eq!(err.code(), "AERO_BITMAP_INVALID_ARGUMENT");
        assert!(session.finish().is_err());
    }

    #[test]
    fn test_full_page_of_words_flushes_early() {
        let index = index(IndexOptions::default());
        let per_page = index.words_per_page() as u64;
        let mut session = index.build();
        // one literal per word, so every word is final once the next starts
        for word in 0..per_page + 2 {
            session.add(&LovKey::text("A"), word * 64 + 1 + (word % 2)).unwrap();
        }
        assert!(session.stats().flushes >= 1);
        assert!(session.stats().words_written >= per_page);
        session.finish().unwrap();
    }

    #[test]
    fn test_small_budget_flushes_and_resumes() {
        let options = IndexOptions {
            build_buffer_bytes: 1,
            ..IndexOptions::default()
        };
        let index = index(options);
        let mut session = index.build();
        for tid in (1..2000u64).step_by(7) {
            session.add(&LovKey::text("A"), tid).unwrap();
        }
        let stats = session.finish().unwrap();
        assert!(stats.flushes > 1);
        let location = index.find_entry(&LovKey::text("A")).unwrap().unwrap();
        let item = index.read_item(location).unwrap();
        assert_eq!(item.start_tid, 1);
        assert_eq!(item.last_setbit, 1996);
    }

    #[test]
    fn test_unlogged_build_empties_wal() {
        let options = IndexOptions {
            use_wal: false,
            ..IndexOptions::default()
        };
        let index = index(options);
        let mut session = index.build();
        session.add(&LovKey::text("A"), 5).unwrap();
        session.finish().unwrap();
        assert_eq!(index.metrics().wal_records, 0);
    }
}
