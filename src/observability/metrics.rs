//! Operational counters for a bitmap index
//!
//! - Counters only, monotonic, reset when the index handle is created
//! - Relaxed atomics; values are exact once the counted operations return

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct BitmapMetrics {
    tids_inserted: AtomicU64,
    words_written: AtomicU64,
    pages_allocated: AtomicU64,
    wal_records: AtomicU64,
    lov_entries_created: AtomicU64,
    flushes: AtomicU64,
    scans_opened: AtomicU64,
    tids_returned: AtomicU64,
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub tids_inserted: u64,
    pub words_written: u64,
    pub pages_allocated: u64,
    pub wal_records: u64,
    pub lov_entries_created: u64,
    pub flushes: u64,
    pub scans_opened: u64,
    pub tids_returned: u64,
}

impl BitmapMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tids_inserted(&self, n: u64) {
        self.tids_inserted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_words_written(&self, n: u64) {
        self.words_written.fetch_add(n, Ordering::Relaxed);
    }

    pub fn increment_pages_allocated(&self) {
        self.pages_allocated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_wal_records(&self) {
        self.wal_records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_lov_entries(&self) {
        self.lov_entries_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_flushes(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_scans(&self) {
        self.scans_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_tids_returned(&self, n: u64) {
        self.tids_returned.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tids_inserted: self.tids_inserted.load(Ordering::Relaxed),
            words_written: self.words_written.load(Ordering::Relaxed),
            pages_allocated: self.pages_allocated.load(Ordering::Relaxed),
            wal_records: self.wal_records.load(Ordering::Relaxed),
            lov_entries_created: self.lov_entries_created.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            scans_opened: self.scans_opened.load(Ordering::Relaxed),
            tids_returned: self.tids_returned.load(Ordering::Relaxed),
        }
    }
}
