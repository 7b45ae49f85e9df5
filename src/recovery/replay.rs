//! WAL replay for recovery
//!
//! Replays WAL records sequentially from the first record.
//!
//! - Must read sequentially
//! - Must validate checksum for every record
//! - On ANY corruption: FATAL error, abort immediately

use crate::errors::BitmapResult;
use crate::wal::{RecordType, WalRecord};

/// Trait for applying WAL records to pages
pub trait RecordApply {
    fn apply_wal_record(&mut self, record: &WalRecord) -> BitmapResult<()>;
}

/// Trait for reading WAL records
pub trait WalRead {
    /// Returns None at end of WAL, Err on corruption.
    fn read_next(&mut self) -> BitmapResult<Option<WalRecord>>;

    /// Reset to beginning of WAL
    fn reset(&mut self) -> BitmapResult<()>;
}

/// Statistics from WAL replay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub records_replayed: u64,
    pub metapage_updates: u64,
    pub lov_item_updates: u64,
    pub bitmap_words: u64,
    pub update_word: u64,
    pub last_words: u64,
    pub update_words: u64,
    /// Sequence number of the last record applied
    pub final_sequence: u64,
}

impl ReplayStats {
    fn count(&mut self, record_type: RecordType) {
        self.records_replayed += 1;
        match record_type {
            RecordType::MetapageUpdate => self.metapage_updates += 1,
            RecordType::LovItemUpdate => self.lov_item_updates += 1,
            RecordType::BitmapWords => self.bitmap_words += 1,
            RecordType::UpdateWord => self.update_word += 1,
            RecordType::LastWords => self.last_words += 1,
            RecordType::UpdateWords => self.update_words += 1,
        }
    }
}

/// WAL replayer that processes WAL records sequentially
pub struct WalReplayer;

impl WalReplayer {
    /// Replay all WAL records.
    ///
    /// Replay is idempotent: same WAL replayed twice produces identical state.
    pub fn replay<W: WalRead, A: RecordApply>(
        wal: &mut W,
        target: &mut A,
    ) -> BitmapResult<ReplayStats> {
        wal.reset()?;

        let mut stats = ReplayStats::default();
        while let Some(record) = wal.read_next()? {
            target.apply_wal_record(&record)?;
            stats.count(record.record_type());
            stats.final_sequence = record.sequence_number;
        }
        Ok(stats)
    }
}
