//! Recovery startup sequence
//!
//! # Order
//!
//! 1. Note and remove the clean shutdown marker
//! 2. Replay the WAL from its first record onto the page store
//! 3. Sync the store
//! 4. Verify every page reachable from the metapage
//!
//! The caller empties the WAL afterwards; replayed records are then
//! reflected in synced pages.

use std::fs;
use std::path::{Path, PathBuf};

use super::adapters::PageApplier;
use super::replay::{ReplayStats, WalRead, WalReplayer};
use super::verifier::{ConsistencyVerifier, VerificationStats};
use crate::errors::{BitmapError, BitmapResult, ErrorContext};
use crate::observability::ObservationScope;
use crate::page::PageStore;

/// Clean shutdown marker filename
const CLEAN_SHUTDOWN_MARKER: &str = "clean_shutdown";

/// Outcome of a successful recovery
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryState {
    pub replay_stats: ReplayStats,
    /// None when the store has no metapage yet
    pub verification_stats: Option<VerificationStats>,
    pub was_clean_shutdown: bool,
}

pub struct RecoveryManager {
    data_dir: PathBuf,
}

impl RecoveryManager {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    fn marker_path(&self) -> PathBuf {
        self.data_dir.join(CLEAN_SHUTDOWN_MARKER)
    }

    pub fn was_clean_shutdown(&self) -> bool {
        self.marker_path().exists()
    }

    fn remove_shutdown_marker(&self) -> BitmapResult<()> {
        let path = self.marker_path();
        if path.exists() {
            fs::remove_file(&path).map_err(|e| {
                BitmapError::io("Failed to remove shutdown marker", ErrorContext::none(), e)
            })?;
        }
        Ok(())
    }

    /// Written when an index handle closes after syncing its pages.
    pub fn mark_clean_shutdown(&self) -> BitmapResult<()> {
        fs::create_dir_all(&self.data_dir).map_err(|e| {
            BitmapError::io("Failed to create data directory", ErrorContext::none(), e)
        })?;
        fs::write(self.marker_path(), b"").map_err(|e| {
            BitmapError::io("Failed to write shutdown marker", ErrorContext::none(), e)
        })
    }

    /// Runs the full sequence. Any failure is fatal to the open.
    pub fn recover<W, S>(&self, wal: &mut W, store: &S) -> BitmapResult<RecoveryState>
    where
        W: WalRead,
        S: PageStore + ?Sized,
    {
        let data_dir = self.data_dir.display().to_string();
        let scope = ObservationScope::with_fields("BITMAP_RECOVERY", &[("data_dir", &data_dir)]);
        match self.run(wal, store) {
            Ok(state) => {
                scope.complete_with_fields(&[
                    ("records_replayed", &state.replay_stats.records_replayed.to_string()),
                    ("clean_shutdown", &state.was_clean_shutdown.to_string()),
                ]);
                Ok(state)
            }
            Err(e) => {
                scope.fail(&e);
                Err(e)
            }
        }
    }

    fn run<W, S>(&self, wal: &mut W, store: &S) -> BitmapResult<RecoveryState>
    where
        W: WalRead,
        S: PageStore + ?Sized,
    {
        let was_clean_shutdown = self.was_clean_shutdown();
        self.remove_shutdown_marker()?;

        let mut applier = PageApplier::new(store);
        let replay_stats = WalReplayer::replay(wal, &mut applier)?;
        store.sync()?;

        let verification_stats = if store.page_count() > 0 {
            Some(ConsistencyVerifier::verify(store)?)
        } else {
            None
        };

        Ok(RecoveryState {
            replay_stats,
            verification_stats,
            was_clean_shutdown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lov::{IndexSchema, AttributeType};
    use crate::page::{MemoryPageStore, MetaPage, Page, METAPAGE_ID};
    use crate::wal::{MemoryWalReader, WalPayload, WalRecord};
    use tempfile::TempDir;

    fn meta_record(seq: u64) -> WalRecord {
        let schema = IndexSchema::new(vec![AttributeType::Text]).unwrap();
        WalRecord::new(seq, WalPayload::MetapageUpdate(MetaPage::new(schema)))
    }

    #[test]
    fn test_replay_creates_metapage() {
        let dir = TempDir::new().unwrap();
        let manager = RecoveryManager::new(dir.path());
        let store = MemoryPageStore::new(512);
        let mut wal = MemoryWalReader::new(vec![meta_record(1)]);

        let state = manager.recover(&mut wal, &store).unwrap();
        assert_eq!(state.replay_stats.records_replayed, 1);
        assert_eq!(state.verification_stats, Some(VerificationStats::default()));
        assert!(matches!(store.read(METAPAGE_ID).unwrap(), Page::Meta(_)));
    }

    #[test]
    fn test_empty_wal_on_empty_store() {
        let dir = TempDir::new().unwrap();
        let manager = RecoveryManager::new(dir.path());
        let store = MemoryPageStore::new(512);
        let mut wal = MemoryWalReader::new(Vec::new());

        let state = manager.recover(&mut wal, &store).unwrap();
        assert_eq!(state.replay_stats.records_replayed, 0);
        assert_eq!(state.verification_stats, None);
    }

    #[test]
    fn test_clean_shutdown_marker_consumed() {
        let dir = TempDir::new().unwrap();
        let manager = RecoveryManager::new(dir.path());
        assert!(!manager.was_clean_shutdown());
        manager.mark_clean_shutdown().unwrap();
        assert!(manager.was_clean_shutdown());

        let store = MemoryPageStore::new(512);
        let mut wal = MemoryWalReader::new(Vec::new());
        let state = manager.recover(&mut wal, &store).unwrap();
        assert!(state.was_clean_shutdown);
        assert!(!manager.was_clean_shutdown());
    }

    #[test]
    fn test_replay_twice_gives_same_pages() {
        let dir = TempDir::new().unwrap();
        let manager = RecoveryManager::new(dir.path());
        let store = MemoryPageStore::new(512);
        let records = vec![meta_record(1)];

        manager
            .recover(&mut MemoryWalReader::new(records.clone()), &store)
            .unwrap();
        let first = store.read_raw(METAPAGE_ID).unwrap();
        manager
            .recover(&mut MemoryWalReader::new(records), &store)
            .unwrap();
        assert_eq!(store.read_raw(METAPAGE_ID).unwrap(), first);
        assert_eq!(store.page_count(), 1);
    }

    #[test]
    fn test_sequence_gap_fails() {
        let dir = TempDir::new().unwrap();
        let manager = RecoveryManager::new(dir.path());
        let store = MemoryPageStore::new(512);
        let mut wal = MemoryWalReader::new(vec![meta_record(2)]);
        let err = manager.recover(&mut wal, &store).unwrap_err();
        assert_eq!(err.code(), "AERO_BITMAP_FORMAT");
    }
}
