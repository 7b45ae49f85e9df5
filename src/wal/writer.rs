//! WAL writers
//!
//! - Every file append is followed by fsync
//! - A record is durable before the pages it describes are written
//! - Sequence numbers start at 1 and never repeat

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::reader::WalReader;
use super::record::{WalPayload, WalRecord};
use crate::errors::{BitmapError, BitmapResult, ErrorContext};

/// Destination for WAL records.
pub trait WalSink: Send {
    /// Durably appends a record and returns its sequence number.
    fn append(&mut self, payload: WalPayload) -> BitmapResult<u64>;

    /// Last assigned sequence number, or 0 if nothing was written.
    fn last_sequence_number(&self) -> u64;

    /// Discards every record once the pages they describe are synced.
    fn checkpoint(&mut self) -> BitmapResult<()>;
}

/// Append-only WAL file at `<data_dir>/wal/bitmap.wal`.
pub struct WalWriter {
    wal_path: PathBuf,
    file: File,
    next_sequence: u64,
}

impl WalWriter {
    /// Opens or creates the WAL under `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns `AERO_BITMAP_RESOURCE` if the file cannot be created or
    /// opened, and `AERO_BITMAP_FORMAT` if the existing log is corrupt.
    pub fn open(data_dir: &Path) -> BitmapResult<Self> {
        let wal_dir = data_dir.join("wal");
        let wal_path = wal_dir.join("bitmap.wal");

        if !wal_dir.exists() {
            fs::create_dir_all(&wal_dir).map_err(|e| {
                BitmapError::io(
                    format!("Failed to create WAL directory: {}", wal_dir.display()),
                    ErrorContext::none(),
                    e,
                )
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&wal_path)
            .map_err(|e| {
                BitmapError::io(
                    format!("Failed to open WAL file: {}", wal_path.display()),
                    ErrorContext::none(),
                    e,
                )
            })?;

        let next_sequence = Self::determine_next_sequence(&wal_path)?;

        Ok(Self {
            wal_path,
            file,
            next_sequence,
        })
    }

    /// Returns 1 if the WAL is empty or does not exist.
    fn determine_next_sequence(wal_path: &Path) -> BitmapResult<u64> {
        let metadata = match fs::metadata(wal_path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(1),
            Err(e) => {
                return Err(BitmapError::io(
                    "Failed to read WAL metadata",
                    ErrorContext::none(),
                    e,
                ))
            }
        };
        if metadata.len() == 0 {
            return Ok(1);
        }

        let mut reader = WalReader::open(wal_path)?;
        while reader.read_next()?.is_some() {}
        Ok(reader.last_sequence_number() + 1)
    }

    pub fn path(&self) -> &Path {
        &self.wal_path
    }

    pub fn next_sequence_number(&self) -> u64 {
        self.next_sequence
    }

    /// Empties the log once its records are reflected in synced pages.
    pub fn truncate(&mut self) -> BitmapResult<()> {
        self.file.set_len(0).map_err(|e| {
            BitmapError::io("Failed to truncate WAL", ErrorContext::none(), e)
        })?;
        self.file.sync_all().map_err(|e| {
            BitmapError::io("fsync failed after WAL truncation", ErrorContext::none(), e)
        })?;
        self.next_sequence = 1;
        Ok(())
    }
}

impl WalSink for WalWriter {
    fn append(&mut self, payload: WalPayload) -> BitmapResult<u64> {
        let sequence_number = self.next_sequence;
        let record = WalRecord::new(sequence_number, payload);
        let serialized = record.serialize().map_err(|e| {
            BitmapError::invalid_argument(
                format!("Cannot encode WAL record {}: {}", sequence_number, e),
                ErrorContext::none(),
            )
        })?;

        self.file.write_all(&serialized).map_err(|e| {
            BitmapError::io(
                format!("Failed to write WAL record at sequence {}", sequence_number),
                ErrorContext::none(),
                e,
            )
        })?;

        self.file.sync_all().map_err(|e| {
            BitmapError::io(
                format!("fsync failed after WAL append at sequence {}", sequence_number),
                ErrorContext::none(),
                e,
            )
        })?;

        // Only increment after successful fsync
        self.next_sequence += 1;
        Ok(sequence_number)
    }

    fn last_sequence_number(&self) -> u64 {
        self.next_sequence - 1
    }

    fn checkpoint(&mut self) -> BitmapResult<()> {
        self.truncate()
    }
}

/// In-memory WAL, used by tests and unlogged indexes.
#[derive(Debug, Clone, Default)]
pub struct MemoryWal {
    records: Vec<WalRecord>,
}

impl MemoryWal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[WalRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<WalRecord> {
        self.records
    }
}

impl WalSink for MemoryWal {
    fn append(&mut self, payload: WalPayload) -> BitmapResult<u64> {
        let sequence_number = self.records.len() as u64 + 1;
        self.records.push(WalRecord::new(sequence_number, payload));
        Ok(sequence_number)
    }

    fn last_sequence_number(&self) -> u64 {
        self.records.len() as u64
    }

    fn checkpoint(&mut self) -> BitmapResult<()> {
        self.records.clear();
        Ok(())
    }
}
