//! WAL readers with strict corruption detection
//!
//! - Any corruption fails the read; nothing is skipped or repaired
//! - Records are returned strictly in sequence order
//! - Reading always starts from the first record

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::record::{WalRecord, RECORD_OVERHEAD};
use crate::errors::{BitmapError, BitmapResult, ErrorContext};

fn corruption_at_offset(offset: u64, reason: impl std::fmt::Display) -> BitmapError {
    BitmapError::format(
        format!("WAL corruption at offset {}: {}", offset, reason),
        ErrorContext::none(),
    )
}

/// Checks that `sequence` directly follows `last` (records start at 1).
fn check_sequence(last: u64, sequence: u64) -> BitmapResult<()> {
    if sequence != last + 1 {
        return Err(BitmapError::format(
            format!(
                "WAL corruption at sequence {}: expected sequence {}",
                sequence,
                last + 1
            ),
            ErrorContext::none(),
        ));
    }
    Ok(())
}

/// Sequential reader over the WAL file.
pub struct WalReader {
    wal_path: PathBuf,
    reader: BufReader<File>,
    current_offset: u64,
    file_size: u64,
    last_sequence: u64,
}

impl WalReader {
    /// Opens a WAL file for reading.
    ///
    /// # Errors
    ///
    /// Returns `AERO_BITMAP_RESOURCE` if the file cannot be opened.
    pub fn open(wal_path: &Path) -> BitmapResult<Self> {
        let file = File::open(wal_path).map_err(|e| {
            BitmapError::io(
                format!("Failed to open WAL file: {}", wal_path.display()),
                ErrorContext::none(),
                e,
            )
        })?;
        let file_size = file
            .metadata()
            .map_err(|e| BitmapError::io("Failed to read WAL metadata", ErrorContext::none(), e))?
            .len();

        Ok(Self {
            wal_path: wal_path.to_path_buf(),
            reader: BufReader::new(file),
            current_offset: 0,
            file_size,
            last_sequence: 0,
        })
    }

    /// Opens `<data_dir>/wal/bitmap.wal`.
    pub fn open_from_data_dir(data_dir: &Path) -> BitmapResult<Self> {
        Self::open(&data_dir.join("wal").join("bitmap.wal"))
    }

    pub fn path(&self) -> &Path {
        &self.wal_path
    }

    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    pub fn last_sequence_number(&self) -> u64 {
        self.last_sequence
    }

    pub fn has_more(&self) -> bool {
        self.current_offset < self.file_size
    }

    /// Reads the next record.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(record))` if a record was successfully read
    /// - `Ok(None)` if end of file reached cleanly
    ///
    /// # Errors
    ///
    /// Returns `AERO_BITMAP_FORMAT` if the checksum fails, the record is
    /// malformed or truncated, or sequence numbers are not consecutive.
    pub fn read_next(&mut self) -> BitmapResult<Option<WalRecord>> {
        if self.current_offset >= self.file_size {
            return Ok(None);
        }

        let remaining = self.file_size - self.current_offset;
        if remaining < RECORD_OVERHEAD as u64 {
            return Err(corruption_at_offset(
                self.current_offset,
                format!("truncated record, {} bytes remaining", remaining),
            ));
        }

        let mut len_buf = [0u8; 4];
        self.reader
            .read_exact(&mut len_buf)
            .map_err(|e| corruption_at_offset(self.current_offset, e))?;
        let record_length = u32::from_le_bytes(len_buf) as u64;
        if record_length < RECORD_OVERHEAD as u64 || record_length > remaining {
            return Err(corruption_at_offset(
                self.current_offset,
                format!(
                    "record length {} invalid with {} bytes remaining",
                    record_length, remaining
                ),
            ));
        }

        let mut record_buf = vec![0u8; record_length as usize];
        record_buf[0..4].copy_from_slice(&len_buf);
        self.reader
            .read_exact(&mut record_buf[4..])
            .map_err(|e| corruption_at_offset(self.current_offset, e))?;

        let (record, consumed) = WalRecord::deserialize(&record_buf)
            .map_err(|e| corruption_at_offset(self.current_offset, e))?;
        check_sequence(self.last_sequence, record.sequence_number)?;

        self.current_offset += consumed as u64;
        self.last_sequence = record.sequence_number;
        Ok(Some(record))
    }

    /// Reads every remaining record.
    pub fn read_all(&mut self) -> BitmapResult<Vec<WalRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.read_next()? {
            records.push(record);
        }
        Ok(records)
    }

    /// Rewinds to the first record.
    pub fn reset(&mut self) -> BitmapResult<()> {
        self.reader
            .seek(SeekFrom::Start(0))
            .map_err(|e| BitmapError::io("Failed to seek to start of WAL", ErrorContext::none(), e))?;
        self.current_offset = 0;
        self.last_sequence = 0;
        Ok(())
    }
}

/// Reader over records held in memory, with the same ordering checks.
#[derive(Debug, Clone)]
pub struct MemoryWalReader {
    records: Vec<WalRecord>,
    position: usize,
    last_sequence: u64,
}

impl MemoryWalReader {
    pub fn new(records: Vec<WalRecord>) -> Self {
        Self {
            records,
            position: 0,
            last_sequence: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn read_next(&mut self) -> BitmapResult<Option<WalRecord>> {
        let Some(record) = self.records.get(self.position) else {
            return Ok(None);
        };
        check_sequence(self.last_sequence, record.sequence_number)?;
        self.position += 1;
        self.last_sequence = record.sequence_number;
        Ok(Some(record.clone()))
    }

    pub fn reset(&mut self) {
        self.position = 0;
        self.last_sequence = 0;
    }
}
