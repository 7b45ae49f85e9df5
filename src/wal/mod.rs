//! Write-Ahead Log (WAL) for the bitmap index
//!
//! Every change to index pages is described by one WAL record, written
//! and fsynced before the pages themselves.
//!
//! # Invariants
//!
//! - A record precedes the page writes it describes
//! - Records carry after-images, so replay is idempotent
//! - Checksums on every record; corruption halts replay

mod reader;
mod record;
mod writer;

pub use reader::{MemoryWalReader, WalReader};
pub use record::{
    BitmapWordsUpdate, LastWordsUpdate, LovItemUpdate, RecordType, TailState, UpdateWordPatch,
    UpdateWordsSplit, WalPayload, WalRecord, RECORD_OVERHEAD,
};
pub use writer::{MemoryWal, WalSink, WalWriter};
