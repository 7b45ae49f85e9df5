//! Index configuration
//!
//! Loaded from a JSON file; every field except `data_dir` has a default.
//!
//! ```json
//! {
//!   "data_dir": "/var/lib/orders_status_idx",
//!   "key_types": ["text"],
//!   "page_size": 8192
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{BitmapError, BitmapResult};
use crate::lov::{AttributeType, IndexSchema};
use crate::page::MIN_PAGE_SIZE;

/// Smallest useful scan batch: one word plus the word being refilled
pub const MIN_BATCH_WORDS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory holding `index/` and `wal/`
    pub data_dir: String,

    /// Page size in bytes, fixed when the index is created
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Build buffer footprint that forces every vector to flush
    #[serde(default = "default_build_buffer_bytes")]
    pub build_buffer_bytes: usize,

    /// Compressed words read per vector refill
    #[serde(default = "default_batch_words")]
    pub batch_words: usize,

    /// TIDs returned per pull by the scan iterator
    #[serde(default = "default_batch_tids")]
    pub batch_tids: usize,

    /// Log changes to the WAL before writing pages
    #[serde(default = "default_use_wal")]
    pub use_wal: bool,

    /// Attribute types of the indexed key, used when the index is created
    #[serde(default = "default_key_types")]
    pub key_types: Vec<AttributeType>,
}

fn default_page_size() -> usize {
    8192
}
fn default_build_buffer_bytes() -> usize {
    16 * 1024 * 1024
}
fn default_batch_words() -> usize {
    1024
}
fn default_batch_tids() -> usize {
    16
}
fn default_use_wal() -> bool {
    true
}
fn default_key_types() -> Vec<AttributeType> {
    vec![AttributeType::Text]
}

impl IndexConfig {
    /// Defaults for an index under `data_dir`.
    pub fn new(data_dir: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            page_size: default_page_size(),
            build_buffer_bytes: default_build_buffer_bytes(),
            batch_words: default_batch_words(),
            batch_tids: default_batch_tids(),
            use_wal: default_use_wal(),
            key_types: default_key_types(),
        }
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> BitmapResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| BitmapError::config(format!("Failed to read config: {}", e)))?;

        let config: IndexConfig = serde_json::from_str(&content)
            .map_err(|e| BitmapError::config(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BitmapResult<()> {
        if self.data_dir.is_empty() {
            return Err(BitmapError::config("data_dir must not be empty"));
        }
        if self.page_size < MIN_PAGE_SIZE {
            return Err(BitmapError::config(format!(
                "page_size {} below minimum {}",
                self.page_size, MIN_PAGE_SIZE
            )));
        }
        if self.page_size > u32::MAX as usize {
            return Err(BitmapError::config(format!(
                "page_size {} too large",
                self.page_size
            )));
        }
        if self.batch_words < MIN_BATCH_WORDS {
            return Err(BitmapError::config(format!(
                "batch_words {} below minimum {}",
                self.batch_words, MIN_BATCH_WORDS
            )));
        }
        if self.batch_tids == 0 {
            return Err(BitmapError::config("batch_tids must be > 0"));
        }
        if self.build_buffer_bytes == 0 {
            return Err(BitmapError::config("build_buffer_bytes must be > 0"));
        }
        self.schema()?;
        Ok(())
    }

    pub fn schema(&self) -> BitmapResult<IndexSchema> {
        IndexSchema::new(self.key_types.clone())
            .map_err(|e| BitmapError::config(format!("Invalid key_types: {}", e)))
    }

    pub fn data_path(&self) -> &Path {
        Path::new(&self.data_dir)
    }
}
