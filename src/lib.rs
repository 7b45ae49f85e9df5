//! aerobitmap - an on-disk bitmap index
//!
//! One compressed bit vector per distinct key, stored as Hybrid
//! Run-Length words on chained pages. A List-Of-Values maps each key to
//! its vector; every change is write-ahead logged as page after-images.

pub mod build;
pub mod cli;
pub mod config;
pub mod errors;
pub mod hrl;
pub mod index;
pub mod lov;
pub mod observability;
pub mod page;
pub mod recovery;
pub mod scan;
pub mod tid;
pub mod wal;

pub use build::{BuildSession, BuildStats};
pub use config::IndexConfig;
pub use errors::{BitmapError, BitmapResult};
pub use index::{BitmapIndex, IndexOptions};
pub use lov::{AttributeType, IndexKey, IndexSchema, LovKey, ScanPredicate};
pub use scan::{IndexScan, ScanDirection, ScanMark, ScanState};
pub use tid::{ItemPointer, Tid};
