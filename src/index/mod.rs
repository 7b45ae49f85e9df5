//! Bitmap index handle
//!
//! `BitmapIndex` owns the page store, the WAL sink and the in-memory key
//! lookup. Build sessions (`crate::build`) and scans (`crate::scan`) hang
//! off it; incremental inserts and LOV entry management live here.
//!
//! # Invariants
//!
//! - One LOV entry per distinct key
//! - Every change is logged before its pages are written
//! - Lock order: metapage, then LOV pages

mod handle;
mod insert;
mod lov_store;

pub use handle::{BitmapIndex, IndexOptions};
