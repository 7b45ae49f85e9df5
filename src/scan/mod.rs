//! Index scans
//!
//! - `VectorReader` loads a vector's words a window at a time, following
//!   its page chain and ending with the LOV item's tail words
//! - `VectorUnion` ORs the readers' word streams into one packed stream,
//!   `VectorIntersect` ANDs them for conjunctive predicates
//! - `TidCursor` turns the merged words back into ascending TIDs
//! - `IndexScan` ties them to a predicate, with mark/restore
//!
//! # Invariants
//!
//! - TIDs come out strictly ascending, without duplicates
//! - A broken page chain is a format error, never a short result

mod batch;
mod intersect;
mod iterate;
mod position;
mod reader;
mod session;
mod union;

pub use batch::BatchWords;
pub use intersect::VectorIntersect;
pub use iterate::TidCursor;
pub use position::ScanPosition;
pub use reader::VectorReader;
pub use session::{IndexScan, ScanDirection, ScanMark, ScanState};
pub use union::VectorUnion;
