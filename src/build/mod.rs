//! Index build
//!
//! - `TidBuffer` turns increasing TIDs into final HRL words plus a
//!   mutable tail
//! - The flush path appends final words to a vector's page chain
//! - `BuildSession` drives both for a sorted stream of `(key, tid)` rows

mod buffer;
mod flush;
mod session;

pub use buffer::TidBuffer;
pub use flush::FlushOutcome;
pub use session::{BuildSession, BuildStats};
