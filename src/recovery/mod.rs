//! Crash recovery for the bitmap index
//!
//! Every change is logged as an after-image before its pages are written,
//! so replaying the WAL from the first record onto whatever the store
//! holds yields the state of the last logged change.
//!
//! # Invariants
//!
//! - The WAL is read sequentially from its first record
//! - Replaying the same records twice gives identical pages
//! - Corruption halts recovery; nothing is skipped or repaired

mod adapters;
mod replay;
mod startup;
mod verifier;

pub use adapters::PageApplier;
pub use replay::{RecordApply, ReplayStats, WalRead, WalReplayer};
pub use startup::{RecoveryManager, RecoveryState};
pub use verifier::{ConsistencyVerifier, VerificationStats};

use crate::errors::BitmapResult;
use crate::page::PageStore;

/// Replays every record from `wal` onto `store`.
pub fn replay<W, S>(wal: &mut W, store: &S) -> BitmapResult<ReplayStats>
where
    W: WalRead,
    S: PageStore + ?Sized,
{
    let mut applier = PageApplier::new(store);
    WalReplayer::replay(wal, &mut applier)
}
