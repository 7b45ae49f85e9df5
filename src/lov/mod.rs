//! List Of Values (LOV)
//!
//! One LOV entry per distinct key, stored on chained LOV pages and
//! addressed by `(page, offset)`. Each entry's `LovItem` describes where
//! the key's bitmap vector lives and carries its mutable tail words.
//!
//! # Invariants
//!
//! - Exactly one entry per distinct key
//! - Entries are appended or updated in place, never removed
//! - A vector is only mutated while its LOV page is locked

mod item;
mod key;
mod lookup;

pub use item::{LovItem, LovLocation};
pub use key::{AttributeType, IndexKey, IndexSchema, LovKey};
pub use lookup::{lookup_for, HashLookup, KeyLookup, OrderedScanLookup, ScanPredicate};
