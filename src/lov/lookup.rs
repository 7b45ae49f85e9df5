//! Key → LOV location lookup
//!
//! Two interchangeable strategies behind one trait. `HashLookup` is used
//! when every indexed attribute hashes by its raw bytes; otherwise
//! `OrderedScanLookup` keeps keys in order and answers point lookups by
//! ordered search. Both are rebuilt from the LOV page chain when an index
//! is opened.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Bound;

use super::item::LovLocation;
use super::key::{IndexSchema, LovKey};
use crate::errors::{BitmapError, BitmapResult, ErrorContext};

/// Which keys a scan selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanPredicate {
    Eq(LovKey),
    In(Vec<LovKey>),
    /// Keys with no NULL attribute inside the bounds
    Range {
        lower: Bound<LovKey>,
        upper: Bound<LovKey>,
    },
    /// Keys whose attributes are all NULL
    IsNull,
    /// TIDs present under every listed key; a missing key matches nothing
    All(Vec<LovKey>),
}

impl ScanPredicate {
    /// Whether the matched vectors are intersected rather than merged.
    pub fn is_conjunctive(&self) -> bool {
        matches!(self, ScanPredicate::All(_))
    }

    pub fn matches(&self, key: &LovKey) -> bool {
        match self {
            ScanPredicate::Eq(k) => k == key,
            ScanPredicate::In(keys) => keys.contains(key),
            ScanPredicate::Range { lower, upper } => {
                !key.values().iter().any(|v| v.is_none())
                    && above(lower, key)
                    && below(upper, key)
            }
            ScanPredicate::IsNull => key.is_all_null(),
            ScanPredicate::All(keys) => keys.contains(key),
        }
    }

    /// Rejects predicates whose keys do not fit the index schema.
    pub fn check(&self, schema: &IndexSchema) -> BitmapResult<()> {
        let check_bound = |b: &Bound<LovKey>| match b {
            Bound::Included(k) | Bound::Excluded(k) => schema.check_key(k),
            Bound::Unbounded => Ok(()),
        };
        match self {
            ScanPredicate::Eq(k) => schema.check_key(k),
            ScanPredicate::In(keys) => keys.iter().try_for_each(|k| schema.check_key(k)),
            ScanPredicate::Range { lower, upper } => {
                check_bound(lower)?;
                check_bound(upper)
            }
            ScanPredicate::IsNull => Ok(()),
            ScanPredicate::All(keys) => keys.iter().try_for_each(|k| schema.check_key(k)),
        }
    }
}

impl fmt::Display for ScanPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanPredicate::Eq(k) => write!(f, "= {}", k),
            ScanPredicate::In(keys) => {
                let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
                write!(f, "IN [{}]", keys.join(", "))
            }
            ScanPredicate::Range { lower, upper } => {
                match lower {
                    Bound::Included(k) => write!(f, "[{}", k)?,
                    Bound::Excluded(k) => write!(f, "({}", k)?,
                    Bound::Unbounded => write!(f, "(-inf")?,
                }
                match upper {
                    Bound::Included(k) => write!(f, ", {}]", k),
                    Bound::Excluded(k) => write!(f, ", {})", k),
                    Bound::Unbounded => write!(f, ", +inf)"),
                }
            }
            ScanPredicate::IsNull => write!(f, "IS NULL"),
            ScanPredicate::All(keys) => {
                let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
                write!(f, "ALL [{}]", keys.join(", "))
            }
        }
    }
}

fn above(lower: &Bound<LovKey>, key: &LovKey) -> bool {
    match lower {
        Bound::Included(k) => key >= k,
        Bound::Excluded(k) => key > k,
        Bound::Unbounded => true,
    }
}

fn below(upper: &Bound<LovKey>, key: &LovKey) -> bool {
    match upper {
        Bound::Included(k) => key <= k,
        Bound::Excluded(k) => key < k,
        Bound::Unbounded => true,
    }
}

/// Whether a range selects nothing (BTreeMap::range panics on these).
fn range_is_empty(lower: &Bound<LovKey>, upper: &Bound<LovKey>) -> bool {
    match (lower, upper) {
        (Bound::Included(l), Bound::Included(u)) => l > u,
        (Bound::Included(l), Bound::Excluded(u))
        | (Bound::Excluded(l), Bound::Included(u))
        | (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
        _ => false,
    }
}

/// Locations of all `keys`, or none when one of them is missing.
fn every<F>(keys: &[LovKey], find: F) -> Vec<LovLocation>
where
    F: Fn(&LovKey) -> Option<LovLocation>,
{
    keys.iter()
        .map(find)
        .collect::<Option<Vec<_>>>()
        .unwrap_or_default()
}

fn sorted(mut locations: Vec<LovLocation>) -> Vec<LovLocation> {
    locations.sort();
    locations.dedup();
    locations
}

/// Maps distinct keys to the location of their LOV entry.
///
/// A miss is not an error: it tells the caller to create the entry.
pub trait KeyLookup: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn find(&self, key: &LovKey) -> Option<LovLocation>;

    /// Records a new entry. Inserting a known key is a logic error.
    fn insert(&mut self, key: LovKey, location: LovLocation) -> BitmapResult<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Locations of every entry selected by `predicate`, in LOV order.
    fn matching(&self, predicate: &ScanPredicate) -> Vec<LovLocation>;
}

fn duplicate(key: &LovKey, existing: LovLocation) -> BitmapError {
    BitmapError::format(
        format!("duplicate LOV entry, key already at {}", existing),
        ErrorContext::none().with_key(key.to_string()),
    )
}

/// Hash table over raw key values.
#[derive(Debug, Default)]
pub struct HashLookup {
    entries: HashMap<LovKey, LovLocation>,
}

impl HashLookup {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyLookup for HashLookup {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn find(&self, key: &LovKey) -> Option<LovLocation> {
        self.entries.get(key).copied()
    }

    fn insert(&mut self, key: LovKey, location: LovLocation) -> BitmapResult<()> {
        if let Some(existing) = self.entries.get(&key) {
            return Err(duplicate(&key, *existing));
        }
        self.entries.insert(key, location);
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn matching(&self, predicate: &ScanPredicate) -> Vec<LovLocation> {
        let found = match predicate {
            ScanPredicate::Eq(key) => self.find(key).into_iter().collect(),
            ScanPredicate::In(keys) => keys.iter().filter_map(|k| self.find(k)).collect(),
            ScanPredicate::All(keys) => every(keys, |k| self.find(k)),
            // No order to exploit: filter every entry.
            _ => self
                .entries
                .iter()
                .filter(|(k, _)| predicate.matches(k))
                .map(|(_, loc)| *loc)
                .collect(),
        };
        sorted(found)
    }
}

/// Ordered key map answering lookups by ordered search.
#[derive(Debug, Default)]
pub struct OrderedScanLookup {
    entries: BTreeMap<LovKey, LovLocation>,
}

impl OrderedScanLookup {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyLookup for OrderedScanLookup {
    fn name(&self) -> &'static str {
        "ordered-scan"
    }

    fn find(&self, key: &LovKey) -> Option<LovLocation> {
        self.entries.get(key).copied()
    }

    fn insert(&mut self, key: LovKey, location: LovLocation) -> BitmapResult<()> {
        if let Some(existing) = self.entries.get(&key) {
            return Err(duplicate(&key, *existing));
        }
        self.entries.insert(key, location);
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn matching(&self, predicate: &ScanPredicate) -> Vec<LovLocation> {
        let found = match predicate {
            ScanPredicate::Eq(key) => self.find(key).into_iter().collect(),
            ScanPredicate::In(keys) => keys.iter().filter_map(|k| self.find(k)).collect(),
            ScanPredicate::All(keys) => every(keys, |k| self.find(k)),
            ScanPredicate::Range { lower, upper } => {
                if range_is_empty(lower, upper) {
                    Vec::new()
                } else {
                    self.entries
                        .range((lower.clone(), upper.clone()))
                        .filter(|(k, _)| predicate.matches(k))
                        .map(|(_, loc)| *loc)
                        .collect()
                }
            }
            // All-NULL keys sort first.
            ScanPredicate::IsNull => self
                .entries
                .iter()
                .take_while(|(k, _)| k.values().first().map_or(true, |v| v.is_none()))
                .filter(|(k, _)| k.is_all_null())
                .map(|(_, loc)| *loc)
                .collect(),
        };
        sorted(found)
    }
}

/// Picks the lookup strategy for a schema.
pub fn lookup_for(schema: &IndexSchema) -> Box<dyn KeyLookup> {
    if schema.is_hashable() {
        Box::new(HashLookup::new())
    } else {
        Box::new(OrderedScanLookup::new())
    }
}
