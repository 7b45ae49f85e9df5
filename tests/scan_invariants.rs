//! Scan Invariant Tests
//!
//! - Every TID stored is returned, and nothing else
//! - Output is strictly ascending
//! - A multi-key scan returns the union of the vectors
//! - mark/restore replays the same sequence
//! - Bulk build and single-row insert produce the same index content

use std::collections::BTreeSet;
use std::ops::Bound;

use aerobitmap::index::{BitmapIndex, IndexOptions};
use aerobitmap::lov::{AttributeType, IndexKey, IndexSchema, LovKey, ScanPredicate};
use aerobitmap::page::MemoryPageStore;
use aerobitmap::scan::{ScanDirection, ScanState};
use aerobitmap::tid::Tid;
use aerobitmap::wal::MemoryWal;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// =============================================================================
// Helper Functions
// =============================================================================

type MemIndex = BitmapIndex<MemoryPageStore, MemoryWal>;

fn text_index(page_size: usize, options: IndexOptions) -> MemIndex {
    let schema = IndexSchema::new(vec![AttributeType::Text]).unwrap();
    BitmapIndex::create(MemoryPageStore::new(page_size), MemoryWal::new(), schema, options).unwrap()
}

fn small_batches() -> IndexOptions {
    IndexOptions {
        batch_words: 2,
        batch_tids: 3,
        ..IndexOptions::default()
    }
}

/// Builds `rows` (sorted by TID) in one session.
fn build(index: &MemIndex, rows: &[(Tid, &str)]) {
    let mut session = index.build();
    for (tid, key) in rows {
        session.add(&LovKey::text(key), *tid).unwrap();
    }
    session.finish().unwrap();
}

fn scan_eq(index: &MemIndex, key: &str) -> Vec<Tid> {
    index
        .scan(ScanPredicate::Eq(LovKey::text(key)))
        .collect_bitmap()
        .unwrap()
}

/// Random sparse-and-dense TID set: long gaps, short gaps and full runs.
fn random_tids(rng: &mut StdRng, count: usize) -> BTreeSet<Tid> {
    let mut tids = BTreeSet::new();
    let mut tid: Tid = rng.gen_range(1..200);
    while tids.len() < count {
        match rng.gen_range(0..10) {
            0 => tid += rng.gen_range(500..20_000),
            1..=3 => {
                let run = rng.gen_range(60..300);
                for t in tid..tid + run {
                    tids.insert(t);
                }
                tid += run;
            }
            _ => tid += rng.gen_range(1..40),
        }
        tids.insert(tid);
    }
    tids
}

// =============================================================================
// Scenario Tests
// =============================================================================

/// Build then scan returns exactly the stored TIDs.
#[test]
fn test_build_scan_scenario() {
    let index = text_index(256, IndexOptions::default());
    let tids = [1, 2, 3, 100, 101, 5000];
    let rows: Vec<(Tid, &str)> = tids.iter().map(|&t| (t, "A")).collect();
    build(&index, &rows);

    assert_eq!(scan_eq(&index, "A"), tids.to_vec());
}

/// A disjunctive scan merges both vectors.
#[test]
fn test_disjunctive_scan() {
    let index = text_index(256, small_batches());
    build(
        &index,
        &[(1, "A"), (2, "B"), (5, "A"), (9, "A"), (10, "B")],
    );
    // TID 5 also holds B
    index.insert(&LovKey::text("B"), 5).unwrap();

    let tids = index
        .scan(ScanPredicate::In(vec![LovKey::text("A"), LovKey::text("B")]))
        .collect_bitmap()
        .unwrap();
    assert_eq!(tids, vec![1, 2, 5, 9, 10]);
}

/// A key with no entry scans as empty.
#[test]
fn test_unknown_key_scans_empty() {
    let index = text_index(256, IndexOptions::default());
    build(&index, &[(3, "A")]);
    assert!(scan_eq(&index, "Z").is_empty());
}

// =============================================================================
// Randomized Properties
// =============================================================================

/// Every TID comes back, in strictly ascending order, across page
/// boundaries and refills.
#[test]
fn test_random_roundtrip() {
    let mut rng = StdRng::seed_from_u64(0xB17_3A9);
    for page_size in [256, 8192] {
        let index = text_index(page_size, small_batches());
        let a = random_tids(&mut rng, 3000);
        let b = random_tids(&mut rng, 1500);

        let mut rows: Vec<(Tid, &str)> = Vec::new();
        for &t in a.union(&b) {
            // a TID holds one key per row; rows for both keys go to A here
            rows.push((t, if a.contains(&t) { "A" } else { "B" }));
        }
        build(&index, &rows);

        let expected_a: Vec<Tid> = a.iter().copied().collect();
        let expected_b: Vec<Tid> = b.difference(&a).copied().collect();
        assert_eq!(scan_eq(&index, "A"), expected_a);
        assert_eq!(scan_eq(&index, "B"), expected_b);
    }
}

/// The union equals the set union and does not depend on key order.
#[test]
fn test_union_matches_set_union() {
    let mut rng = StdRng::seed_from_u64(42);
    let index = text_index(256, small_batches());
    let keys = ["K0", "K1", "K2", "K3"];
    let mut expected = BTreeSet::new();
    for key in keys {
        for tid in random_tids(&mut rng, 400) {
            index.insert(&LovKey::text(key), tid).unwrap();
            expected.insert(tid);
        }
    }

    let forward: Vec<LovKey> = keys.iter().map(|k| LovKey::text(k)).collect();
    let mut backward = forward.clone();
    backward.reverse();

    let a = index.scan(ScanPredicate::In(forward)).collect_bitmap().unwrap();
    let b = index.scan(ScanPredicate::In(backward)).collect_bitmap().unwrap();
    assert_eq!(a, expected.into_iter().collect::<Vec<_>>());
    assert_eq!(a, b);
    assert!(a.windows(2).all(|w| w[0] < w[1]));
}

/// A conjunctive scan equals the set intersection, in any key order.
#[test]
fn test_intersection_matches_set_intersection() {
    let mut rng = StdRng::seed_from_u64(99);
    let index = text_index(256, small_batches());
    let keys = ["K0", "K1", "K2"];
    let mut sets = Vec::new();
    for key in keys {
        // dense enough that all three overlap
        let mut tids = random_tids(&mut rng, 1500);
        tids.extend(1..=400u64);
        for &tid in &tids {
            index.insert(&LovKey::text(key), tid).unwrap();
        }
        sets.push(tids);
    }
    let expected: Vec<Tid> = sets[0]
        .iter()
        .filter(|t| sets[1].contains(t) && sets[2].contains(t))
        .copied()
        .collect();
    assert!(expected.len() >= 400);

    let forward: Vec<LovKey> = keys.iter().map(|k| LovKey::text(k)).collect();
    let mut backward = forward.clone();
    backward.reverse();
    let a = index.scan(ScanPredicate::All(forward)).collect_bitmap().unwrap();
    let b = index.scan(ScanPredicate::All(backward)).collect_bitmap().unwrap();
    assert_eq!(a, expected);
    assert_eq!(a, b);

    let pair = vec![LovKey::text("K0"), LovKey::text("K1")];
    let expected_pair: Vec<Tid> = sets[0].intersection(&sets[1]).copied().collect();
    assert_eq!(index.scan(ScanPredicate::All(pair)).collect_bitmap().unwrap(), expected_pair);
}

/// Inserting rows in random order gives the same content as a build.
#[test]
fn test_insert_matches_build() {
    let mut rng = StdRng::seed_from_u64(7);
    let tids: Vec<Tid> = random_tids(&mut rng, 2000).into_iter().collect();

    let built = text_index(256, IndexOptions::default());
    let rows: Vec<(Tid, &str)> = tids.iter().map(|&t| (t, "A")).collect();
    build(&built, &rows);

    let inserted = text_index(256, IndexOptions::default());
    let mut shuffled = tids.clone();
    for i in (1..shuffled.len()).rev() {
        let j = rng.gen_range(0..=i);
        shuffled.swap(i, j);
    }
    for tid in &shuffled {
        assert!(inserted.insert(&LovKey::text("A"), *tid).unwrap());
    }
    for tid in shuffled.iter().take(50) {
        assert!(!inserted.insert(&LovKey::text("A"), *tid).unwrap());
    }

    assert_eq!(scan_eq(&inserted, "A"), tids);
    assert_eq!(scan_eq(&built, "A"), tids);
}

// =============================================================================
// Position Tests
// =============================================================================

/// mark, advance, restore: the same TIDs follow.
#[test]
fn test_mark_restore_replays_sequence() {
    let index = text_index(256, small_batches());
    let rows: Vec<(Tid, &str)> = (1..400u64)
        .filter(|t| t % 3 != 0)
        .map(|t| (t * 7, if t % 2 == 0 { "A" } else { "B" }))
        .collect();
    build(&index, &rows);

    let mut scan = index.scan(ScanPredicate::In(vec![LovKey::text("A"), LovKey::text("B")]));
    scan.next_batch(10).unwrap();
    let mark = scan.mark();
    let ahead = scan.next_batch(25).unwrap();
    scan.restore(&mark);
    let again = scan.next_batch(25).unwrap();
    assert_eq!(ahead, again);
    assert_eq!(ahead.len(), 25);
}

/// Restoring a mark taken before exhaustion revives the scan.
#[test]
fn test_restore_after_exhaustion() {
    let index = text_index(256, IndexOptions::default());
    build(&index, &[(4, "A"), (8, "A")]);

    let mut scan = index.scan(ScanPredicate::Eq(LovKey::text("A")));
    scan.first(ScanDirection::Forward).unwrap();
    let mark = scan.mark();
    assert_eq!(scan.collect_bitmap().unwrap(), vec![4, 8]);
    assert_eq!(scan.state(), ScanState::Exhausted);

    scan.restore(&mark);
    assert_eq!(scan.state(), ScanState::Positioned);
    assert_eq!(scan.collect_bitmap().unwrap(), vec![4, 8]);
}

/// A scan sees the vector as it was when positioned.
#[test]
fn test_scan_reads_positioned_snapshot() {
    let index = text_index(256, IndexOptions::default());
    build(&index, &[(10, "A")]);

    let mut scan = index.scan(ScanPredicate::Eq(LovKey::text("A")));
    scan.first(ScanDirection::Forward).unwrap();
    index.insert(&LovKey::text("A"), 9000).unwrap();
    assert_eq!(scan.collect_bitmap().unwrap(), vec![10]);

    scan.first(ScanDirection::Forward).unwrap();
    assert_eq!(scan.collect_bitmap().unwrap(), vec![10, 9000]);
}

// =============================================================================
// Predicate Tests
// =============================================================================

/// Range scans over an ordered lookup; NULL keys only match IS NULL.
#[test]
fn test_range_and_null_predicates() {
    let schema = IndexSchema::new(vec![AttributeType::Float]).unwrap();
    let index = BitmapIndex::create(
        MemoryPageStore::new(256),
        MemoryWal::new(),
        schema,
        IndexOptions::default(),
    )
    .unwrap();
    assert_eq!(index.lookup_name().unwrap(), "ordered-scan");

    let key = |v: f64| LovKey::single(IndexKey::from_float(v));
    let mut session = index.build();
    session.add(&key(1.5), 1).unwrap();
    session.add(&key(2.5), 2).unwrap();
    session.add(&LovKey::nulls(1), 3).unwrap();
    session.add(&key(3.5), 4).unwrap();
    session.add(&key(1.5), 5).unwrap();
    session.finish().unwrap();

    let range = ScanPredicate::Range {
        lower: Bound::Included(key(1.5)),
        upper: Bound::Excluded(key(3.5)),
    };
    assert_eq!(index.scan(range).collect_bitmap().unwrap(), vec![1, 2, 5]);
    assert_eq!(
        index.scan(ScanPredicate::IsNull).collect_bitmap().unwrap(),
        vec![3]
    );
}

/// Predicate keys must fit the schema.
#[test]
fn test_predicate_arity_checked() {
    let index = text_index(256, IndexOptions::default());
    let mut scan = index.scan(ScanPredicate::Eq(LovKey::new(vec![None, None])));
    let err = scan.first(ScanDirection::Forward).unwrap_err();
    assert_eq!(err.code(), "AERO_BITMAP_INVALID_ARGUMENT");
}
