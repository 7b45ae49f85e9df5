//! Consistency verifier for recovery
//!
//! Walks every page reachable from the metapage after replay:
//! - Checksum of every page (verified by the store read)
//! - LOV chain length and entry count agree with the metapage
//! - Every vector's bitmap chain ends at its tail page and holds
//!   exactly the words its LOV item claims

use std::collections::HashSet;

use crate::errors::{BitmapError, BitmapResult, ErrorContext};
use crate::page::{PageId, PageStore, METAPAGE_ID};

/// Verification statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationStats {
    pub lov_pages: u64,
    pub lov_entries: u64,
    pub bitmap_pages: u64,
    /// Compressed words stored on bitmap pages
    pub stored_words: u64,
}

/// Consistency verifier that checks page integrity
pub struct ConsistencyVerifier;

fn broken(message: String, page: PageId) -> BitmapError {
    BitmapError::format(message, ErrorContext::page(page))
}

impl ConsistencyVerifier {
    /// Returns FATAL error on any corruption or broken chain.
    pub fn verify<S: PageStore + ?Sized>(store: &S) -> BitmapResult<VerificationStats> {
        let meta = store.read_meta(METAPAGE_ID)?;
        let mut stats = VerificationStats::default();
        let mut seen = HashSet::new();

        let mut next = meta.lov_head;
        let mut last_lov = None;
        while let Some(id) = next {
            if !seen.insert(id) {
                return Err(broken(format!("LOV chain revisits page {}", id), id));
            }
            if !store.contains(id) {
                return Err(broken(format!("LOV chain points past end at {}", id), id));
            }
            let lov = store.read_lov(id)?;
            stats.lov_pages += 1;
            for entry in &lov.entries {
                stats.lov_entries += 1;
                let key = entry.key.to_string();
                Self::verify_vector(store, &entry.item, &mut seen, &mut stats)
                    .map_err(|e| e.for_key(&key))?;
            }
            last_lov = Some(id);
            next = lov.next;
        }

        if last_lov != meta.lov_tail {
            return Err(broken(
                format!(
                    "metapage LOV tail {:?} but chain ends at {:?}",
                    meta.lov_tail, last_lov
                ),
                METAPAGE_ID,
            ));
        }
        if stats.lov_entries != meta.lov_entries {
            return Err(broken(
                format!(
                    "metapage counts {} LOV entries, chain holds {}",
                    meta.lov_entries, stats.lov_entries
                ),
                METAPAGE_ID,
            ));
        }
        Ok(stats)
    }

    fn verify_vector<S: PageStore + ?Sized>(
        store: &S,
        item: &crate::lov::LovItem,
        seen: &mut HashSet<PageId>,
        stats: &mut VerificationStats,
    ) -> BitmapResult<()> {
        let mut words = 0u64;
        let mut last = None;
        let mut next = item.head_page;
        while let Some(id) = next {
            if !seen.insert(id) {
                return Err(broken(format!("bitmap page {} reached twice", id), id));
            }
            if !store.contains(id) {
                return Err(broken(format!("bitmap chain points past end at {}", id), id));
            }
            let page = store.read_bitmap(id)?;
            stats.bitmap_pages += 1;
            stats.stored_words += page.words.len() as u64;
            words += page.uncompressed_len();
            last = Some(id);
            next = page.next;
        }

        let page = last.or(item.head_page).unwrap_or(METAPAGE_ID);
        if last != item.tail_page {
            return Err(broken(
                format!("chain ends at {:?}, item tail is {:?}", last, item.tail_page),
                page,
            ));
        }
        if words != item.page_words {
            return Err(broken(
                format!("chain holds {} words, item claims {}", words, item.page_words),
                page,
            ));
        }
        let tail_len = item.last_compword.map(|w| w.word_len()).unwrap_or(0);
        if item.page_words + tail_len != item.words_covered {
            return Err(broken(
                format!(
                    "item covers {} words but pages and tail hold {}",
                    item.words_covered,
                    item.page_words + tail_len
                ),
                page,
            ));
        }
        if item.last_setbit > item.covered_tids() {
            return Err(broken(
                format!(
                    "last set TID {} beyond covered {}",
                    item.last_setbit,
                    item.covered_tids()
                ),
                page,
            ));
        }
        Ok(())
    }
}
