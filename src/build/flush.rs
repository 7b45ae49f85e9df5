//! Moving final words from a buffer onto a vector's page chain
//!
//! One flush is one WAL record: `LastWords` when only the tail state in
//! the LOV item changes, `BitmapWords` with page after-images otherwise.
//! The caller holds the lock of the LOV page storing the vector's entry.

use crate::errors::BitmapResult;
use crate::hrl::{HrlWord, WORD_BITS};
use crate::index::BitmapIndex;
use crate::lov::{LovItem, LovLocation};
use crate::page::{BitmapPage, Page, PageId, PageStore};
use crate::wal::{BitmapWordsUpdate, LastWordsUpdate, TailState, WalPayload, WalSink};

/// What one flush wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    pub words_written: u64,
    pub pages_written: u64,
}

impl<S: PageStore, W: WalSink> BitmapIndex<S, W> {
    /// Appends `words` to the vector at `location` and installs `tail`.
    ///
    /// `item` is the vector's current LOV item and is replaced by the new
    /// one only once every write succeeded.
    pub(crate) fn flush_vector(
        &self,
        location: LovLocation,
        item: &mut LovItem,
        words: Vec<HrlWord>,
        tail: TailState,
    ) -> BitmapResult<FlushOutcome> {
        if words.is_empty() {
            if TailState::of(item) == tail {
                return Ok(FlushOutcome::default());
            }
            self.log(WalPayload::LastWords(LastWordsUpdate { location, tail }))?;
            let mut next = item.clone();
            tail.apply_to(&mut next);
            self.write_item(location, &next)?;
            *item = next;
            return Ok(FlushOutcome::default());
        }

        let capacity = self.words_per_page();
        let mut next = item.clone();
        let init_first_page = next.head_page.is_none();
        let words_written = words.len() as u64;

        let mut current: (PageId, BitmapPage) = match next.tail_page {
            Some(id) => (id, self.store.read_bitmap(id)?),
            None => {
                let id = self.allocate_page()?;
                next.head_page = Some(id);
                (id, BitmapPage::new())
            }
        };
        let mut touched = Vec::new();
        let mut page_words = next.page_words;
        for word in words {
            if current.1.words.len() >= capacity {
                let id = self.allocate_page()?;
                current.1.next = Some(id);
                touched.push(std::mem::replace(&mut current, (id, BitmapPage::new())));
            }
            page_words += word.word_len();
            current.1.words.push(word);
            current.1.last_tid = page_words * WORD_BITS;
        }
        next.tail_page = Some(current.0);
        touched.push(current);
        next.page_words = page_words;
        tail.apply_to(&mut next);

        self.log(WalPayload::BitmapWords(BitmapWordsUpdate {
            location,
            item: next.clone(),
            pages: touched.clone(),
            init_first_page,
        }))?;
        let pages_written = touched.len() as u64;
        for (id, page) in touched {
            self.store.write(id, &Page::Bitmap(page))?;
        }
        self.write_item(location, &next)?;
        *item = next;

        self.metrics.add_words_written(words_written);
        self.metrics.increment_flushes();
        Ok(FlushOutcome {
            words_written,
            pages_written,
        })
    }
}
