//! Single-row insert
//!
//! A TID above the vector's last set bit is appended through a resumed
//! `TidBuffer`. A TID inside the vector is set in place:
//!
//! - partial word or held-back word: new tail state (`LastWords`, or
//!   `BitmapWords` when a split releases words)
//! - literal on a page: `UpdateWord`
//! - 1-fill on a page: nothing to do
//! - 0-fill on a page: split into up to three words; when the page
//!   overflows, its last words move to a new page chained after it
//!   (`UpdateWords`)

use crate::build::TidBuffer;
use crate::errors::{BitmapError, BitmapResult, ErrorContext};
use crate::hrl::{HrlWord, WORD_BITS};
use crate::lov::{LovItem, LovKey, LovLocation};
use crate::page::{BitmapPage, Page, PageId, PageStore};
use crate::tid::{bit_index, check_tid, word_index, ItemPointer, Tid};
use crate::wal::{UpdateWordPatch, UpdateWordsSplit, WalPayload, WalSink};

use super::handle::BitmapIndex;

/// Run of `len` zero words as it is stored
fn zero_run(len: u64) -> HrlWord {
    if len == 1 {
        HrlWord::Literal(0)
    } else {
        HrlWord::Fill { bit: false, len }
    }
}

impl<S: PageStore, W: WalSink> BitmapIndex<S, W> {
    /// Marks `tid` present for `key`. Returns false if it already was.
    pub fn insert(&self, key: &LovKey, tid: Tid) -> BitmapResult<bool> {
        check_tid(tid)?;
        let location = self.lookup_or_create(key)?;
        let changed = self
            .locks
            .with_exclusive(location.page, || self.set_bit(location, tid))
            .map_err(|e| e.for_key(&key.to_string()))?;
        if changed {
            self.metrics.add_tids_inserted(1);
            self.note_max_tid(tid)?;
        }
        Ok(changed)
    }

    /// Inserts the row at heap address `pointer`.
    pub fn insert_item_pointer(&self, key: &LovKey, pointer: ItemPointer) -> BitmapResult<bool> {
        self.insert(key, pointer.to_tid()?)
    }

    fn set_bit(&self, location: LovLocation, tid: Tid) -> BitmapResult<bool> {
        let mut item = self.read_item(location)?;

        if tid > item.last_setbit {
            let mut buffer = TidBuffer::resume(&item);
            buffer.append(tid, true)?;
            let words = buffer.take_words();
            self.flush_vector(location, &mut item, words, buffer.tail())?;
            return Ok(true);
        }
        if tid == item.last_setbit {
            return Ok(false);
        }

        let index = word_index(tid);
        if index >= item.words_covered {
            let mut buffer = TidBuffer::resume(&item);
            if !buffer.set_in_last_word(tid) {
                return Ok(false);
            }
            self.flush_vector(location, &mut item, Vec::new(), buffer.tail())?;
            return Ok(true);
        }
        if index >= item.page_words {
            let mut buffer = TidBuffer::resume(&item);
            if !buffer.set_in_pending(tid)? {
                return Ok(false);
            }
            let words = buffer.take_words();
            self.flush_vector(location, &mut item, words, buffer.tail())?;
            return Ok(true);
        }
        self.set_on_page(location, &mut item, tid)
    }

    /// Finds the page holding word `word_index(tid)` and sets the bit there.
    fn set_on_page(&self, location: LovLocation, item: &mut LovItem, tid: Tid) -> BitmapResult<bool> {
        let target = word_index(tid);
        let mut base = 0u64;
        let mut next = item.head_page;
        let mut hops = 0u32;
        while let Some(id) = next {
            hops += 1;
            if hops > self.store.page_count() {
                return Err(BitmapError::format(
                    "bitmap chain does not terminate",
                    ErrorContext::page(id).with_tid(tid),
                ));
            }
            let page = self.store.read_bitmap(id)?;
            let len = page.uncompressed_len();
            if target < base + len {
                return self.set_in_page(location, item, id, page, base, tid);
            }
            base += len;
            next = page.next;
        }
        Err(BitmapError::format(
            format!(
                "bitmap chain ends after {} words, item claims {}",
                base, item.page_words
            ),
            ErrorContext::tid(tid),
        ))
    }

    fn set_in_page(
        &self,
        location: LovLocation,
        item: &mut LovItem,
        id: PageId,
        mut page: BitmapPage,
        base: u64,
        tid: Tid,
    ) -> BitmapResult<bool> {
        let target = word_index(tid);
        let bit = 1u64 << bit_index(tid);
        let mut start = base;
        let mut slot = None;
        for (n, word) in page.words.iter().enumerate() {
            if target < start + word.word_len() {
                slot = Some((n, *word));
                break;
            }
            start += word.word_len();
        }
        let (n, word) = slot.ok_or_else(|| {
            BitmapError::format(
                format!("word {} not on page", target),
                ErrorContext::page(id).with_tid(tid),
            )
        })?;

        match word {
            HrlWord::Literal(v) if v & bit != 0 => Ok(false),
            HrlWord::Fill { bit: true, .. } => Ok(false),
            HrlWord::Literal(v) => {
                let word = HrlWord::Literal(v | bit);
                self.log(WalPayload::UpdateWord(UpdateWordPatch {
                    page: id,
                    word_no: n as u32,
                    word,
                }))?;
                page.words[n] = word;
                self.store.write(id, &Page::Bitmap(page))?;
                self.metrics.add_words_written(1);
                Ok(true)
            }
            HrlWord::Fill { bit: false, len } => {
                let offset = target - start;
                let mut pieces = Vec::with_capacity(3);
                if offset > 0 {
                    pieces.push(zero_run(offset));
                }
                pieces.push(HrlWord::Literal(bit));
                if len - offset - 1 > 0 {
                    pieces.push(zero_run(len - offset - 1));
                }
                let added = pieces.len() as u64;
                page.words.splice(n..=n, pieces);
                self.split_page(location, item, id, page, base)?;
                self.metrics.add_words_written(added);
                Ok(true)
            }
        }
    }

    /// Writes a page grown by a split, moving overflow to a new page.
    fn split_page(
        &self,
        location: LovLocation,
        item: &mut LovItem,
        id: PageId,
        mut page: BitmapPage,
        base: u64,
    ) -> BitmapResult<()> {
        let capacity = self.words_per_page();
        let mut pages = Vec::with_capacity(2);
        let mut new_item = None;
        let mut new_last_page = false;

        if page.words.len() > capacity {
            let spill_id = self.allocate_page()?;
            let spill = BitmapPage {
                next: page.next,
                last_tid: page.last_tid,
                words: page.words.split_off(capacity),
            };
            page.next = Some(spill_id);
            page.last_tid = (base + page.uncompressed_len()) * WORD_BITS;
            if item.tail_page == Some(id) {
                let mut next = item.clone();
                next.tail_page = Some(spill_id);
                new_item = Some(next);
                new_last_page = true;
            }
            pages.push((id, page));
            pages.push((spill_id, spill));
        } else {
            pages.push((id, page));
        }

        self.log(WalPayload::UpdateWords(UpdateWordsSplit {
            location,
            pages: pages.clone(),
            item: new_item.clone(),
            new_last_page,
        }))?;
        for (page_id, page) in pages {
            self.store.write(page_id, &Page::Bitmap(page))?;
        }
        if let Some(next) = new_item {
            self.write_item(location, &next)?;
            *item = next;
        }
        Ok(())
    }
}
