//! Per-vector word reader
//!
//! Reads a vector as it stood when the reader was opened: the words on
//! its page chain up to the item's `page_words`, then the item's tail
//! words. Words appended to the chain later are not seen.

use crate::errors::{BitmapError, BitmapResult, ErrorContext};
use crate::hrl::HrlWord;
use crate::lov::{LovItem, LovLocation};
use crate::page::{PageId, PageStore};

use super::batch::BatchWords;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorReader {
    location: LovLocation,
    item: LovItem,
    next_page: Option<PageId>,
    /// Words of `next_page` already read
    page_offset: usize,
    /// Uncompressed words still to read from pages
    page_words_left: u64,
    tail_read: bool,
    max_words: usize,
    pub(crate) batch: BatchWords,
}

impl VectorReader {
    /// `max_words` is at least 2 so the tail words fit one refill.
    pub fn new(location: LovLocation, item: LovItem, max_words: usize) -> Self {
        Self {
            location,
            next_page: item.head_page,
            page_offset: 0,
            page_words_left: item.page_words,
            tail_read: false,
            max_words: max_words.max(2),
            batch: BatchWords::new(),
            item,
        }
    }

    pub fn location(&self) -> LovLocation {
        self.location
    }

    pub fn item(&self) -> &LovItem {
        &self.item
    }

    pub fn batch(&self) -> &BatchWords {
        &self.batch
    }

    fn broken_chain(&self, message: String, page: Option<PageId>) -> BitmapError {
        let context = match page {
            Some(id) => ErrorContext::page(id),
            None => ErrorContext::none(),
        };
        BitmapError::format(
            format!("vector at {}: {}", self.location, message),
            context,
        )
    }

    /// Loads up to `max_words` words into the batch.
    ///
    /// Returns fewer at the end of the vector. A chain that ends, or
    /// points at a page that does not exist, before the item's word count
    /// is reached fails with a format error.
    pub fn refill<S: PageStore + ?Sized>(&mut self, store: &S) -> BitmapResult<()> {
        let mut out: Vec<HrlWord> = Vec::with_capacity(self.max_words);
        let mut hops = 0u32;

        while out.len() < self.max_words && self.page_words_left > 0 {
            let id = self.next_page.ok_or_else(|| {
                self.broken_chain(
                    format!("chain ends with {} words unread", self.page_words_left),
                    None,
                )
            })?;
            if !store.contains(id) {
                return Err(self.broken_chain(
                    format!("chain points at missing page {}", id),
                    Some(id),
                ));
            }
            hops += 1;
            if hops > store.page_count() {
                return Err(self.broken_chain("chain does not terminate".to_string(), Some(id)));
            }

            let page = store.read_bitmap(id)?;
            for word in &page.words[self.page_offset.min(page.words.len())..] {
                if out.len() >= self.max_words || self.page_words_left == 0 {
                    break;
                }
                let word = match *word {
                    HrlWord::Fill { bit, len } if len > self.page_words_left => HrlWord::Fill {
                        bit,
                        len: self.page_words_left,
                    },
                    w => w,
                };
                self.page_words_left -= word.word_len();
                self.page_offset += 1;
                out.push(word);
            }
            if self.page_offset >= page.words.len() {
                self.next_page = page.next;
                self.page_offset = 0;
            }
        }

        if self.page_words_left == 0 && !self.tail_read {
            let tail = self.item.tail_words();
            if out.len() + tail.len() <= self.max_words {
                out.extend(tail);
                self.tail_read = true;
            }
        }

        let done = self.page_words_left == 0 && self.tail_read;
        self.batch.load(out, done);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hrl::expand_words;
    use crate::page::{BitmapPage, MemoryPageStore, Page};

    fn store_with(pages: Vec<BitmapPage>) -> MemoryPageStore {
        let store = MemoryPageStore::new(512);
        for page in pages {
            let id = store.allocate().unwrap();
            store.write(id, &Page::Bitmap(page)).unwrap();
        }
        store
    }

    fn drain(reader: &mut VectorReader, store: &MemoryPageStore) -> Vec<HrlWord> {
        let mut words = Vec::new();
        loop {
            reader.refill(store).unwrap();
            while let Some(w) = reader.batch.peek() {
                words.push(w);
                reader.batch.advance(w.word_len());
            }
            if reader.batch.is_exhausted() {
                return words;
            }
        }
    }

    #[test]
    fn test_reads_chain_then_tail() {
        let store = store_with(vec![
            BitmapPage {
                next: Some(1),
                last_tid: 128,
                words: vec![HrlWord::Literal(1), HrlWord::Literal(2)],
            },
            BitmapPage {
                next: None,
                last_tid: 320,
                words: vec![HrlWord::Fill { bit: true, len: 3 }],
            },
        ]);
        let item = LovItem {
            start_tid: 1,
            head_page: Some(0),
            tail_page: Some(1),
            last_compword: Some(HrlWord::Literal(4)),
            last_word: 8,
            last_setbit: 64 * 6 + 4,
            words_covered: 6,
            page_words: 5,
        };
        let mut reader = VectorReader::new(LovLocation::new(9, 0), item, 2);
        let words = drain(&mut reader, &store);
        assert_eq!(
            expand_words(&words),
            vec![1, 2, u64::MAX, u64::MAX, u64::MAX, 4, 8]
        );
    }

    #[test]
    fn test_missing_page_is_format_error() {
        let store = store_with(vec![BitmapPage {
            next: Some(7),
            last_tid: 64,
            words: vec![HrlWord::Literal(1)],
        }]);
        let item = LovItem {
            head_page: Some(0),
            tail_page: Some(7),
            page_words: 2,
            words_covered: 2,
            ..LovItem::default()
        };
        let mut reader = VectorReader::new(LovLocation::new(9, 0), item, 8);
        let err = reader.refill(&store).unwrap_err();
        assert_eq!(err.code(), "AERO_BITMAP_FORMAT");
    }

    #[test]
    fn test_short_chain_is_format_error() {
        let store = store_with(vec![BitmapPage {
            next: None,
            last_tid: 64,
            words: vec![HrlWord::Literal(1)],
        }]);
        let item = LovItem {
            head_page: Some(0),
            tail_page: Some(0),
            page_words: 4,
            words_covered: 4,
            ..LovItem::default()
        };
        let mut reader = VectorReader::new(LovLocation::new(9, 0), item, 8);
        assert!(reader.refill(&store).is_err());
    }

    #[test]
    fn test_words_past_snapshot_ignored() {
        let store = store_with(vec![BitmapPage {
            next: None,
            last_tid: 192,
            words: vec![HrlWord::Literal(1), HrlWord::Literal(2), HrlWord::Literal(3)],
        }]);
        let item = LovItem {
            head_page: Some(0),
            tail_page: Some(0),
            page_words: 2,
            words_covered: 2,
            ..LovItem::default()
        };
        let mut reader = VectorReader::new(LovLocation::new(9, 0), item, 8);
        assert_eq!(expand_words(&drain(&mut reader, &store)), vec![1, 2]);
    }
}
