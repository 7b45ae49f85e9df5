//! Adapter implementations for recovery traits
//!
//! Connects the WAL readers and the page store to the replayer.

use crate::errors::{BitmapError, BitmapResult, ErrorContext};
use crate::lov::{LovItem, LovLocation};
use crate::page::{BitmapPage, LovPage, Page, PageId, PageStore, METAPAGE_ID};
use crate::wal::{MemoryWalReader, WalPayload, WalReader, WalRecord};

use super::replay::{RecordApply, WalRead};

// ============================================================================
// WalRead implementations
// ============================================================================

impl WalRead for WalReader {
    fn read_next(&mut self) -> BitmapResult<Option<WalRecord>> {
        WalReader::read_next(self)
    }

    fn reset(&mut self) -> BitmapResult<()> {
        WalReader::reset(self)
    }
}

impl WalRead for MemoryWalReader {
    fn read_next(&mut self) -> BitmapResult<Option<WalRecord>> {
        MemoryWalReader::read_next(self)
    }

    fn reset(&mut self) -> BitmapResult<()> {
        MemoryWalReader::reset(self);
        Ok(())
    }
}

// ============================================================================
// Page store target
// ============================================================================

/// Applies WAL after-images to a page store, allocating missing pages.
pub struct PageApplier<'a, S: PageStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: PageStore + ?Sized> PageApplier<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    fn write_bitmap_pages(&self, pages: &[(PageId, BitmapPage)]) -> BitmapResult<()> {
        for (id, page) in pages {
            self.store.ensure_page(*id)?;
            self.store.write(*id, &Page::Bitmap(page.clone()))?;
        }
        Ok(())
    }

    fn update_item<F>(&self, location: LovLocation, update: F) -> BitmapResult<()>
    where
        F: FnOnce(&mut LovItem),
    {
        let mut lov = self.store.read_lov(location.page)?;
        let slot = location.offset as usize;
        let entry = lov.entries.get_mut(slot).ok_or_else(|| {
            BitmapError::format(
                format!("WAL record targets missing LOV slot {}", location),
                ErrorContext::page(location.page),
            )
        })?;
        update(&mut entry.item);
        self.store.write(location.page, &Page::Lov(lov))
    }
}

impl<S: PageStore + ?Sized> RecordApply for PageApplier<'_, S> {
    fn apply_wal_record(&mut self, record: &WalRecord) -> BitmapResult<()> {
        match &record.payload {
            WalPayload::MetapageUpdate(meta) => {
                self.store.ensure_page(METAPAGE_ID)?;
                self.store.write(METAPAGE_ID, &Page::Meta(meta.clone()))
            }
            WalPayload::LovItemUpdate(u) => {
                let page = u.location.page;
                self.store.ensure_page(page)?;
                let mut lov = if u.new_lov_page {
                    // Fresh page: its old image may be zeroes.
                    self.store.read_lov(page).unwrap_or_else(|_| LovPage::new())
                } else {
                    self.store.read_lov(page)?
                };
                lov.set_entry(u.location.offset, u.entry.clone(), page)?;
                self.store.write(page, &Page::Lov(lov))?;

                if let Some(prev) = u.prev_lov_page {
                    let mut prev_page = self.store.read_lov(prev)?;
                    prev_page.next = Some(page);
                    self.store.write(prev, &Page::Lov(prev_page))?;
                }
                if let Some(meta) = &u.meta {
                    self.store.ensure_page(METAPAGE_ID)?;
                    self.store.write(METAPAGE_ID, &Page::Meta(meta.clone()))?;
                }
                Ok(())
            }
            WalPayload::BitmapWords(u) => {
                self.write_bitmap_pages(&u.pages)?;
                let item = u.item.clone();
                self.update_item(u.location, |target| *target = item)
            }
            WalPayload::UpdateWord(u) => {
                let mut page = self.store.read_bitmap(u.page)?;
                let slot = page.words.get_mut(u.word_no as usize).ok_or_else(|| {
                    BitmapError::format(
                        format!("WAL patch targets missing word {}", u.word_no),
                        ErrorContext::page(u.page),
                    )
                })?;
                *slot = u.word;
                self.store.write(u.page, &Page::Bitmap(page))
            }
            WalPayload::LastWords(u) => self.update_item(u.location, |item| u.tail.apply_to(item)),
            WalPayload::UpdateWords(u) => {
                self.write_bitmap_pages(&u.pages)?;
                match &u.item {
                    Some(item) => {
                        let item = item.clone();
                        self.update_item(u.location, |target| *target = item)
                    }
                    None => Ok(()),
                }
            }
        }
    }
}
