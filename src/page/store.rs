//! Page manager interface
//!
//! The engine only ever sees fixed-size pages addressed by block number.
//! Storage is exclusively append-allocated; pages are never freed.

use std::sync::RwLock;

use super::layout::{BitmapPage, LovPage, MetaPage, Page, PageId};
use crate::errors::{BitmapError, BitmapResult, ErrorContext};

/// Fixed-size page storage shared by all index operations.
///
/// Implementations provide interior mutability; page-level exclusion is
/// the caller's business (see `PageLocks`).
pub trait PageStore: Send + Sync {
    fn page_size(&self) -> usize;

    /// Number of allocated pages
    fn page_count(&self) -> u32;

    /// Appends a zeroed page and returns its id.
    fn allocate(&self) -> BitmapResult<PageId>;

    fn read_raw(&self, id: PageId) -> BitmapResult<Vec<u8>>;

    fn write_raw(&self, id: PageId, bytes: &[u8]) -> BitmapResult<()>;

    /// Makes every completed write durable.
    fn sync(&self) -> BitmapResult<()>;

    fn contains(&self, id: PageId) -> bool {
        id < self.page_count()
    }

    /// Grows the store until `id` is allocated.
    fn ensure_page(&self, id: PageId) -> BitmapResult<()> {
        while !self.contains(id) {
            self.allocate()?;
        }
        Ok(())
    }

    fn read(&self, id: PageId) -> BitmapResult<Page> {
        let bytes = self.read_raw(id)?;
        Page::deserialize(&bytes, id)
    }

    fn write(&self, id: PageId, page: &Page) -> BitmapResult<()> {
        let bytes = page.serialize(self.page_size())?;
        self.write_raw(id, &bytes)
    }

    fn read_meta(&self, id: PageId) -> BitmapResult<MetaPage> {
        self.read(id)?.into_meta(id)
    }

    fn read_lov(&self, id: PageId) -> BitmapResult<LovPage> {
        self.read(id)?.into_lov(id)
    }

    fn read_bitmap(&self, id: PageId) -> BitmapResult<BitmapPage> {
        self.read(id)?.into_bitmap(id)
    }
}

pub(crate) fn missing_page(id: PageId, count: u32) -> BitmapError {
    BitmapError::resource(
        format!("page {} not allocated ({} pages)", id, count),
        ErrorContext::page(id),
    )
}

pub(crate) fn check_image_len(id: PageId, bytes: &[u8], page_size: usize) -> BitmapResult<()> {
    if bytes.len() != page_size {
        return Err(BitmapError::invalid_argument(
            format!(
                "page image of {} bytes does not match page size {}",
                bytes.len(),
                page_size
            ),
            ErrorContext::page(id),
        ));
    }
    Ok(())
}

/// In-memory page store used by tests and throwaway indexes.
#[derive(Debug)]
pub struct MemoryPageStore {
    page_size: usize,
    pages: RwLock<Vec<Vec<u8>>>,
}

impl MemoryPageStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            pages: RwLock::new(Vec::new()),
        }
    }
}

impl PageStore for MemoryPageStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(&self) -> u32 {
        self.pages.read().map(|p| p.len() as u32).unwrap_or(0)
    }

    fn allocate(&self) -> BitmapResult<PageId> {
        let mut pages = self
            .pages
            .write()
            .map_err(|_| BitmapError::lock_poisoned("page store"))?;
        let id = pages.len() as PageId;
        pages.push(vec![0u8; self.page_size]);
        Ok(id)
    }

    fn read_raw(&self, id: PageId) -> BitmapResult<Vec<u8>> {
        let pages = self
            .pages
            .read()
            .map_err(|_| BitmapError::lock_poisoned("page store"))?;
        pages
            .get(id as usize)
            .cloned()
            .ok_or_else(|| missing_page(id, pages.len() as u32))
    }

    fn write_raw(&self, id: PageId, bytes: &[u8]) -> BitmapResult<()> {
        check_image_len(id, bytes, self.page_size)?;
        let mut pages = self
            .pages
            .write()
            .map_err(|_| BitmapError::lock_poisoned("page store"))?;
        let count = pages.len() as u32;
        let slot = pages
            .get_mut(id as usize)
            .ok_or_else(|| missing_page(id, count))?;
        slot.copy_from_slice(bytes);
        Ok(())
    }

    fn sync(&self) -> BitmapResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hrl::HrlWord;

    #[test]
    fn test_allocate_is_sequential() {
        let store = MemoryPageStore::new(256);
        assert_eq!(store.allocate().unwrap(), 0);
        assert_eq!(store.allocate().unwrap(), 1);
        assert_eq!(store.page_count(), 2);
    }

    #[test]
    fn test_page_write_read() {
        let store = MemoryPageStore::new(256);
        let id = store.allocate().unwrap();
        let page = BitmapPage {
            next: None,
            last_tid: 128,
            words: vec![HrlWord::Literal(3), HrlWord::Fill { bit: false, len: 9 }],
        };
        store.write(id, &Page::Bitmap(page.clone())).unwrap();
        assert_eq!(store.read_bitmap(id).unwrap(), page);
    }

    #[test]
    fn test_missing_page_is_resource_error() {
        let store = MemoryPageStore::new(256);
        let err = store.read_raw(4).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.context().and_then(|c| c.page), Some(4));
    }

    #[test]
    fn test_fresh_page_reads_as_format_error() {
        let store = MemoryPageStore::new(256);
        let id = store.allocate().unwrap();
        assert!(store.read(id).unwrap_err().is_fatal());
    }

    #[test]
    fn test_ensure_page_grows_store() {
        let store = MemoryPageStore::new(256);
        store.ensure_page(5).unwrap();
        assert_eq!(store.page_count(), 6);
        store.ensure_page(2).unwrap();
        assert_eq!(store.page_count(), 6);
    }

    #[test]
    fn test_wrong_image_size_rejected() {
        let store = MemoryPageStore::new(256);
        let id = store.allocate().unwrap();
        assert!(store.write_raw(id, &[0u8; 12]).is_err());
    }
}
