//! File-backed page store
//!
//! Pages live back to back in `<data_dir>/index/bitmap.pages`; page `n`
//! starts at byte `n * page_size`. Every write is followed by fsync.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::layout::{PageId, MIN_PAGE_SIZE};
use super::store::{check_image_len, missing_page, PageStore};
use crate::errors::{BitmapError, BitmapResult, ErrorContext};

struct PageFile {
    file: File,
    page_count: u32,
}

/// Page store over a single data file.
pub struct FilePageStore {
    path: PathBuf,
    page_size: usize,
    inner: Mutex<PageFile>,
}

impl FilePageStore {
    /// Opens or creates the page file under `data_dir`.
    ///
    /// A trailing partial page (an allocation cut short by a crash) is
    /// truncated away.
    ///
    /// # Errors
    ///
    /// Returns `AERO_BITMAP_RESOURCE` if the directory or file cannot be
    /// created or opened.
    pub fn open(data_dir: &Path, page_size: usize) -> BitmapResult<Self> {
        if page_size < MIN_PAGE_SIZE {
            return Err(BitmapError::config(format!(
                "page_size {} below minimum {}",
                page_size, MIN_PAGE_SIZE
            )));
        }

        let index_dir = data_dir.join("index");
        if !index_dir.exists() {
            fs::create_dir_all(&index_dir).map_err(|e| {
                BitmapError::io(
                    format!("Failed to create index directory: {}", index_dir.display()),
                    ErrorContext::none(),
                    e,
                )
            })?;
        }

        let path = index_dir.join("bitmap.pages");
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                BitmapError::io(
                    format!("Failed to open page file: {}", path.display()),
                    ErrorContext::none(),
                    e,
                )
            })?;

        let len = file
            .metadata()
            .map_err(|e| BitmapError::io("Failed to read page file metadata", ErrorContext::none(), e))?
            .len();
        let whole = len / page_size as u64;
        if whole * page_size as u64 != len {
            file.set_len(whole * page_size as u64).map_err(|e| {
                BitmapError::io("Failed to truncate partial page", ErrorContext::none(), e)
            })?;
        }

        Ok(Self {
            path,
            page_size,
            inner: Mutex::new(PageFile {
                file,
                page_count: whole as u32,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn offset(&self, id: PageId) -> u64 {
        id as u64 * self.page_size as u64
    }
}

impl PageStore for FilePageStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(&self) -> u32 {
        self.inner.lock().map(|f| f.page_count).unwrap_or(0)
    }

    fn allocate(&self) -> BitmapResult<PageId> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| BitmapError::lock_poisoned("page file"))?;
        let id = inner.page_count;
        let new_len = self.offset(id + 1);
        inner.file.set_len(new_len).map_err(|e| {
            BitmapError::io("Failed to extend page file", ErrorContext::page(id), e)
        })?;
        inner.page_count += 1;
        Ok(id)
    }

    fn read_raw(&self, id: PageId) -> BitmapResult<Vec<u8>> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| BitmapError::lock_poisoned("page file"))?;
        if id >= inner.page_count {
            return Err(missing_page(id, inner.page_count));
        }
        let mut buf = vec![0u8; self.page_size];
        inner
            .file
            .seek(SeekFrom::Start(self.offset(id)))
            .and_then(|_| inner.file.read_exact(&mut buf))
            .map_err(|e| BitmapError::io("Failed to read page", ErrorContext::page(id), e))?;
        Ok(buf)
    }

    fn write_raw(&self, id: PageId, bytes: &[u8]) -> BitmapResult<()> {
        check_image_len(id, bytes, self.page_size)?;
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| BitmapError::lock_poisoned("page file"))?;
        if id >= inner.page_count {
            return Err(missing_page(id, inner.page_count));
        }
        inner
            .file
            .seek(SeekFrom::Start(self.offset(id)))
            .and_then(|_| inner.file.write_all(bytes))
            .map_err(|e| BitmapError::io("Failed to write page", ErrorContext::page(id), e))?;

        // fsync - mandatory for durability
        inner
            .file
            .sync_all()
            .map_err(|e| BitmapError::io("fsync failed after page write", ErrorContext::page(id), e))
    }

    fn sync(&self) -> BitmapResult<()> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| BitmapError::lock_poisoned("page file"))?;
        inner
            .file
            .sync_all()
            .map_err(|e| BitmapError::io("fsync failed", ErrorContext::none(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{LovPage, Page};
    use tempfile::TempDir;

    #[test]
    fn test_pages_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = FilePageStore::open(dir.path(), 256).unwrap();
            let id = store.allocate().unwrap();
            store.write(id, &Page::Lov(LovPage::new())).unwrap();
        }
        let store = FilePageStore::open(dir.path(), 256).unwrap();
        assert_eq!(store.page_count(), 1);
        assert_eq!(store.read_lov(0).unwrap(), LovPage::new());
        assert!(store.path().ends_with("index/bitmap.pages"));
    }

    #[test]
    fn test_partial_trailing_page_truncated() {
        let dir = TempDir::new().unwrap();
        {
            let store = FilePageStore::open(dir.path(), 256).unwrap();
            store.allocate().unwrap();
        }
        let path = dir.path().join("index").join("bitmap.pages");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[1, 2, 3]).unwrap();
        drop(file);

        let store = FilePageStore::open(dir.path(), 256).unwrap();
        assert_eq!(store.page_count(), 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), 256);
    }

    #[test]
    fn test_read_past_end_fails() {
        let dir = TempDir::new().unwrap();
        let store = FilePageStore::open(dir.path(), 256).unwrap();
        assert!(store.read_raw(0).unwrap_err().is_retryable());
    }

    #[test]
    fn test_small_page_size_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(FilePageStore::open(dir.path(), 64).is_err());
    }
}
