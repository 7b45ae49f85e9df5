//! Page-granular exclusive locks
//!
//! Writers of a vector hold the lock of the LOV page that stores its
//! entry; creators of LOV entries hold the metapage lock. Lock order is
//! always metapage first, then LOV page.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::layout::PageId;
use crate::errors::{BitmapError, BitmapResult};

/// Table of per-page mutexes, created on first use.
#[derive(Debug, Default)]
pub struct PageLocks {
    table: Mutex<HashMap<PageId, Arc<Mutex<()>>>>,
}

impl PageLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, page: PageId) -> BitmapResult<Arc<Mutex<()>>> {
        let mut table = self
            .table
            .lock()
            .map_err(|_| BitmapError::lock_poisoned("page lock table"))?;
        Ok(table
            .entry(page)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    /// Runs `f` while holding `page` exclusively.
    pub fn with_exclusive<T, F>(&self, page: PageId, f: F) -> BitmapResult<T>
    where
        F: FnOnce() -> BitmapResult<T>,
    {
        let lock = self.lock_for(page)?;
        let _guard = lock
            .lock()
            .map_err(|_| BitmapError::lock_poisoned("page"))?;
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_same_page_is_serialized() {
        let locks = Arc::new(PageLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                thread::spawn(move || {
                    locks
                        .with_exclusive(3, || {
                            assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                            thread::yield_now();
                            inside.fetch_sub(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_nested_different_pages() {
        let locks = PageLocks::new();
        let value = locks
            .with_exclusive(0, || locks.with_exclusive(1, || Ok(7)))
            .unwrap();
        assert_eq!(value, 7);
    }
}
