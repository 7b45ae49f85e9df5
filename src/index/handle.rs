//! Index handle: the page store, the WAL and the in-memory key lookup
//! of one bitmap index.
//!
//! # Locking
//!
//! - `meta` doubles as the metapage lock; LOV entry creation holds it
//! - Every vector mutation holds the lock of the LOV page storing its entry
//! - Order: metapage, then LOV pages

use std::path::Path;
use std::sync::{Mutex, RwLock};

use crate::config::IndexConfig;
use crate::errors::{BitmapError, BitmapResult, ErrorContext};
use crate::lov::{lookup_for, IndexSchema, KeyLookup, LovItem, LovLocation};
use crate::observability::{BitmapMetrics, Logger, MetricsSnapshot};
use crate::page::{
    BitmapPage, FilePageStore, LovEntry, MetaPage, Page, PageId, PageLocks, PageStore,
    METAPAGE_ID,
};
use crate::recovery::{RecoveryManager, RecoveryState};
use crate::wal::{MemoryWalReader, WalPayload, WalReader, WalSink, WalWriter};

/// Runtime knobs taken from `IndexConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOptions {
    pub use_wal: bool,
    pub build_buffer_bytes: usize,
    pub batch_words: usize,
    pub batch_tids: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self::from_config(&IndexConfig::new(""))
    }
}

impl IndexOptions {
    pub fn from_config(config: &IndexConfig) -> Self {
        Self {
            use_wal: config.use_wal,
            build_buffer_bytes: config.build_buffer_bytes,
            batch_words: config.batch_words,
            batch_tids: config.batch_tids,
        }
    }
}

/// A bitmap index over a page store.
///
/// All operations take `&self`; share the handle across threads with an
/// `Arc`.
pub struct BitmapIndex<S: PageStore, W: WalSink> {
    pub(crate) store: S,
    wal: Mutex<W>,
    pub(crate) meta: Mutex<MetaPage>,
    pub(crate) lookup: RwLock<Box<dyn KeyLookup>>,
    pub(crate) locks: PageLocks,
    pub(crate) metrics: BitmapMetrics,
    schema: IndexSchema,
    options: IndexOptions,
}

impl<S: PageStore, W: WalSink> BitmapIndex<S, W> {
    /// Initialises an empty store with a metapage for `schema`.
    pub fn create(store: S, wal: W, schema: IndexSchema, options: IndexOptions) -> BitmapResult<Self> {
        if store.page_count() != 0 {
            return Err(BitmapError::invalid_argument(
                format!("store already holds {} pages", store.page_count()),
                ErrorContext::none(),
            ));
        }
        let meta = MetaPage::new(schema.clone());
        let index = Self {
            store,
            wal: Mutex::new(wal),
            meta: Mutex::new(meta.clone()),
            lookup: RwLock::new(lookup_for(&schema)),
            locks: PageLocks::new(),
            metrics: BitmapMetrics::new(),
            schema,
            options,
        };

        let id = index.allocate_page()?;
        if id != METAPAGE_ID {
            return Err(BitmapError::format(
                format!("metapage allocated as page {}", id),
                ErrorContext::page(id),
            ));
        }
        index.log(WalPayload::MetapageUpdate(meta.clone()))?;
        index.store.write(METAPAGE_ID, &Page::Meta(meta))?;
        Ok(index)
    }

    /// Opens an existing index and rebuilds its key lookup from the LOV chain.
    pub fn open(store: S, wal: W, options: IndexOptions) -> BitmapResult<Self> {
        if store.page_count() == 0 {
            return Err(BitmapError::invalid_argument(
                "store holds no index",
                ErrorContext::none(),
            ));
        }
        let meta = store.read_meta(METAPAGE_ID)?;
        let schema = meta.schema.clone();
        let mut lookup = lookup_for(&schema);
        for (location, entry) in read_entries(&store, &meta)? {
            lookup.insert(entry.key, location)?;
        }
        Logger::trace(
            "BITMAP_INDEX_OPENED",
            &[
                ("lookup", lookup.name()),
                ("lov_entries", &lookup.len().to_string()),
            ],
        );

        Ok(Self {
            store,
            wal: Mutex::new(wal),
            meta: Mutex::new(meta),
            lookup: RwLock::new(lookup),
            locks: PageLocks::new(),
            metrics: BitmapMetrics::new(),
            schema,
            options,
        })
    }

    /// Gives back the store and WAL sink without syncing either.
    pub fn into_parts(self) -> BitmapResult<(S, W)> {
        let wal = self
            .wal
            .into_inner()
            .map_err(|_| BitmapError::lock_poisoned("WAL"))?;
        Ok((self.store, wal))
    }

    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Name of the key lookup strategy in use
    pub fn lookup_name(&self) -> BitmapResult<&'static str> {
        Ok(self.read_lookup()?.name())
    }

    /// Number of distinct keys
    pub fn key_count(&self) -> BitmapResult<usize> {
        Ok(self.read_lookup()?.len())
    }

    /// Current metapage contents
    pub fn meta(&self) -> BitmapResult<MetaPage> {
        Ok(self.lock_meta()?.clone())
    }

    /// Every LOV entry in chain order.
    pub fn entries(&self) -> BitmapResult<Vec<(LovLocation, LovEntry)>> {
        let meta = self.meta()?;
        read_entries(&self.store, &meta)
    }

    /// Makes every page write durable and empties the WAL.
    pub fn checkpoint(&self) -> BitmapResult<()> {
        self.store.sync()?;
        self.lock_wal()?.checkpoint()
    }

    /// Content words per bitmap page
    pub fn words_per_page(&self) -> usize {
        BitmapPage::capacity(self.store.page_size())
    }

    pub(crate) fn lock_meta(&self) -> BitmapResult<std::sync::MutexGuard<'_, MetaPage>> {
        self.meta
            .lock()
            .map_err(|_| BitmapError::lock_poisoned("metapage"))
    }

    fn lock_wal(&self) -> BitmapResult<std::sync::MutexGuard<'_, W>> {
        self.wal.lock().map_err(|_| BitmapError::lock_poisoned("WAL"))
    }

    pub(crate) fn read_lookup(
        &self,
    ) -> BitmapResult<std::sync::RwLockReadGuard<'_, Box<dyn KeyLookup>>> {
        self.lookup
            .read()
            .map_err(|_| BitmapError::lock_poisoned("key lookup"))
    }

    /// Appends a record unless the index is unlogged.
    pub(crate) fn log(&self, payload: WalPayload) -> BitmapResult<()> {
        if !self.options.use_wal {
            return Ok(());
        }
        self.lock_wal()?.append(payload)?;
        self.metrics.increment_wal_records();
        Ok(())
    }

    pub(crate) fn allocate_page(&self) -> BitmapResult<PageId> {
        let id = self.store.allocate()?;
        self.metrics.increment_pages_allocated();
        Ok(id)
    }

    pub(crate) fn read_item(&self, location: LovLocation) -> BitmapResult<LovItem> {
        let lov = self.store.read_lov(location.page)?;
        Ok(lov.entry(location.offset, location.page)?.item.clone())
    }

    /// Replaces the item of the entry at `location`.
    ///
    /// The caller holds the LOV page lock.
    pub(crate) fn write_item(&self, location: LovLocation, item: &LovItem) -> BitmapResult<()> {
        let mut lov = self.store.read_lov(location.page)?;
        let slot = lov.entries.get_mut(location.offset as usize).ok_or_else(|| {
            BitmapError::format(
                format!("LOV slot {} missing", location),
                ErrorContext::page(location.page),
            )
        })?;
        slot.item = item.clone();
        self.store.write(location.page, &Page::Lov(lov))
    }
}

/// Walks the LOV chain starting at the metapage.
fn read_entries<S: PageStore + ?Sized>(
    store: &S,
    meta: &MetaPage,
) -> BitmapResult<Vec<(LovLocation, LovEntry)>> {
    let mut entries = Vec::new();
    let mut next = meta.lov_head;
    let mut hops = 0u32;
    while let Some(id) = next {
        hops += 1;
        if hops > store.page_count() {
            return Err(BitmapError::format(
                "LOV chain does not terminate",
                ErrorContext::page(id),
            ));
        }
        let lov = store.read_lov(id)?;
        for (offset, entry) in lov.entries.into_iter().enumerate() {
            entries.push((LovLocation::new(id, offset as u16), entry));
        }
        next = lov.next;
    }
    Ok(entries)
}

impl BitmapIndex<FilePageStore, WalWriter> {
    /// Creates a new index under `config.data_dir`.
    pub fn create_dir(config: &IndexConfig) -> BitmapResult<Self> {
        config.validate()?;
        let (store, wal, _) = Self::recover_dir(config)?;
        if store.page_count() != 0 {
            return Err(BitmapError::invalid_argument(
                format!("an index already exists in {}", config.data_dir),
                ErrorContext::none(),
            ));
        }
        Self::create(store, wal, config.schema()?, IndexOptions::from_config(config))
    }

    /// Opens the index under `config.data_dir`, replaying its WAL first.
    pub fn open_dir(config: &IndexConfig) -> BitmapResult<Self> {
        config.validate()?;
        let (store, wal, _) = Self::recover_dir(config)?;
        Self::open(store, wal, IndexOptions::from_config(config))
    }

    /// Replays the WAL onto the page file and empties it.
    pub fn recover_dir(
        config: &IndexConfig,
    ) -> BitmapResult<(FilePageStore, WalWriter, RecoveryState)> {
        let data_dir = config.data_path();
        let store = FilePageStore::open(data_dir, config.page_size)?;
        let wal_path = data_dir.join("wal").join("bitmap.wal");
        let manager = RecoveryManager::new(data_dir);
        let state = if wal_path.exists() {
            manager.recover(&mut WalReader::open(&wal_path)?, &store)?
        } else {
            manager.recover(&mut MemoryWalReader::new(Vec::new()), &store)?
        };
        let mut wal = WalWriter::open(data_dir)?;
        wal.checkpoint()?;
        Ok((store, wal, state))
    }

    /// Syncs, empties the WAL and leaves a clean shutdown marker.
    pub fn close(self) -> BitmapResult<()> {
        self.checkpoint()?;
        let data_dir = self.store.path().parent().and_then(Path::parent).ok_or_else(|| {
            BitmapError::config("page file has no data directory")
        })?;
        RecoveryManager::new(data_dir).mark_clean_shutdown()
    }
}
