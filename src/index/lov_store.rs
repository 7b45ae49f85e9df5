//! LOV entry lookup and creation
//!
//! A miss in the key lookup is the normal signal to create an entry.
//! Creation holds the metapage lock and re-checks the lookup, so
//! concurrent inserters of a new key agree on one entry.

use crate::errors::{BitmapError, BitmapResult, ErrorContext};
use crate::lov::{LovItem, LovKey, LovLocation, ScanPredicate};
use crate::observability::Logger;
use crate::page::{LovEntry, LovPage, MetaPage, Page, PageId, PageStore, METAPAGE_ID};
use crate::wal::{LovItemUpdate, WalPayload, WalSink};

use super::handle::BitmapIndex;

impl<S: PageStore, W: WalSink> BitmapIndex<S, W> {
    /// Location of the entry for `key`, if any.
    pub fn find_entry(&self, key: &LovKey) -> BitmapResult<Option<LovLocation>> {
        Ok(self.read_lookup()?.find(key))
    }

    /// Entries whose keys satisfy `predicate`, in LOV location order.
    pub fn matching_entries(&self, predicate: &ScanPredicate) -> BitmapResult<Vec<LovLocation>> {
        predicate.check(self.schema())?;
        Ok(self.read_lookup()?.matching(predicate))
    }

    /// Finds the entry for `key`, creating an empty one on a miss.
    pub fn lookup_or_create(&self, key: &LovKey) -> BitmapResult<LovLocation> {
        self.schema().check_key(key)?;
        if let Some(location) = self.find_entry(key)? {
            return Ok(location);
        }

        let mut meta = self.lock_meta()?;
        if let Some(location) = self.find_entry(key)? {
            return Ok(location);
        }

        let entry = LovEntry::new(key.clone(), LovItem::new());
        let page_size = self.store.page_size();
        if !LovPage::new().has_room_for(&entry, page_size) {
            return Err(BitmapError::invalid_argument(
                format!("key of {} bytes does not fit a LOV page", entry.encoded_len()),
                ErrorContext::none().with_key(key.to_string()),
            ));
        }

        let location = match meta.lov_tail {
            Some(tail) => self
                .locks
                .with_exclusive(tail, || self.append_entry(&mut meta, tail, &entry))?,
            None => self.append_on_new_page(&mut meta, None, &entry)?,
        };

        self.lookup
            .write()
            .map_err(|_| BitmapError::lock_poisoned("key lookup"))?
            .insert(key.clone(), location)?;
        self.metrics.increment_lov_entries();
        Logger::trace(
            "BITMAP_LOV_ENTRY_CREATED",
            &[("key", &key.to_string()), ("location", &location.to_string())],
        );
        Ok(location)
    }

    fn append_entry(
        &self,
        meta: &mut MetaPage,
        tail: PageId,
        entry: &LovEntry,
    ) -> BitmapResult<LovLocation> {
        let mut lov = self.store.read_lov(tail)?;
        if !lov.has_room_for(entry, self.store.page_size()) {
            return self.append_on_new_page(meta, Some((tail, lov)), entry);
        }

        let location = LovLocation::new(tail, lov.entries.len() as u16);
        let mut new_meta = meta.clone();
        new_meta.lov_entries += 1;
        self.log(WalPayload::LovItemUpdate(LovItemUpdate {
            location,
            entry: entry.clone(),
            new_lov_page: false,
            prev_lov_page: None,
            meta: Some(new_meta.clone()),
        }))?;

        lov.entries.push(entry.clone());
        self.store.write(tail, &Page::Lov(lov))?;
        self.store.write(METAPAGE_ID, &Page::Meta(new_meta.clone()))?;
        *meta = new_meta;
        Ok(location)
    }

    /// Starts a LOV page holding `entry` and links it after `prev`.
    ///
    /// The new page is unreachable until the metapage and `prev` point at
    /// it, so it needs no lock of its own.
    fn append_on_new_page(
        &self,
        meta: &mut MetaPage,
        prev: Option<(PageId, LovPage)>,
        entry: &LovEntry,
    ) -> BitmapResult<LovLocation> {
        let id = self.allocate_page()?;
        let location = LovLocation::new(id, 0);
        let mut new_meta = meta.clone();
        new_meta.lov_entries += 1;
        new_meta.lov_tail = Some(id);
        if new_meta.lov_head.is_none() {
            new_meta.lov_head = Some(id);
        }
        self.log(WalPayload::LovItemUpdate(LovItemUpdate {
            location,
            entry: entry.clone(),
            new_lov_page: true,
            prev_lov_page: prev.as_ref().map(|(prev_id, _)| *prev_id),
            meta: Some(new_meta.clone()),
        }))?;

        let mut lov = LovPage::new();
        lov.entries.push(entry.clone());
        self.store.write(id, &Page::Lov(lov))?;
        if let Some((prev_id, mut prev_page)) = prev {
            prev_page.next = Some(id);
            self.store.write(prev_id, &Page::Lov(prev_page))?;
        }
        self.store.write(METAPAGE_ID, &Page::Meta(new_meta.clone()))?;
        *meta = new_meta;
        Ok(location)
    }

    /// Raises the metapage's TID high-water mark.
    pub(crate) fn note_max_tid(&self, tid: u64) -> BitmapResult<()> {
        let mut meta = self.lock_meta()?;
        if tid <= meta.max_tid {
            return Ok(());
        }
        let mut new_meta = meta.clone();
        new_meta.max_tid = tid;
        self.log(WalPayload::MetapageUpdate(new_meta.clone()))?;
        self.store.write(METAPAGE_ID, &Page::Meta(new_meta.clone()))?;
        *meta = new_meta;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::index::{BitmapIndex, IndexOptions};
    use crate::lov::{AttributeType, IndexSchema, LovKey, ScanPredicate};
    use crate::page::{MemoryPageStore, PageStore};
    use crate::wal::MemoryWal;

    fn index(page_size: usize) -> BitmapIndex<MemoryPageStore, MemoryWal> {
        let schema = IndexSchema::new(vec![AttributeType::Text]).unwrap();
        BitmapIndex::create(
            MemoryPageStore::new(page_size),
            MemoryWal::new(),
            schema,
            IndexOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_create_then_find() {
        let index = index(512);
        let a = index.lookup_or_create(&LovKey::text("A")).unwrap();
        assert_eq!(index.lookup_or_create(&LovKey::text("A")).unwrap(), a);
        assert_eq!(index.find_entry(&LovKey::text("A")).unwrap(), Some(a));
        assert_eq!(index.find_entry(&LovKey::text("B")).unwrap(), None);
        assert_eq!(index.meta().unwrap().lov_entries, 1);
    }

    #[test]
    fn test_entries_spill_to_new_lov_pages() {
        let index = index(256);
        for n in 0..20 {
            index.lookup_or_create(&LovKey::text(&format!("key-{}", n))).unwrap();
        }
        let meta = index.meta().unwrap();
        assert_eq!(meta.lov_entries, 20);
        assert_ne!(meta.lov_head, meta.lov_tail);
        let entries = index.entries().unwrap();
        assert_eq!(entries.len(), 20);
        assert_eq!(entries[0].1.key, LovKey::text("key-0"));
        assert_eq!(entries[19].1.key, LovKey::text("key-19"));
    }

    #[test]
    fn test_wrong_key_type_rejected() {
        let index = index(512);
        let err = index.lookup_or_create(&LovKey::int(1)).unwrap_err();
        assert_eq!(err.code(), "AERO_BITMAP_INVALID_ARGUMENT");
    }

    #[test]
    fn test_oversized_key_rejected() {
        let index = index(256);
        let key = LovKey::text(&"x".repeat(400));
        assert!(index.lookup_or_create(&key).is_err());
        assert_eq!(index.store().page_count(), 1);
    }

    #[test]
    fn test_matching_entries_in_location_order() {
        let index = index(512);
        let b = index.lookup_or_create(&LovKey::text("B")).unwrap();
        let a = index.lookup_or_create(&LovKey::text("A")).unwrap();
        let found = index
            .matching_entries(&ScanPredicate::In(vec![LovKey::text("A"), LovKey::text("B")]))
            .unwrap();
        assert_eq!(found, vec![b, a]);
    }
}
