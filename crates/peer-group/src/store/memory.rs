//! Volatile content store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use shared_types::{Advertisement, AdvertisementKind};

use super::{ContentStore, RecordIndex, StoreError, StoredRecord};

/// A content store that lives and dies with its group.
#[derive(Default)]
pub struct InMemoryContentStore {
    index: RwLock<RecordIndex>,
    closed: AtomicBool,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl ContentStore for InMemoryContentStore {
    fn publish(&self, adv: Advertisement, lifetime: Duration) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.index.write().insert(StoredRecord::new(adv, lifetime));
        Ok(())
    }

    fn search(
        &self,
        kind: AdvertisementKind,
        attr: &str,
        value: &str,
    ) -> Result<Vec<Advertisement>, StoreError> {
        self.ensure_open()?;
        Ok(self.index.read().search(kind, attr, value, Utc::now()))
    }

    fn list(&self, kind: AdvertisementKind) -> Result<Vec<Advertisement>, StoreError> {
        self.ensure_open()?;
        Ok(self.index.read().list(kind, Utc::now()))
    }

    fn remove(&self, kind: AdvertisementKind, key: &str) -> Result<bool, StoreError> {
        self.ensure_open()?;
        Ok(self.index.write().remove(kind, key).is_some())
    }

    fn clear_index(&self) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut index = self.index.write();
        index.purge_expired(Utc::now());
        index.rebuild_attrs();
        Ok(())
    }

    fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
