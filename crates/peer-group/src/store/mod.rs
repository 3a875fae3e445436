//! # Local Content Store
//!
//! Each group keeps the advertisements it knows about (its own, the
//! implementations it loaded, subgroups it created) in a local store. The
//! loader searches it when resolving a specification id, and discovery
//! services drop remote results into it.
//!
//! Records expire; expired records are invisible to searches and purged
//! when the store is opened or its index is cleared.

mod file;
mod memory;

pub use file::FileContentStore;
pub use memory::InMemoryContentStore;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{Advertisement, AdvertisementKind};
use thiserror::Error;

/// Lifetime of a published advertisement unless the caller says otherwise.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Content store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed record: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store has been closed")]
    Closed,

    #[error("store at {0} is locked by another owner")]
    Locked(PathBuf),
}

/// Storage of advertisements, searchable by indexed attribute.
pub trait ContentStore: Send + Sync {
    /// Insert or replace `adv`, visible for `lifetime`.
    fn publish(&self, adv: Advertisement, lifetime: Duration) -> Result<(), StoreError>;

    /// Live advertisements of `kind` whose attribute `attr` equals `value`.
    fn search(
        &self,
        kind: AdvertisementKind,
        attr: &str,
        value: &str,
    ) -> Result<Vec<Advertisement>, StoreError>;

    /// Every live advertisement of `kind`.
    fn list(&self, kind: AdvertisementKind) -> Result<Vec<Advertisement>, StoreError>;

    /// Remove a record. Returns whether it existed.
    fn remove(&self, kind: AdvertisementKind, key: &str) -> Result<bool, StoreError>;

    /// Drop expired records and rebuild the attribute index.
    fn clear_index(&self) -> Result<(), StoreError>;

    /// Release the store. Further calls fail with [`StoreError::Closed`].
    fn close(&self) -> Result<(), StoreError>;
}

/// A published advertisement and its expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub advertisement: Advertisement,
    pub expires_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn new(advertisement: Advertisement, lifetime: Duration) -> Self {
        let now = Utc::now();
        let expires_at = chrono::Duration::from_std(lifetime)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            advertisement,
            expires_at,
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

type RecordKey = (AdvertisementKind, String);
type AttrKey = (AdvertisementKind, String, String);

/// Records plus the attribute index shared by both store flavours.
#[derive(Default)]
pub(crate) struct RecordIndex {
    records: BTreeMap<RecordKey, StoredRecord>,
    attrs: HashMap<AttrKey, BTreeSet<String>>,
}

impl RecordIndex {
    pub(crate) fn insert(&mut self, record: StoredRecord) {
        let kind = record.advertisement.kind();
        let key = record.advertisement.key();
        self.remove(kind, &key);

        for (attr, value) in record.advertisement.attributes() {
            self.attrs
                .entry((kind, attr.to_string(), value))
                .or_default()
                .insert(key.clone());
        }
        self.records.insert((kind, key), record);
    }

    pub(crate) fn remove(&mut self, kind: AdvertisementKind, key: &str) -> Option<StoredRecord> {
        let record = self.records.remove(&(kind, key.to_string()))?;
        for (attr, value) in record.advertisement.attributes() {
            let attr_key = (kind, attr.to_string(), value);
            if let Some(keys) = self.attrs.get_mut(&attr_key) {
                keys.remove(key);
                if keys.is_empty() {
                    self.attrs.remove(&attr_key);
                }
            }
        }
        Some(record)
    }

    pub(crate) fn search(
        &self,
        kind: AdvertisementKind,
        attr: &str,
        value: &str,
        now: DateTime<Utc>,
    ) -> Vec<Advertisement> {
        let Some(keys) = self.attrs.get(&(kind, attr.to_string(), value.to_string())) else {
            return Vec::new();
        };

        keys.iter()
            .filter_map(|key| self.records.get(&(kind, key.clone())))
            .filter(|record| record.is_live(now))
            .map(|record| record.advertisement.clone())
            .collect()
    }

    pub(crate) fn list(&self, kind: AdvertisementKind, now: DateTime<Utc>) -> Vec<Advertisement> {
        self.records
            .iter()
            .filter(|((k, _), record)| *k == kind && record.is_live(now))
            .map(|(_, record)| record.advertisement.clone())
            .collect()
    }

    /// Remove expired records, returning their keys.
    pub(crate) fn purge_expired(&mut self, now: DateTime<Utc>) -> Vec<RecordKey> {
        let expired: Vec<RecordKey> = self
            .records
            .iter()
            .filter(|(_, record)| !record.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        for (kind, key) in &expired {
            self.remove(*kind, key);
        }
        expired
    }

    pub(crate) fn rebuild_attrs(&mut self) {
        let records = std::mem::take(&mut self.records);
        self.attrs.clear();
        for record in records.into_values() {
            self.insert(record);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}
