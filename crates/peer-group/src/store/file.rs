//! # File-backed Content Store
//!
//! Layout, one directory per group:
//!
//! ```text
//! <root>/<group-unique-id>/
//!     .lock
//!     module-impl/<record>.json
//!     peer-group/<record>.json
//! ```
//!
//! Record file names are a name-based UUID of the advertisement key. The
//! attribute index lives in memory only and is rebuilt from the record
//! files when the store is opened.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use shared_types::{Advertisement, AdvertisementKind, PeerGroupId};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ContentStore, RecordIndex, StoreError, StoredRecord};

const LOCK_FILE: &str = ".lock";
const RECORD_EXT: &str = "json";

/// Content store persisted under a per-group directory.
pub struct FileContentStore {
    dir: PathBuf,
    index: RwLock<RecordIndex>,
    lock: Mutex<Option<File>>,
    closed: AtomicBool,
}

impl FileContentStore {
    /// Open (creating if needed) the store of group `gid` under `root`.
    ///
    /// Fails with [`StoreError::Locked`] if another owner holds the store.
    pub fn open(root: &Path, gid: &PeerGroupId) -> Result<Self, StoreError> {
        let dir = root.join(gid.unique_value());
        fs::create_dir_all(&dir)?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(LOCK_FILE))?;
        lock.try_lock_exclusive()
            .map_err(|_| StoreError::Locked(dir.clone()))?;

        let store = Self {
            dir,
            index: RwLock::new(RecordIndex::default()),
            lock: Mutex::new(Some(lock)),
            closed: AtomicBool::new(false),
        };
        store.reload()?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn kind_dir(&self, kind: AdvertisementKind) -> PathBuf {
        self.dir.join(kind.as_str())
    }

    fn record_path(&self, kind: AdvertisementKind, key: &str) -> PathBuf {
        let name = Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).simple();
        self.kind_dir(kind).join(format!("{name}.{RECORD_EXT}"))
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Rebuild the in-memory index from disk, deleting expired and unreadable records.
    fn reload(&self) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut index = RecordIndex::default();
        let mut purged = 0usize;

        for kind in AdvertisementKind::ALL {
            let dir = self.kind_dir(kind);
            if !dir.exists() {
                continue;
            }
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                    continue;
                }
                match read_record(&path) {
                    Ok(record) if record.is_live(now) => index.insert(record),
                    Ok(_) => {
                        fs::remove_file(&path)?;
                        purged += 1;
                    }
                    Err(e) => {
                        warn!("[Store] Discarding unreadable record {}: {}", path.display(), e);
                        fs::remove_file(&path)?;
                        purged += 1;
                    }
                }
            }
        }

        debug!(
            "[Store] Loaded {} record(s) from {} ({} purged)",
            index.len(),
            self.dir.display(),
            purged
        );
        *self.index.write() = index;
        Ok(())
    }
}

fn read_record(path: &Path) -> Result<StoredRecord, StoreError> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

impl ContentStore for FileContentStore {
    fn publish(&self, adv: Advertisement, lifetime: Duration) -> Result<(), StoreError> {
        self.ensure_open()?;
        let kind = adv.kind();
        let path = self.record_path(kind, &adv.key());
        let record = StoredRecord::new(adv, lifetime);

        let dir = self.kind_dir(kind);
        fs::create_dir_all(&dir)?;
        // Unique temp file per publish; concurrent writers of one key race on the rename only.
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&serde_json::to_vec_pretty(&record)?)?;
        tmp.persist(&path).map_err(|e| e.error)?;

        self.index.write().insert(record);
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
        let existed = self.index.write().remove(kind, key).is_some();
        let path = self.record_path(kind, key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(existed)
    }

    fn clear_index(&self) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.reload()
    }

    fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(lock) = self.lock.lock().take() {
            FileExt::unlock(&lock)?;
        }
        debug!("[Store] Closed {}", self.dir.display());
        Ok(())
    }
}
