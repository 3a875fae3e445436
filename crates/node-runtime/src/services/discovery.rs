//! Discovery against the content stores of enclosing groups.
//!
//! A "remote" query walks the parent chain of the group the service runs in
//! and republishes every matching advertisement into that group's own store.
//! The walk runs on the group's worker pool; callers poll the store.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use peer_group::{DiscoveryService, Module, ModuleError, PeerGroupApi, StartStatus, DEFAULT_LIFETIME};
use shared_types::{AdvertisementKind, ModuleClassId, ModuleImplAdvertisement};
use tracing::{debug, warn};

use super::upgrade;

#[derive(Default)]
pub struct LocalDiscoveryService {
    group: RwLock<Option<Weak<dyn PeerGroupApi>>>,
    stopped: Arc<AtomicBool>,
}

impl LocalDiscoveryService {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Copy matches from every ancestor store into `group`'s own store.
/// Returns how many advertisements were copied.
fn pull_from_ancestors(group: &dyn PeerGroupApi, kind: AdvertisementKind, attr: &str, value: &str) -> usize {
    let Some(own) = group.content_store() else {
        return 0;
    };

    let mut copied = 0;
    let mut next = group.parent();
    while let Some(ancestor) = next {
        if let Some(store) = ancestor.content_store() {
            match store.search(kind, attr, value) {
                Ok(found) => {
                    for adv in found {
                        if own.publish(adv, DEFAULT_LIFETIME).is_ok() {
                            copied += 1;
                        }
                    }
                }
                Err(e) => debug!("[Discovery] Skipping store of {}: {}", ancestor.peer_group_id(), e),
            }
        }
        next = ancestor.parent();
    }
    copied
}

impl DiscoveryService for LocalDiscoveryService {
    fn remote_query(&self, kind: AdvertisementKind, attr: &str, value: &str) -> Result<(), ModuleError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(ModuleError::Other("discovery service stopped".into()));
        }
        let group = upgrade(&self.group.read())?;
        let executor = group.executor()?;

        let stopped = Arc::clone(&self.stopped);
        let (attr, value) = (attr.to_string(), value.to_string());
        executor
            .execute(move || {
                if stopped.load(Ordering::Acquire) {
                    return;
                }
                let copied = pull_from_ancestors(group.as_ref(), kind, &attr, &value);
                debug!(
                    group = %group.peer_group_id(),
                    "[Discovery] {} {}={} matched {} advertisement(s)",
                    kind.as_str(), attr, value, copied
                );
            })
            .map_err(|e| ModuleError::Other(e.to_string()))
    }
}

impl Module for LocalDiscoveryService {
    fn init(
        &self,
        group: Arc<dyn PeerGroupApi>,
        _assigned_id: &ModuleClassId,
        _impl_adv: &ModuleImplAdvertisement,
    ) -> Result<(), ModuleError> {
        if group.content_store().is_none() {
            warn!(group = %group.peer_group_id(), "[Discovery] Group has no content store");
        }
        *self.group.write() = Some(Arc::downgrade(&group));
        Ok(())
    }

    fn start_app(&self, _args: &[String]) -> StartStatus {
        StartStatus::Ok
    }

    fn stop_app(&self) -> Result<(), ModuleError> {
        self.stopped.store(true, Ordering::Release);
        Ok(())
    }

    fn discovery(&self) -> Option<&dyn DiscoveryService> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
