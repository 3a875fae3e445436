//! # Group Registry
//!
//! Process-wide index of live groups by id, plus the root group slot.
//!
//! The registry holds groups weakly: registration never keeps a group
//! alive, and a group that was dropped without unregistering is treated as
//! absent. A process normally uses [`GroupRegistry::global`]; tests build
//! private registries to stay independent of each other.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use group_telemetry::metrics;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use shared_types::{ModuleImplAdvertisement, PeerGroupId};
use tracing::{debug, info, warn};

use crate::api::PeerGroupApi;
use crate::error::{PeerGroupError, Result};
use crate::factory::ModuleFactories;
use crate::group::StdPeerGroup;
use crate::interface::GroupInterface;

lazy_static! {
    static ref GLOBAL: Arc<GroupRegistry> = Arc::new(GroupRegistry::new(Arc::new(ModuleFactories::new())));
}

#[derive(Default)]
struct RegistryState {
    /// Live groups with their registration sequence number.
    groups: HashMap<PeerGroupId, (Weak<StdPeerGroup>, u64)>,
    next_seq: u64,
    root_claimed: bool,
    root: Option<Weak<StdPeerGroup>>,
}

impl RegistryState {
    fn live_count(&self) -> usize {
        self.groups
            .values()
            .filter(|(group, _)| group.strong_count() > 0)
            .count()
    }
}

/// Registry of running groups and the module factories they load from.
pub struct GroupRegistry {
    factories: Arc<ModuleFactories>,
    state: Mutex<RegistryState>,
}

impl GroupRegistry {
    /// A registry whose groups resolve modules through `factories`.
    ///
    /// The standard group implementation is always known to it.
    pub fn new(factories: Arc<ModuleFactories>) -> Self {
        factories.register_advertisement(ModuleImplAdvertisement::std_group());
        Self {
            factories,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// The registry shared by everything in this process.
    pub fn global() -> Arc<GroupRegistry> {
        Arc::clone(&GLOBAL)
    }

    pub fn factories(&self) -> &Arc<ModuleFactories> {
        &self.factories
    }

    /// Record `group` as the live instance of `gid`.
    pub(crate) fn register(&self, gid: PeerGroupId, group: &Arc<StdPeerGroup>) -> Result<()> {
        let mut state = self.state.lock();
        if let Some((existing, _)) = state.groups.get(&gid) {
            if existing.strong_count() > 0 {
                return Err(PeerGroupError::DuplicateRegistration(gid));
            }
            warn!("[Registry] Replacing stale registration of {}", gid);
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.groups.insert(gid, (Arc::downgrade(group), seq));
        metrics::group_registered(state.live_count());
        debug!("[Registry] ✓ Registered {}", gid);
        Ok(())
    }

    /// Remove `gid` if it is still registered to `group`.
    pub(crate) fn unregister(&self, gid: PeerGroupId, group: &Weak<StdPeerGroup>) -> bool {
        let mut state = self.state.lock();
        let owned = matches!(
            state.groups.get(&gid),
            Some((registered, _)) if Weak::ptr_eq(registered, group)
        );
        if owned {
            state.groups.remove(&gid);
            metrics::group_registered(state.live_count());
            debug!("[Registry] Unregistered {}", gid);
        }
        owned
    }

    /// The live group registered as `gid`.
    pub(crate) fn lookup_group(&self, gid: &PeerGroupId) -> Option<Arc<StdPeerGroup>> {
        self.state
            .lock()
            .groups
            .get(gid)
            .and_then(|(group, _)| group.upgrade())
    }

    pub fn contains(&self, gid: &PeerGroupId) -> bool {
        self.lookup_group(gid).is_some()
    }

    /// A counted handle to the live group `gid`.
    pub fn lookup(&self, gid: &PeerGroupId) -> Option<GroupInterface> {
        self.lookup_group(gid).and_then(|group| group.get_interface().ok())
    }

    /// Ids of every live group, oldest registration first.
    pub fn live_groups(&self) -> Vec<PeerGroupId> {
        let state = self.state.lock();
        let mut live: Vec<_> = state
            .groups
            .iter()
            .filter(|(_, (group, _))| group.strong_count() > 0)
            .map(|(gid, (_, seq))| (*seq, *gid))
            .collect();
        live.sort_unstable_by_key(|(seq, _)| *seq);
        live.into_iter().map(|(_, gid)| gid).collect()
    }

    /// Reserve the root slot. At most one root exists per registry.
    pub(crate) fn claim_root(&self) -> Result<()> {
        let mut state = self.state.lock();
        let live_root = state
            .root
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|root| !root.is_stopped());
        if state.root_claimed || live_root {
            return Err(PeerGroupError::RootAlreadyExists);
        }
        state.root_claimed = true;
        state.root = None;
        Ok(())
    }

    /// Give up a claim made by [`claim_root`](Self::claim_root).
    pub(crate) fn release_root(&self) {
        let mut state = self.state.lock();
        state.root_claimed = false;
        state.root = None;
    }

    /// Fill the claimed root slot with a constructed group.
    pub(crate) fn set_root(&self, group: &Arc<StdPeerGroup>) {
        let mut state = self.state.lock();
        state.root_claimed = false;
        state.root = Some(Arc::downgrade(group));
    }

    /// A counted handle to the root group, if one is running.
    pub fn root(&self) -> Option<GroupInterface> {
        let root = self.state.lock().root.as_ref().and_then(Weak::upgrade)?;
        root.get_interface().ok()
    }

    /// Stop every live group, newest first. Safe to call more than once.
    pub fn shutdown(&self) {
        let groups: Vec<Arc<StdPeerGroup>> = {
            let state = self.state.lock();
            let mut live: Vec<_> = state
                .groups
                .values()
                .filter_map(|(group, seq)| group.upgrade().map(|g| (*seq, g)))
                .collect();
            live.sort_unstable_by_key(|(seq, _)| std::cmp::Reverse(*seq));
            live.into_iter().map(|(_, group)| group).collect()
        };

        if groups.is_empty() {
            return;
        }
        info!("[Registry] Shutting down {} group(s)", groups.len());
        for group in groups {
            group.stop_app();
        }
        self.release_root();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_knows_std_group() {
        let registry = GroupRegistry::new(Arc::new(ModuleFactories::new()));
        let impls = registry
            .factories()
            .impls_for_spec(&shared_types::well_known::STD_PEER_GROUP_SPEC);
        assert_eq!(impls, vec![ModuleImplAdvertisement::std_group()]);
    }

    #[test]
    fn test_root_claim_is_exclusive() {
        let registry = GroupRegistry::new(Arc::new(ModuleFactories::new()));
        registry.claim_root().unwrap();
        assert!(matches!(registry.claim_root(), Err(PeerGroupError::RootAlreadyExists)));
        registry.release_root();
        registry.claim_root().unwrap();
    }

    #[test]
    fn test_empty_registry_shutdown_is_noop() {
        let registry = GroupRegistry::new(Arc::new(ModuleFactories::new()));
        registry.shutdown();
        registry.shutdown();
        assert!(registry.live_groups().is_empty());
        assert!(registry.root().is_none());
    }
}
