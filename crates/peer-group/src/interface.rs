//! # Interface Handles
//!
//! External code never holds a group directly. It holds either:
//!
//! - a [`GroupInterface`]: counted. The group's reference count goes up
//!   when the handle is created and down exactly once when it is released,
//!   explicitly through `unref` or implicitly on drop. Releasing the last
//!   handle of a fully constructed group stops it.
//! - a [`WeakGroupInterface`]: forwards calls but never touches the count.
//!
//! Applications receive a counted handle in `init` that is marked as held by
//! the group's own module. It is counted like any other, but only the
//! remaining external handles decide when the group stops, so an
//! application keeping its handle cannot pin the group.
//!
//! A counted handle may carry a [`RoleMap`] that redirects service lookups
//! to substitute role ids.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use shared_types::{
    ConfigParams, ModuleClassId, ModuleImplAdvertisement, ModuleSpecId, PeerGroupAdvertisement,
    PeerGroupId, PeerId,
};

use crate::api::{PeerGroupApi, Scope};
use crate::error::{PeerGroupError, Result};
use crate::group::StdPeerGroup;
use crate::group_core::{Phase, RefHolder};
use crate::module::Module;
use crate::pool::{ScheduledPool, WorkerPool};
use crate::store::ContentStore;

/// Per-handle remapping of requested role ids to ordered substitutes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleMap {
    roles: HashMap<ModuleClassId, Vec<ModuleClassId>>,
}

impl RoleMap {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, requested: ModuleClassId, substitutes: Vec<ModuleClassId>) -> Self {
        self.roles.insert(requested, substitutes);
        self
    }

    pub fn substitutes(&self, requested: &ModuleClassId) -> Option<&[ModuleClassId]> {
        self.roles.get(requested).map(Vec::as_slice)
    }

    /// The id actually looked up for (`requested`, `role_index`).
    pub fn resolve(&self, requested: &ModuleClassId, role_index: usize) -> Result<ModuleClassId> {
        match self.roles.get(requested) {
            Some(substitutes) => substitutes
                .get(role_index)
                .copied()
                .ok_or(PeerGroupError::ServiceNotFound(*requested)),
            None if role_index == 0 => Ok(*requested),
            None => Err(PeerGroupError::ServiceNotFound(*requested)),
        }
    }
}

fn resolve_role(
    role_map: Option<&RoleMap>,
    requested: &ModuleClassId,
    role_index: usize,
) -> Result<ModuleClassId> {
    match role_map {
        Some(map) => map.resolve(requested, role_index),
        None if role_index == 0 => Ok(*requested),
        None => Err(PeerGroupError::ServiceNotFound(*requested)),
    }
}

/// Implements the forwarding part of [`PeerGroupApi`] for a handle type
/// with a `group: Arc<StdPeerGroup>` field.
macro_rules! forward_to_group {
    () => {
        fn peer_group_id(&self) -> PeerGroupId {
            self.group.peer_group_id()
        }

        fn peer_group_name(&self) -> String {
            self.group.peer_group_name()
        }

        fn peer_id(&self) -> PeerId {
            self.group.peer_id()
        }

        fn peer_name(&self) -> String {
            self.group.peer_name()
        }

        fn peer_group_advertisement(&self) -> PeerGroupAdvertisement {
            self.group.peer_group_advertisement()
        }

        fn impl_advertisement(&self) -> ModuleImplAdvertisement {
            self.group.impl_advertisement()
        }

        fn config(&self) -> ConfigParams {
            self.group.config()
        }

        fn parent(&self) -> Option<WeakGroupInterface> {
            self.group.parent()
        }

        fn load_module(
            &self,
            assigned_id: &ModuleClassId,
            impl_adv: &ModuleImplAdvertisement,
        ) -> Result<Arc<dyn Module>> {
            self.group.load_module(assigned_id, impl_adv)
        }

        fn load_module_by_spec(
            &self,
            assigned_id: &ModuleClassId,
            spec_id: &ModuleSpecId,
            scope: Scope,
        ) -> Result<Arc<dyn Module>> {
            self.group.load_module_by_spec(assigned_id, spec_id, scope)
        }

        fn executor(&self) -> Result<Arc<WorkerPool>> {
            self.group.executor()
        }

        fn scheduled_executor(&self) -> Result<Arc<ScheduledPool>> {
            self.group.scheduled_executor()
        }

        fn content_store(&self) -> Option<Arc<dyn ContentStore>> {
            self.group.content_store()
        }

        fn publish_group(&self, name: &str, description: &str) -> Result<()> {
            self.group.publish_group(name, description)
        }

        fn new_group(&self, gid: &PeerGroupId) -> Result<GroupInterface> {
            self.group.new_group(gid)
        }

        fn new_group_from_advertisement(
            &self,
            adv: &PeerGroupAdvertisement,
        ) -> Result<GroupInterface> {
            self.group.new_group_from_advertisement(adv)
        }

        fn new_group_with_impl(
            &self,
            gid: Option<PeerGroupId>,
            impl_adv: &ModuleImplAdvertisement,
            name: &str,
            description: &str,
        ) -> Result<GroupInterface> {
            self.group.new_group_with_impl(gid, impl_adv, name, description)
        }

        fn get_interface(&self) -> Result<GroupInterface> {
            self.group.get_interface()
        }

        fn get_weak_interface(&self) -> Result<WeakGroupInterface> {
            Ok(WeakGroupInterface::new(Arc::clone(&self.group)))
        }
    };
}

// =============================================================================
// COUNTED HANDLE
// =============================================================================

/// Counted handle to a group.
pub struct GroupInterface {
    group: Arc<StdPeerGroup>,
    role_map: Option<Arc<RoleMap>>,
    holder: RefHolder,
    released: AtomicBool,
}

impl GroupInterface {
    /// Wrap a reference the caller has already acquired.
    pub(crate) fn new(group: Arc<StdPeerGroup>, role_map: Option<Arc<RoleMap>>) -> Self {
        Self::held_by(group, role_map, RefHolder::External)
    }

    /// Wrap a reference acquired for a module of the group itself.
    pub(crate) fn for_module(group: Arc<StdPeerGroup>) -> Self {
        Self::held_by(group, None, RefHolder::Module)
    }

    fn held_by(group: Arc<StdPeerGroup>, role_map: Option<Arc<RoleMap>>, holder: RefHolder) -> Self {
        Self {
            group,
            role_map,
            holder,
            released: AtomicBool::new(false),
        }
    }

    pub(crate) fn group(&self) -> &Arc<StdPeerGroup> {
        &self.group
    }

    /// Whether both handles point at the same group instance.
    pub fn same_group(&self, other: &GroupInterface) -> bool {
        Arc::ptr_eq(&self.group, &other.group)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Whether the group has finished construction and is not stopping.
    pub fn is_running(&self) -> bool {
        self.group.is_running()
    }

    /// Services and transports currently running, by role.
    pub fn running_modules(&self) -> Vec<ModuleClassId> {
        self.group.running_modules()
    }

    /// Roles in the order their modules completed startup.
    pub fn start_order(&self) -> Vec<ModuleClassId> {
        self.group.start_order()
    }

    pub fn phase(&self) -> Phase {
        self.group.phase()
    }

    /// Whether this handle was given to one of the group's own modules.
    /// Such handles never keep the group running.
    pub fn is_module_handle(&self) -> bool {
        self.holder == RefHolder::Module
    }

    /// Counted references currently held on the group, module handles included.
    pub fn reference_count(&self) -> usize {
        self.group.core().ref_count()
    }

    /// A further counted handle whose service lookups go through `role_map`.
    pub fn with_role_map(&self, role_map: RoleMap) -> Result<GroupInterface> {
        self.group.get_interface_with_roles(role_map)
    }

    /// Stop the group now, regardless of other outstanding handles.
    pub fn stop_group(&self) {
        self.group.stop_app();
    }
}

impl PeerGroupApi for GroupInterface {
    forward_to_group!();

    fn lookup_service_role(
        &self,
        class_id: &ModuleClassId,
        role_index: usize,
    ) -> Result<Arc<dyn Module>> {
        let target = resolve_role(self.role_map.as_deref(), class_id, role_index)?;
        self.group.lookup_service(&target)
    }

    fn role_map(&self) -> Option<Arc<RoleMap>> {
        self.role_map.clone()
    }

    /// Release this handle's reference. Only the first call has an effect.
    fn unref(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        if self.group.core().release_as(self.holder) {
            self.group.stop_app();
        }
        true
    }
}

impl Drop for GroupInterface {
    fn drop(&mut self) {
        self.unref();
    }
}

impl fmt::Debug for GroupInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupInterface")
            .field("group", &self.group.peer_group_id())
            .field("released", &self.is_released())
            .finish()
    }
}

// =============================================================================
// WEAK HANDLE
// =============================================================================

/// Handle that forwards to a group without counting as a reference.
#[derive(Clone)]
pub struct WeakGroupInterface {
    group: Arc<StdPeerGroup>,
}

impl WeakGroupInterface {
    pub(crate) fn new(group: Arc<StdPeerGroup>) -> Self {
        Self { group }
    }

    pub(crate) fn group(&self) -> &Arc<StdPeerGroup> {
        &self.group
    }

    pub fn is_running(&self) -> bool {
        self.group.is_running()
    }
}

impl PeerGroupApi for WeakGroupInterface {
    forward_to_group!();

    fn lookup_service_role(
        &self,
        class_id: &ModuleClassId,
        role_index: usize,
    ) -> Result<Arc<dyn Module>> {
        let target = resolve_role(None, class_id, role_index)?;
        self.group.lookup_service(&target)
    }

    fn role_map(&self) -> Option<Arc<RoleMap>> {
        None
    }

    /// Weak handles hold no reference.
    fn unref(&self) -> bool {
        false
    }
}

impl fmt::Debug for WeakGroupInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakGroupInterface")
            .field("group", &self.group.peer_group_id())
            .finish()
    }
}
