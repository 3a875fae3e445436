//! # Group API
//!
//! The operations a group offers to the modules it loads and to external
//! callers. Privileged modules receive the group itself; everything else
//! goes through an [`GroupInterface`](crate::GroupInterface) or
//! [`WeakGroupInterface`](crate::WeakGroupInterface).

use std::sync::Arc;

use shared_types::{
    ConfigParams, ModuleClassId, ModuleImplAdvertisement, ModuleSpecId, PeerGroupAdvertisement,
    PeerGroupId, PeerId,
};

use crate::error::Result;
use crate::interface::{GroupInterface, RoleMap, WeakGroupInterface};
use crate::module::Module;
use crate::pool::{ScheduledPool, WorkerPool};
use crate::store::ContentStore;

/// Where the loader looks for implementations of a specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// This group's own store and discovery service.
    Here,
    /// The parent group's store and discovery service. A group without a
    /// parent falls back to [`Scope::Here`].
    FromParent,
    Both,
}

/// Everything a module or external caller can ask of a group.
pub trait PeerGroupApi: Send + Sync {
    fn peer_group_id(&self) -> PeerGroupId;

    fn peer_group_name(&self) -> String;

    /// This peer's identity within the group.
    fn peer_id(&self) -> PeerId;

    fn peer_name(&self) -> String;

    fn peer_group_advertisement(&self) -> PeerGroupAdvertisement;

    /// The implementation advertisement the group was built from.
    fn impl_advertisement(&self) -> ModuleImplAdvertisement;

    /// The group's effective configuration.
    fn config(&self) -> ConfigParams;

    fn parent(&self) -> Option<WeakGroupInterface>;

    /// The running service registered under `class_id`.
    fn lookup_service(&self, class_id: &ModuleClassId) -> Result<Arc<dyn Module>> {
        self.lookup_service_role(class_id, 0)
    }

    /// The `role_index`-th substitute for `class_id` under this handle's role map.
    fn lookup_service_role(&self, class_id: &ModuleClassId, role_index: usize)
        -> Result<Arc<dyn Module>>;

    fn role_map(&self) -> Option<Arc<RoleMap>>;

    /// Load and initialize an implementation. The caller starts it.
    fn load_module(
        &self,
        assigned_id: &ModuleClassId,
        impl_adv: &ModuleImplAdvertisement,
    ) -> Result<Arc<dyn Module>>;

    /// Find, load and initialize an implementation of `spec_id`.
    ///
    /// May block for the loader's discovery timeout.
    fn load_module_by_spec(
        &self,
        assigned_id: &ModuleClassId,
        spec_id: &ModuleSpecId,
        scope: Scope,
    ) -> Result<Arc<dyn Module>>;

    fn executor(&self) -> Result<Arc<WorkerPool>>;

    fn scheduled_executor(&self) -> Result<Arc<ScheduledPool>>;

    fn content_store(&self) -> Option<Arc<dyn ContentStore>>;

    /// Rename the group and publish its advertisement where peers can find it.
    fn publish_group(&self, name: &str, description: &str) -> Result<()>;

    /// The live subgroup `gid`, or a new one built from its advertisement.
    ///
    /// A registered group is returned as is, without waiting for it to
    /// finish construction: the handle may report [`Phase::Initializing`]
    /// when `gid` is still starting on another thread or is the caller's
    /// own group. Such a handle does not arm teardown.
    ///
    /// [`Phase::Initializing`]: crate::Phase::Initializing
    fn new_group(&self, gid: &PeerGroupId) -> Result<GroupInterface>;

    fn new_group_from_advertisement(&self, adv: &PeerGroupAdvertisement) -> Result<GroupInterface>;

    /// Create, publish and start a subgroup running `impl_adv`.
    fn new_group_with_impl(
        &self,
        gid: Option<PeerGroupId>,
        impl_adv: &ModuleImplAdvertisement,
        name: &str,
        description: &str,
    ) -> Result<GroupInterface>;

    /// A new counted handle. Fails once the group is released or stopping.
    fn get_interface(&self) -> Result<GroupInterface>;

    fn get_weak_interface(&self) -> Result<WeakGroupInterface>;

    /// Release this handle's reference. Returns whether a reference was released.
    fn unref(&self) -> bool;
}
