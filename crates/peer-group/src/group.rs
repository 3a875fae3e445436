//! # Standard Peer Group
//!
//! The orchestrator wrapped around a [`GroupCore`]. It reads the module
//! tables out of its implementation advertisement, resolves and starts the
//! services and transports while constructing, starts the applications on
//! `start_app`, and owns the group's local content store.
//!
//! Construction order:
//!
//! 1. Core identity, registry entry, parent reference and pools.
//! 2. Open the content store and rebuild its index.
//! 3. Build the service, transport and application tables, dropping roles
//!    disabled in the effective configuration.
//! 4. Load services and transports as privileged modules and run them
//!    through the startup coordinator.
//! 5. Require the mandatory services, then publish the group's own
//!    advertisements.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use group_telemetry::{group_span, log_group_event, metrics};
use parking_lot::{Mutex, RwLock};
use shared_types::{
    Advertisement, AdvertisementKind, ConfigParams, ModuleClassId, ModuleImplAdvertisement, ModuleSpecId,
    ParamEntry, PeerGroupAdvertisement, PeerGroupId, PeerId, ATTR_GID, STD_GROUP_CODE,
};
use tracing::{debug, info, warn};

use crate::api::{PeerGroupApi, Scope};
use crate::coordinator::{converge, PendingModule};
use crate::error::{PeerGroupError, Result};
use crate::group_core::{ConfigSource, GroupCore, ModuleRole, Phase, RefHolder};
use crate::hierarchy::{construct, GroupSettings, GroupVariant};
use crate::interface::{GroupInterface, RoleMap, WeakGroupInterface};
use crate::loader::{LoadHost, LoaderConfig, ModuleLoader};
use crate::module::{stop_isolated, Module, ModuleDescriptor};
use crate::pool::{ScheduledPool, WorkerPool};
use crate::registry::GroupRegistry;
use crate::store::{ContentStore, FileContentStore, InMemoryContentStore, StoreError, DEFAULT_LIFETIME};

/// Where a group keeps its content store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StoreLocation {
    /// Volatile; lost when the group stops.
    #[default]
    InMemory,
    /// One subdirectory per group under this root.
    Directory(PathBuf),
}

/// A table entry waiting to be resolved.
type TableEntry = (ModuleClassId, ModuleDescriptor);

/// The standard group implementation.
pub struct StdPeerGroup {
    self_ref: Weak<StdPeerGroup>,
    core: GroupCore,
    registry: Arc<GroupRegistry>,
    loader: ModuleLoader,
    variant: GroupVariant,
    store_location: StoreLocation,
    store: RwLock<Option<Arc<dyn ContentStore>>>,
    /// Application entries, resolved on `start_app`.
    pending_apps: Mutex<Vec<TableEntry>>,
    /// Guards `start_app`; true once applications are running.
    apps_started: Mutex<bool>,
    top_level_app: Mutex<Option<(ModuleClassId, Arc<dyn Module>)>>,
}

impl StdPeerGroup {
    pub(crate) fn new(settings: GroupSettings) -> Arc<Self> {
        let GroupSettings {
            registry,
            group_adv,
            impl_adv,
            variant,
            loader_config,
            pool_config,
            store_location,
        } = settings;

        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            core: GroupCore::new(group_adv, impl_adv, pool_config),
            loader: ModuleLoader::new(Arc::clone(registry.factories()), loader_config),
            registry,
            variant,
            store_location,
            store: RwLock::new(None),
            pending_apps: Mutex::new(Vec::new()),
            apps_started: Mutex::new(false),
            top_level_app: Mutex::new(None),
        })
    }

    pub(crate) fn core(&self) -> &GroupCore {
        &self.core
    }

    pub(crate) fn registry(&self) -> &Arc<GroupRegistry> {
        &self.registry
    }

    pub(crate) fn loader_config(&self) -> &LoaderConfig {
        self.loader.config()
    }

    pub(crate) fn store_location(&self) -> &StoreLocation {
        &self.store_location
    }

    fn self_arc(&self) -> Result<Arc<StdPeerGroup>> {
        self.self_ref
            .upgrade()
            .ok_or_else(|| PeerGroupError::NotAcquirable(self.core.group_id().to_string()))
    }

    // =========================================================================
    // CONSTRUCTION
    // =========================================================================

    /// Construct the group: identity, store, services and transports.
    ///
    /// On error the caller tears down what was built with [`stop_app`](Self::stop_app).
    pub(crate) fn init(self: &Arc<Self>, parent: Option<GroupInterface>, source: ConfigSource) -> Result<()> {
        let gid = self.core.group_id();
        let _span = group_span!("construct", group = %gid).entered();

        self.core.init_first(self, &self.registry, parent, source)?;
        self.open_store()?;

        let params = self
            .core
            .impl_advertisement()
            .std_group_params()
            .map_err(|e| PeerGroupError::Config(format!("group {gid} has no module tables: {e}")))?;
        let config = self.core.config();

        let mut seen = HashSet::new();
        let services = enabled_entries(&config, params.services, &mut seen);
        let transports = enabled_entries(&config, params.transports, &mut seen);
        *self.pending_apps.lock() = enabled_entries(&config, params.apps, &mut seen);

        let mut roles = HashMap::new();
        let mut pending = Vec::new();
        for (role, entries) in [(ModuleRole::Service, services), (ModuleRole::Transport, transports)] {
            for (class_id, descriptor) in entries {
                match self.resolve(&class_id, &descriptor, true) {
                    Ok(module) => {
                        roles.insert(class_id, role);
                        pending.push(PendingModule {
                            class_id,
                            module,
                            descriptor: descriptor.describe(),
                        });
                    }
                    Err(e) => warn!(group = %gid, "[Group] ✗ Skipping {} {}: {}", role.as_str(), class_id, e),
                }
            }
        }

        converge(gid, pending, &[], |entry| {
            let role = roles.get(&entry.class_id).copied().unwrap_or(ModuleRole::Service);
            self.core.add_started(role, entry.class_id, Arc::clone(&entry.module));
        })?;
        self.core.check_services()?;

        self.publish_own_advertisements();
        self.core.complete_init();
        metrics::group_started();
        log_group_event!(info, gid, "[Group] ✓ Group constructed");
        Ok(())
    }

    fn open_store(&self) -> Result<()> {
        let store: Arc<dyn ContentStore> = match &self.store_location {
            StoreLocation::InMemory => Arc::new(InMemoryContentStore::new()),
            StoreLocation::Directory(root) => Arc::new(FileContentStore::open(root, &self.core.group_id())?),
        };
        store.clear_index()?;
        *self.store.write() = Some(store);
        Ok(())
    }

    fn publish_own_advertisements(&self) {
        let Some(store) = self.content_store() else {
            return;
        };
        let mut advs: Vec<Advertisement> = vec![
            self.core.group_advertisement().into(),
            self.core.impl_advertisement().clone().into(),
        ];
        if matches!(self.variant, GroupVariant::Root) {
            advs.extend(self.loader.factories().known_impls().into_iter().map(Into::into));
        }
        for adv in advs {
            if let Err(e) = store.publish(adv, DEFAULT_LIFETIME) {
                debug!("[Group] Could not publish own advertisement: {}", e);
            }
        }
    }

    fn resolve(
        &self,
        class_id: &ModuleClassId,
        descriptor: &ModuleDescriptor,
        privileged: bool,
    ) -> Result<Arc<dyn Module>> {
        match descriptor {
            ModuleDescriptor::Resolved(module) => Ok(Arc::clone(module)),
            ModuleDescriptor::Impl(impl_adv) => self.loader.load_impl(self, class_id, impl_adv, privileged),
            ModuleDescriptor::Spec(spec_id) => {
                self.loader
                    .load_spec(self, class_id, spec_id, Scope::FromParent, privileged)
            }
        }
    }

    // =========================================================================
    // APPLICATIONS
    // =========================================================================

    /// Start the applications. Returns immediately if they already run.
    pub(crate) fn start_app(&self, args: &[String]) -> Result<()> {
        let mut started = self.apps_started.lock();
        if *started {
            return Ok(());
        }
        let gid = self.core.group_id();

        let entries = std::mem::take(&mut *self.pending_apps.lock());
        let mut pending = Vec::with_capacity(entries.len());
        for (class_id, descriptor) in entries {
            match self.resolve(&class_id, &descriptor, false) {
                Ok(module) => pending.push(PendingModule {
                    class_id,
                    module,
                    descriptor: descriptor.describe(),
                }),
                Err(e) => warn!(group = %gid, "[Group] ✗ Skipping application {}: {}", class_id, e),
            }
        }
        converge(gid, pending, args, |entry| {
            self.core
                .add_started(ModuleRole::Application, entry.class_id, Arc::clone(&entry.module));
        })
        .map_err(|e| log_unstarted_apps(gid, e))?;

        if let GroupVariant::InheritConfig {
            top_level_app: Some((class_id, impl_adv)),
        } = &self.variant
        {
            let module = self.loader.load_impl(self, class_id, impl_adv, false).map_err(|e| {
                warn!(group = %gid, "[Group] ✗ Top-level application {} not loaded: {}", class_id, e);
                e
            })?;
            let app = PendingModule {
                class_id: *class_id,
                module,
                descriptor: ModuleDescriptor::Impl(impl_adv.clone()).describe(),
            };
            converge(gid, vec![app], args, |entry| {
                *self.top_level_app.lock() = Some((entry.class_id, Arc::clone(&entry.module)));
            })
            .map_err(|e| log_unstarted_apps(gid, e))?;
        }

        *started = true;
        self.core.mark_running();
        info!(group = %gid, "[Group] ✓ Applications started");
        Ok(())
    }

    // =========================================================================
    // TEARDOWN
    // =========================================================================

    /// Tear the group down. Only the first call has an effect.
    pub fn stop_app(&self) {
        let Some(previous) = self.core.begin_stop() else {
            return;
        };
        let gid = self.core.group_id();
        info!(group = %gid, "[Group] Stopping");

        let top_level = self.top_level_app.lock().take();
        if let Some((class_id, app)) = top_level {
            if let Err(e) = stop_isolated(app.as_ref()) {
                warn!(group = %gid, "[Group] ✗ Stopping top-level application {} failed: {}", class_id, e);
                metrics::module_failed("stop");
            }
        }

        self.core.teardown(&self.self_ref, &self.registry);

        let store = self.store.write().take();
        if let Some(store) = store {
            if let Err(e) = store.close() {
                warn!(group = %gid, "[Group] Closing content store failed: {}", e);
            }
        }
        if finished_construction(previous) {
            metrics::group_stopped();
        }
    }

    // =========================================================================
    // STATE
    // =========================================================================

    pub fn is_running(&self) -> bool {
        self.core.is_running()
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.core.is_stopped()
    }

    pub fn phase(&self) -> Phase {
        self.core.phase()
    }

    pub fn running_modules(&self) -> Vec<ModuleClassId> {
        self.core.running_modules()
    }

    pub fn start_order(&self) -> Vec<ModuleClassId> {
        self.core.start_order()
    }

    /// A counted handle for one of this group's own non-privileged modules.
    fn module_interface(&self) -> Result<GroupInterface> {
        let this = self.self_arc()?;
        self.core.acquire_as(RefHolder::Module)?;
        Ok(GroupInterface::for_module(this))
    }

    /// A counted handle whose service lookups go through `role_map`.
    pub fn get_interface_with_roles(&self, role_map: RoleMap) -> Result<GroupInterface> {
        let this = self.self_arc()?;
        self.core.acquire()?;
        Ok(GroupInterface::new(this, Some(Arc::new(role_map))))
    }

    // =========================================================================
    // SUBGROUPS
    // =========================================================================

    fn find_group_advertisement(&self, gid: &PeerGroupId) -> Option<PeerGroupAdvertisement> {
        let value = gid.to_string();
        self.stores_in(Scope::Both).into_iter().find_map(|store| {
            store
                .search(AdvertisementKind::PeerGroup, ATTR_GID, &value)
                .ok()?
                .into_iter()
                .find_map(|adv| adv.as_peer_group().cloned())
        })
    }

    /// The standard implementation advertisement registered for `spec_id`.
    fn resolve_group_impl(&self, spec_id: &ModuleSpecId) -> Result<ModuleImplAdvertisement> {
        let candidates = self.loader.find_candidates(self, spec_id, Scope::Both);
        candidates
            .into_iter()
            .find(|adv| adv.code == STD_GROUP_CODE && adv.compat.check().is_ok())
            .ok_or_else(|| {
                PeerGroupError::ResolutionFailure(format!("no group implementation of {spec_id}"))
            })
    }

    fn instantiate_child(
        &self,
        group_adv: PeerGroupAdvertisement,
        impl_adv: ModuleImplAdvertisement,
    ) -> Result<GroupInterface> {
        let parent = self.get_interface()?;
        let settings = GroupSettings {
            registry: Arc::clone(&self.registry),
            group_adv,
            impl_adv,
            variant: GroupVariant::Standard,
            loader_config: self.loader_config().clone(),
            pool_config: self.core.pool_config().clone(),
            store_location: self.store_location().clone(),
        };
        construct(settings, Some(parent), ConfigSource::Overlay(None), &[])
    }
}

/// Name every application a failed start run left behind, then hand the
/// error back.
/// Whether a group stopped from `phase` was counted by `group_started`.
fn finished_construction(phase: Phase) -> bool {
    matches!(phase, Phase::Ready | Phase::Running)
}

fn log_unstarted_apps(gid: PeerGroupId, err: PeerGroupError) -> PeerGroupError {
    if let PeerGroupError::ConvergenceFailure { remaining, .. } = &err {
        for (class_id, descriptor) in remaining {
            warn!(group = %gid, "[Group] ✗ Application {} ({}) never started", class_id, descriptor);
        }
    }
    err
}

/// Table entries whose role is enabled and not already claimed.
fn enabled_entries(
    config: &ConfigParams,
    entries: Vec<ParamEntry>,
    seen: &mut HashSet<ModuleClassId>,
) -> Vec<TableEntry> {
    entries
        .into_iter()
        .filter(|entry| {
            if !config.is_service_enabled(&entry.class_id) {
                debug!("[Group] {} disabled by configuration", entry.class_id);
                return false;
            }
            if !seen.insert(entry.class_id) {
                warn!("[Group] {} listed more than once, keeping the first", entry.class_id);
                return false;
            }
            true
        })
        .map(|entry| (entry.class_id, ModuleDescriptor::from(entry.module)))
        .collect()
}

// =============================================================================
// LOADER HOST
// =============================================================================

impl LoadHost for StdPeerGroup {
    fn host_group_id(&self) -> PeerGroupId {
        self.core.group_id()
    }

    fn module_handle(&self, privileged: bool) -> Result<Arc<dyn PeerGroupApi>> {
        if privileged {
            Ok(self.self_arc()?)
        } else {
            Ok(Arc::new(self.module_interface()?))
        }
    }

    fn stores_in(&self, scope: Scope) -> Vec<Arc<dyn ContentStore>> {
        let parent = self.core.parent();
        let own = self.content_store();
        let parent_store = parent.as_ref().and_then(|p| p.content_store());
        match (scope, parent.is_some()) {
            (Scope::Here, _) | (Scope::FromParent, false) | (Scope::Both, false) => own.into_iter().collect(),
            (Scope::FromParent, true) => parent_store.into_iter().collect(),
            (Scope::Both, true) => own.into_iter().chain(parent_store).collect(),
        }
    }

    fn discovery_in(&self, scope: Scope) -> Vec<Arc<dyn Module>> {
        let parent = self.core.parent();
        let own = || self.core.discovery_modules();
        let from_parent = |p: &WeakGroupInterface| p.group().core().discovery_modules();
        match (scope, parent.as_ref()) {
            (Scope::Here, _) | (_, None) => own(),
            (Scope::FromParent, Some(p)) => from_parent(p),
            (Scope::Both, Some(p)) => {
                let mut modules = own();
                modules.extend(from_parent(p));
                modules
            }
        }
    }

    fn local_store(&self) -> Option<Arc<dyn ContentStore>> {
        self.content_store()
    }
}

// =============================================================================
// GROUP API (PRIVILEGED)
// =============================================================================

impl PeerGroupApi for StdPeerGroup {
    fn peer_group_id(&self) -> PeerGroupId {
        self.core.group_id()
    }

    fn peer_group_name(&self) -> String {
        self.core.group_name()
    }

    fn peer_id(&self) -> PeerId {
        self.core.peer_id()
    }

    fn peer_name(&self) -> String {
        self.core.peer_name()
    }

    fn peer_group_advertisement(&self) -> PeerGroupAdvertisement {
        self.core.group_advertisement()
    }

    fn impl_advertisement(&self) -> ModuleImplAdvertisement {
        self.core.impl_advertisement().clone()
    }

    fn config(&self) -> ConfigParams {
        self.core.config()
    }

    fn parent(&self) -> Option<WeakGroupInterface> {
        self.core.parent()
    }

    fn lookup_service_role(&self, class_id: &ModuleClassId, role_index: usize) -> Result<Arc<dyn Module>> {
        if role_index != 0 {
            return Err(PeerGroupError::ServiceNotFound(*class_id));
        }
        self.core.lookup(class_id)
    }

    fn role_map(&self) -> Option<Arc<RoleMap>> {
        None
    }

    fn load_module(
        &self,
        assigned_id: &ModuleClassId,
        impl_adv: &ModuleImplAdvertisement,
    ) -> Result<Arc<dyn Module>> {
        self.loader.load_impl(self, assigned_id, impl_adv, false)
    }

    fn load_module_by_spec(
        &self,
        assigned_id: &ModuleClassId,
        spec_id: &ModuleSpecId,
        scope: Scope,
    ) -> Result<Arc<dyn Module>> {
        self.loader.load_spec(self, assigned_id, spec_id, scope, false)
    }

    fn executor(&self) -> Result<Arc<WorkerPool>> {
        self.core.executor()
    }

    fn scheduled_executor(&self) -> Result<Arc<ScheduledPool>> {
        self.core.scheduled_executor()
    }

    fn content_store(&self) -> Option<Arc<dyn ContentStore>> {
        self.store.read().clone()
    }

    fn publish_group(&self, name: &str, description: &str) -> Result<()> {
        let store = self.content_store().ok_or(StoreError::Closed)?;
        let adv = self.core.rename(name, description);
        store.publish(adv.clone().into(), DEFAULT_LIFETIME)?;

        if let Some(parent_store) = self.core.parent().and_then(|p| p.content_store()) {
            if let Err(e) = parent_store.publish(adv.into(), DEFAULT_LIFETIME) {
                debug!("[Group] Could not publish {} to parent: {}", name, e);
            }
        }
        info!(group = %self.core.group_id(), "[Group] Published as '{}'", name);
        Ok(())
    }

    fn new_group(&self, gid: &PeerGroupId) -> Result<GroupInterface> {
        // Waiting here could deadlock a module asking for its own group.
        if let Some(existing) = self.registry.lookup_group(gid) {
            debug!("[Group] {} already registered ({:?}), returning it", gid, existing.phase());
            return existing.get_interface();
        }
        let adv = self.find_group_advertisement(gid).ok_or_else(|| {
            PeerGroupError::ResolutionFailure(format!("no advertisement for group {gid}"))
        })?;
        self.new_group_from_advertisement(&adv)
    }

    fn new_group_from_advertisement(&self, adv: &PeerGroupAdvertisement) -> Result<GroupInterface> {
        if let Some(existing) = self.registry.lookup_group(&adv.id) {
            return existing.get_interface();
        }
        let impl_adv = self.resolve_group_impl(&adv.module_spec_id)?;
        self.instantiate_child(adv.clone(), impl_adv)
    }

    fn new_group_with_impl(
        &self,
        gid: Option<PeerGroupId>,
        impl_adv: &ModuleImplAdvertisement,
        name: &str,
        description: &str,
    ) -> Result<GroupInterface> {
        if impl_adv.code != STD_GROUP_CODE {
            return Err(PeerGroupError::ResolutionFailure(format!(
                "unsupported group implementation {}",
                impl_adv.code
            )));
        }
        impl_adv
            .compat
            .check()
            .map_err(|source| PeerGroupError::Compatibility {
                spec_id: impl_adv.module_spec_id,
                source,
            })?;

        let gid = gid.unwrap_or_else(PeerGroupId::new);
        let group_adv = PeerGroupAdvertisement::new(gid, impl_adv.module_spec_id, name)
            .with_description(description);

        if let Some(store) = self.content_store() {
            let advs: [Advertisement; 2] = [group_adv.clone().into(), impl_adv.clone().into()];
            for adv in advs {
                if let Err(e) = store.publish(adv, DEFAULT_LIFETIME) {
                    debug!("[Group] Could not publish subgroup advertisement: {}", e);
                }
            }
        }
        self.instantiate_child(group_adv, impl_adv.clone())
    }

    fn get_interface(&self) -> Result<GroupInterface> {
        let this = self.self_arc()?;
        self.core.acquire()?;
        Ok(GroupInterface::new(this, None))
    }

    fn get_weak_interface(&self) -> Result<WeakGroupInterface> {
        Ok(WeakGroupInterface::new(self.self_arc()?))
    }

    /// The group itself holds no reference.
    fn unref(&self) -> bool {
        false
    }
}

impl std::fmt::Debug for StdPeerGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdPeerGroup")
            .field("core", &self.core)
            .field("variant", &self.variant)
            .finish()
    }
}
