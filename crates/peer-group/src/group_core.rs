//! # Group Core
//!
//! Lifecycle, identity, reference counting, running module tables and pools
//! of one group. The orchestrator in [`crate::group`] owns a core and drives
//! it; nothing outside this crate touches it directly.
//!
//! ## Reference counting
//!
//! Every counted interface handle holds one reference. A group only becomes
//! sensitive to its count reaching zero once construction has completed:
//! handles acquired and released while modules are still loading never
//! trigger teardown. Once armed, the release that brings the count to zero
//! marks the group released; from then on it can no longer be acquired.
//!
//! ## Teardown
//!
//! Modules are stopped in the exact reverse of the order they completed
//! startup. A failing module stop is logged and skipped. Tables are cleared,
//! the group leaves the registry, its parent reference is released and both
//! pools are shut down without waiting for in-flight work.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use group_telemetry::{log_module_event, metrics};
use parking_lot::{Mutex, RwLock};
use shared_types::{
    well_known, ConfigParams, ModuleClassId, ModuleImplAdvertisement, PeerGroupAdvertisement,
    PeerGroupId, PeerId,
};
use tracing::{debug, info, warn};

use crate::api::PeerGroupApi;
use crate::error::{PeerGroupError, Result};
use crate::group::StdPeerGroup;
use crate::interface::{GroupInterface, WeakGroupInterface};
use crate::module::{stop_isolated, Module};
use crate::pool::{PoolConfig, PoolError, ScheduledPool, WorkerPool};
use crate::registry::GroupRegistry;

/// Lifecycle phase of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    /// Identity and resources assigned, modules loading and starting.
    Initializing,
    /// Modules running, applications not started yet.
    Ready,
    /// Applications started.
    Running,
    Stopping,
    Stopped,
}

/// Who holds a counted reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefHolder {
    /// Callers outside the group, including child groups.
    External,
    /// A module loaded by the group, holding the handle passed to `init`.
    Module,
}

/// Which table a module lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ModuleRole {
    Service,
    Transport,
    Application,
}

impl ModuleRole {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Transport => "transport",
            Self::Application => "application",
        }
    }
}

#[derive(Default)]
struct ModuleTables {
    services: HashMap<ModuleClassId, Arc<dyn Module>>,
    transports: HashMap<ModuleClassId, Arc<dyn Module>>,
    applications: HashMap<ModuleClassId, Arc<dyn Module>>,
    /// Append-only until teardown.
    start_order: Vec<(ModuleClassId, Arc<dyn Module>)>,
}

impl ModuleTables {
    fn table_mut(&mut self, role: ModuleRole) -> &mut HashMap<ModuleClassId, Arc<dyn Module>> {
        match role {
            ModuleRole::Service => &mut self.services,
            ModuleRole::Transport => &mut self.transports,
            ModuleRole::Application => &mut self.applications,
        }
    }
}

struct Identity {
    group_adv: PeerGroupAdvertisement,
    peer_id: PeerId,
    peer_name: String,
}

struct Lifecycle {
    phase: Phase,
    ref_count: usize,
    /// Part of `ref_count` held by modules the group loaded itself.
    module_refs: usize,
    init_complete: bool,
    /// Set by the first acquisition after construction completed.
    stop_when_unreferenced: bool,
    stopping: bool,
    /// The armed count reached zero; the group can no longer be acquired.
    released: bool,
    registered: bool,
}

/// How a group's effective configuration is derived.
pub(crate) enum ConfigSource {
    /// No parent: the supplied configuration, or a synthesized one.
    Root(Option<ConfigParams>),
    /// The parent's configuration with the supplied one laid over it.
    Overlay(Option<ConfigParams>),
    /// The parent's configuration, verbatim.
    Inherit,
}

/// Effective configuration for a group with `parent_config`, before the
/// group advertisement's own parameter overrides are applied.
pub(crate) fn merge_config(parent_config: Option<ConfigParams>, source: ConfigSource) -> ConfigParams {
    match (parent_config, source) {
        (Some(parent), ConfigSource::Inherit) => parent,
        (Some(mut parent), ConfigSource::Overlay(supplied)) => {
            if let Some(supplied) = supplied {
                parent.overlay(&supplied);
            }
            parent
        }
        (_, ConfigSource::Root(Some(supplied))) | (None, ConfigSource::Overlay(Some(supplied))) => supplied,
        _ => ConfigParams::synthesize(default_peer_name()),
    }
}

fn default_peer_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "peer".to_string())
}

pub(crate) struct GroupCore {
    identity: RwLock<Identity>,
    impl_adv: ModuleImplAdvertisement,
    parent: Mutex<Option<GroupInterface>>,
    config: RwLock<ConfigParams>,
    tables: Mutex<ModuleTables>,
    pools: RwLock<Option<(Arc<WorkerPool>, Arc<ScheduledPool>)>>,
    pool_config: PoolConfig,
    lifecycle: Mutex<Lifecycle>,
}

impl GroupCore {
    pub(crate) fn new(
        group_adv: PeerGroupAdvertisement,
        impl_adv: ModuleImplAdvertisement,
        pool_config: PoolConfig,
    ) -> Self {
        let gid = group_adv.id;
        Self {
            identity: RwLock::new(Identity {
                group_adv,
                peer_id: PeerId::new(gid),
                peer_name: String::new(),
            }),
            impl_adv,
            parent: Mutex::new(None),
            config: RwLock::new(ConfigParams::default()),
            tables: Mutex::new(ModuleTables::default()),
            pools: RwLock::new(None),
            pool_config,
            lifecycle: Mutex::new(Lifecycle {
                phase: Phase::Created,
                ref_count: 0,
                module_refs: 0,
                init_complete: false,
                stop_when_unreferenced: false,
                stopping: false,
                released: false,
                registered: false,
            }),
        }
    }

    // =========================================================================
    // CONSTRUCTION
    // =========================================================================

    /// Assign identity and configuration, register with `registry`, take
    /// over the `parent` reference and create the pools.
    ///
    /// On failure nothing stays registered and the parent reference is
    /// released.
    pub(crate) fn init_first(
        &self,
        this: &Arc<StdPeerGroup>,
        registry: &GroupRegistry,
        parent: Option<GroupInterface>,
        source: ConfigSource,
    ) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.phase != Phase::Created {
                return Err(PeerGroupError::Config(format!(
                    "group {} initialized twice",
                    self.group_id()
                )));
            }
            lifecycle.phase = Phase::Initializing;
        }

        let gid = self.group_id();
        let parent_config = parent.as_ref().map(|p| p.config());
        let config = merge_config(parent_config, source)
            .with_param_overrides(&self.identity.read().group_adv.service_params);

        let (peer_id, peer_name) = match &parent {
            Some(p) => {
                let name = if config.peer_name.is_empty() {
                    p.peer_name()
                } else {
                    config.peer_name.clone()
                };
                (p.peer_id().in_group(gid), name)
            }
            None => {
                let base = config.peer_id.unwrap_or_else(|| PeerId::new(gid));
                (base.in_group(gid), config.peer_name.clone())
            }
        };

        registry.register(gid, this)?;
        self.lifecycle.lock().registered = true;

        let pools = match self.create_pools(&gid) {
            Ok(pools) => pools,
            Err(e) => {
                registry.unregister(gid, &Arc::downgrade(this));
                self.lifecycle.lock().registered = false;
                return Err(e.into());
            }
        };

        {
            let mut identity = self.identity.write();
            identity.peer_id = peer_id;
            identity.peer_name = peer_name;
        }
        *self.config.write() = config;
        *self.pools.write() = Some(pools);
        *self.parent.lock() = parent;

        debug!(group = %gid, peer = %peer_id, "[Group] Identity assigned");
        Ok(())
    }

    fn create_pools(&self, gid: &PeerGroupId) -> std::result::Result<(Arc<WorkerPool>, Arc<ScheduledPool>), PoolError> {
        let short = gid.unique_value();
        let short = &short[..short.len().min(8)];
        let workers = WorkerPool::new(format!("pg-{short}"), &self.pool_config)?;
        let scheduled = ScheduledPool::new(format!("pg-{short}-sched"))?;
        Ok((Arc::new(workers), Arc::new(scheduled)))
    }

    /// Mark construction complete. The next acquisition arms teardown on
    /// the last release.
    pub(crate) fn complete_init(&self) {
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.init_complete = true;
        lifecycle.phase = Phase::Ready;
    }

    pub(crate) fn mark_running(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.phase == Phase::Ready {
            lifecycle.phase = Phase::Running;
        }
    }

    // =========================================================================
    // REFERENCE COUNTING
    // =========================================================================

    /// Take one counted reference.
    pub(crate) fn acquire(&self) -> Result<()> {
        self.acquire_as(RefHolder::External)
    }

    /// Drop one counted reference. Returns true when this release must stop
    /// the group.
    pub(crate) fn release(&self) -> bool {
        self.release_as(RefHolder::External)
    }

    /// Take a reference on behalf of `holder`.
    ///
    /// Module references count towards `ref_count` but never keep the group
    /// alive: the group stops once every external reference is gone.
    pub(crate) fn acquire_as(&self, holder: RefHolder) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.stopping || lifecycle.released || lifecycle.phase == Phase::Stopped {
            return Err(PeerGroupError::NotAcquirable(self.group_id().to_string()));
        }
        lifecycle.ref_count += 1;
        match holder {
            RefHolder::Module => lifecycle.module_refs += 1,
            RefHolder::External => {
                if lifecycle.init_complete {
                    lifecycle.stop_when_unreferenced = true;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn release_as(&self, holder: RefHolder) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        let held = match holder {
            RefHolder::Module => lifecycle.module_refs,
            RefHolder::External => lifecycle.ref_count - lifecycle.module_refs,
        };
        if held == 0 {
            warn!("[Group] Release of {} without a matching acquire", self.group_id());
            return false;
        }
        lifecycle.ref_count -= 1;
        if holder == RefHolder::Module {
            lifecycle.module_refs -= 1;
        }
        let external = lifecycle.ref_count - lifecycle.module_refs;
        if external == 0 && lifecycle.stop_when_unreferenced && !lifecycle.stopping && !lifecycle.released {
            lifecycle.released = true;
            return true;
        }
        false
    }

    pub(crate) fn ref_count(&self) -> usize {
        self.lifecycle.lock().ref_count
    }

    // =========================================================================
    // MODULE TABLES
    // =========================================================================

    /// Record a module that completed startup.
    pub(crate) fn add_started(&self, role: ModuleRole, class_id: ModuleClassId, module: Arc<dyn Module>) {
        let mut tables = self.tables.lock();
        let table = tables.table_mut(role);
        if table.contains_key(&class_id) {
            warn!("[Group] {} {} already running, ignoring duplicate", role.as_str(), class_id);
            return;
        }
        table.insert(class_id, Arc::clone(&module));
        tables.start_order.push((class_id, module));
        drop(tables);
        metrics::module_started(role.as_str());
        log_module_event!(debug, self.group_id(), class_id, "[Group] Module running", role = role.as_str());
    }

    pub(crate) fn lookup(&self, class_id: &ModuleClassId) -> Result<Arc<dyn Module>> {
        let tables = self.tables.lock();
        tables
            .services
            .get(class_id)
            .or_else(|| tables.transports.get(class_id))
            .cloned()
            .ok_or(PeerGroupError::ServiceNotFound(*class_id))
    }

    /// Running services and transports.
    pub(crate) fn running_modules(&self) -> Vec<ModuleClassId> {
        let tables = self.tables.lock();
        tables
            .start_order
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| tables.services.contains_key(id) || tables.transports.contains_key(id))
            .collect()
    }

    pub(crate) fn start_order(&self) -> Vec<ModuleClassId> {
        self.tables.lock().start_order.iter().map(|(id, _)| *id).collect()
    }

    /// Fail unless every required service is running.
    pub(crate) fn check_services(&self) -> Result<()> {
        let tables = self.tables.lock();
        let missing: Vec<_> = well_known::REQUIRED_SERVICES
            .iter()
            .filter(|id| !tables.services.contains_key(id))
            .copied()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PeerGroupError::MissingRequiredServices(missing))
        }
    }

    /// Modules offering a discovery capability, in start order.
    pub(crate) fn discovery_modules(&self) -> Vec<Arc<dyn Module>> {
        self.tables
            .lock()
            .start_order
            .iter()
            .filter(|(_, module)| module.discovery().is_some())
            .map(|(_, module)| Arc::clone(module))
            .collect()
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub(crate) fn group_id(&self) -> PeerGroupId {
        self.identity.read().group_adv.id
    }

    pub(crate) fn group_name(&self) -> String {
        self.identity.read().group_adv.name.clone()
    }

    pub(crate) fn group_advertisement(&self) -> PeerGroupAdvertisement {
        self.identity.read().group_adv.clone()
    }

    /// Rename the group; returns the updated advertisement.
    pub(crate) fn rename(&self, name: &str, description: &str) -> PeerGroupAdvertisement {
        let mut identity = self.identity.write();
        identity.group_adv.name = name.to_string();
        identity.group_adv.description = description.to_string();
        identity.group_adv.clone()
    }

    pub(crate) fn peer_id(&self) -> PeerId {
        self.identity.read().peer_id
    }

    pub(crate) fn peer_name(&self) -> String {
        self.identity.read().peer_name.clone()
    }

    pub(crate) fn impl_advertisement(&self) -> &ModuleImplAdvertisement {
        &self.impl_adv
    }

    pub(crate) fn config(&self) -> ConfigParams {
        self.config.read().clone()
    }

    pub(crate) fn pool_config(&self) -> &PoolConfig {
        &self.pool_config
    }

    pub(crate) fn parent(&self) -> Option<WeakGroupInterface> {
        self.parent
            .lock()
            .as_ref()
            .map(|p| WeakGroupInterface::new(Arc::clone(p.group())))
    }

    pub(crate) fn executor(&self) -> Result<Arc<WorkerPool>> {
        self.pools
            .read()
            .as_ref()
            .map(|(workers, _)| Arc::clone(workers))
            .ok_or_else(|| PoolError::Shutdown(self.group_id().to_string()).into())
    }

    pub(crate) fn scheduled_executor(&self) -> Result<Arc<ScheduledPool>> {
        self.pools
            .read()
            .as_ref()
            .map(|(_, scheduled)| Arc::clone(scheduled))
            .ok_or_else(|| PoolError::Shutdown(self.group_id().to_string()).into())
    }

    pub(crate) fn phase(&self) -> Phase {
        self.lifecycle.lock().phase
    }

    pub(crate) fn is_running(&self) -> bool {
        let lifecycle = self.lifecycle.lock();
        lifecycle.init_complete && !lifecycle.stopping
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.lifecycle.lock().phase == Phase::Stopped
    }

    // =========================================================================
    // TEARDOWN
    // =========================================================================

    /// Claim the teardown. Only the first caller gets the phase the group
    /// was in.
    pub(crate) fn begin_stop(&self) -> Option<Phase> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.stopping {
            return None;
        }
        lifecycle.stopping = true;
        Some(std::mem::replace(&mut lifecycle.phase, Phase::Stopping))
    }

    /// Stop modules in reverse start order and release every resource.
    /// Must follow a successful [`begin_stop`](Self::begin_stop).
    pub(crate) fn teardown(&self, this: &Weak<StdPeerGroup>, registry: &GroupRegistry) {
        let gid = self.group_id();
        let tables = std::mem::take(&mut *self.tables.lock());

        for (class_id, module) in tables.start_order.iter().rev() {
            match stop_isolated(module.as_ref()) {
                Ok(()) => debug!(group = %gid, "[Group] Stopped {}", class_id),
                Err(e) => {
                    warn!(group = %gid, "[Group] ✗ Stopping {} failed: {}", class_id, e);
                    metrics::module_failed("stop");
                }
            }
        }
        // Modules may hold the group; drop them with no lock held.
        drop(tables);

        let was_registered = std::mem::replace(&mut self.lifecycle.lock().registered, false);
        if was_registered {
            registry.unregister(gid, this);
        }

        let parent = self.parent.lock().take();
        if let Some(parent) = parent {
            parent.unref();
        }

        let pools = self.pools.write().take();
        if let Some((workers, scheduled)) = pools {
            workers.shutdown_now();
            scheduled.shutdown_now();
        }

        let mut lifecycle = self.lifecycle.lock();
        lifecycle.init_complete = false;
        lifecycle.phase = Phase::Stopped;
        info!(group = %gid, "[Group] Stopped");
    }
}

impl fmt::Debug for GroupCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lifecycle = self.lifecycle.lock();
        f.debug_struct("GroupCore")
            .field("group", &self.identity.read().group_adv.id)
            .field("phase", &lifecycle.phase)
            .field("ref_count", &lifecycle.ref_count)
            .finish()
    }
}
