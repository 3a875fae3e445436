//! # Test Fixtures
//!
//! A [`Harness`] owns a private registry whose required services are
//! journaling [`Probe`] modules. Extra services with scripted start
//! behaviour are added through [`ProbeSpec`] and run by the group
//! implementation returned from [`Harness::group_impl`].

use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use peer_group::{
    GroupBuilder, GroupInterface, GroupRegistry, LoaderConfig, Module, ModuleError,
    ModuleFactories, PeerGroupApi, PoolConfig, Result, StartStatus,
};
use shared_types::{
    well_known, ModuleClassId, ModuleImplAdvertisement, ModuleRef, ModuleSpecId,
};

// =============================================================================
// JOURNAL
// =============================================================================

/// Ordered record of module hooks, shared by every probe of a harness.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Module names of the entries ending in `:{event}`, in order.
    pub fn names(&self, event: &str) -> Vec<String> {
        let suffix = format!(":{event}");
        self.0
            .lock()
            .iter()
            .filter_map(|e| e.strip_suffix(&suffix).map(str::to_string))
            .collect()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == entry).count()
    }
}

// =============================================================================
// PROBE MODULE
// =============================================================================

/// Start behaviour of a probe, shared by every instance built from it.
#[derive(Clone)]
pub struct ProbeSpec {
    pub name: String,
    script: Vec<StartStatus>,
    repeat: StartStatus,
    waits_for: Option<ModuleClassId>,
    handle_in_init: bool,
    calls: Arc<AtomicUsize>,
}

impl ProbeSpec {
    /// Starts on the first call.
    pub fn ok(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Vec::new(),
            repeat: StartStatus::Ok,
            waits_for: None,
            handle_in_init: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns `statuses` in order before settling on the repeat status.
    #[must_use]
    pub fn script(mut self, statuses: &[StartStatus]) -> Self {
        self.script = statuses.to_vec();
        self
    }

    /// Status returned once the script is exhausted.
    #[must_use]
    pub fn then_always(mut self, status: StartStatus) -> Self {
        self.repeat = status;
        self
    }

    /// Reports `AgainProgress` until `class_id` is running in the group.
    #[must_use]
    pub fn waits_for(mut self, class_id: ModuleClassId) -> Self {
        self.waits_for = Some(class_id);
        self
    }

    /// Takes and releases a counted handle while initializing.
    #[must_use]
    pub fn handle_in_init(mut self) -> Self {
        self.handle_in_init = true;
        self
    }

    /// `start_app` calls across all instances.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Journaling module driven by a [`ProbeSpec`].
pub struct Probe {
    spec: ProbeSpec,
    journal: Journal,
    script: Mutex<VecDeque<StartStatus>>,
    group: RwLock<Option<Weak<dyn PeerGroupApi>>>,
}

impl Probe {
    pub fn new(spec: &ProbeSpec, journal: &Journal) -> Self {
        Self {
            script: Mutex::new(spec.script.iter().copied().collect()),
            spec: spec.clone(),
            journal: journal.clone(),
            group: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    fn dependency_running(&self, class_id: &ModuleClassId) -> bool {
        self.group
            .read()
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|group| group.lookup_service(class_id).is_ok())
    }
}

impl Module for Probe {
    fn init(
        &self,
        group: Arc<dyn PeerGroupApi>,
        _assigned_id: &ModuleClassId,
        _impl_adv: &ModuleImplAdvertisement,
    ) -> std::result::Result<(), ModuleError> {
        if self.spec.handle_in_init {
            let handle = group.get_interface()?;
            handle.unref();
            self.journal.record(format!("{}:handle-released", self.spec.name));
        }
        *self.group.write() = Some(Arc::downgrade(&group));
        self.journal.record(format!("{}:init", self.spec.name));
        Ok(())
    }

    fn start_app(&self, _args: &[String]) -> StartStatus {
        self.spec.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(dependency) = &self.spec.waits_for {
            if !self.dependency_running(dependency) {
                return StartStatus::AgainProgress;
            }
        }
        let status = self.script.lock().pop_front().unwrap_or(self.spec.repeat);
        if status == StartStatus::Ok {
            self.journal.record(format!("{}:start", self.spec.name));
        }
        status
    }

    fn stop_app(&self) -> std::result::Result<(), ModuleError> {
        self.journal.record(format!("{}:stop", self.spec.name));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// HANDLE KEEPER
// =============================================================================

/// Shared slot an application parks its group handle in.
pub type KeptHandle = Arc<Mutex<Option<Arc<dyn PeerGroupApi>>>>;

/// Application that holds the handle from `init` until the test takes it.
struct HandleKeeper {
    name: String,
    journal: Journal,
    kept: KeptHandle,
}

impl Module for HandleKeeper {
    fn init(
        &self,
        group: Arc<dyn PeerGroupApi>,
        _assigned_id: &ModuleClassId,
        _impl_adv: &ModuleImplAdvertisement,
    ) -> std::result::Result<(), ModuleError> {
        *self.kept.lock() = Some(group);
        self.journal.record(format!("{}:init", self.name));
        Ok(())
    }

    fn start_app(&self, _args: &[String]) -> StartStatus {
        self.journal.record(format!("{}:start", self.name));
        StartStatus::Ok
    }

    fn stop_app(&self) -> std::result::Result<(), ModuleError> {
        self.journal.record(format!("{}:stop", self.name));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// HARNESS
// =============================================================================

const REQUIRED: [(ModuleSpecId, &str); 4] = [
    (well_known::REF_ENDPOINT_SPEC, "endpoint"),
    (well_known::REF_RESOLVER_SPEC, "resolver"),
    (well_known::REF_MEMBERSHIP_SPEC, "membership"),
    (well_known::REF_ACCESS_SPEC, "access"),
];

pub fn small_pools() -> PoolConfig {
    PoolConfig {
        core_threads: 1,
        max_threads: 2,
        keep_alive: Duration::from_secs(1),
        queue_capacity: 8,
    }
}

pub fn fast_loader() -> LoaderConfig {
    LoaderConfig {
        discovery_timeout: Duration::from_millis(200),
        requery_interval: Duration::from_millis(50),
        poll_interval: Duration::from_millis(10),
    }
}

/// Private registry with probe implementations of the required services.
pub struct Harness {
    pub journal: Journal,
    pub registry: Arc<GroupRegistry>,
    extra: Mutex<Vec<(ModuleClassId, ModuleSpecId)>>,
    apps: Mutex<Vec<(ModuleClassId, ModuleImplAdvertisement)>>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        let journal = Journal::default();
        let factories = Arc::new(ModuleFactories::new());
        for (spec_id, name) in REQUIRED {
            register_probe(&factories, spec_id, &ProbeSpec::ok(name), &journal);
        }
        Self {
            journal,
            registry: Arc::new(GroupRegistry::new(factories)),
            extra: Mutex::new(Vec::new()),
            apps: Mutex::new(Vec::new()),
        }
    }

    /// Add a service run by [`group_impl`](Self::group_impl). Returns its role.
    pub fn with_service(&self, probe: &ProbeSpec) -> ModuleClassId {
        self.with_service_as(ModuleClassId::new(), probe)
    }

    /// Add a service under a role chosen by the caller.
    pub fn with_service_as(&self, class_id: ModuleClassId, probe: &ProbeSpec) -> ModuleClassId {
        let spec_id = ModuleSpecId::new(class_id);
        register_probe(self.registry.factories(), spec_id, probe, &self.journal);
        self.extra.lock().push((class_id, spec_id));
        class_id
    }

    /// Add an application that keeps its group handle. Returns where it is kept.
    pub fn with_handle_keeping_app(&self, name: &str) -> KeptHandle {
        let kept = KeptHandle::default();
        let impl_adv = ModuleImplAdvertisement::new(
            ModuleSpecId::new(well_known::APPLICATION_CLASS),
            format!("app.{name}"),
        );
        let (app_name, journal, slot) = (name.to_string(), self.journal.clone(), Arc::clone(&kept));
        self.registry.factories().register(impl_adv.clone(), move || -> Arc<dyn Module> {
            Arc::new(HandleKeeper {
                name: app_name.clone(),
                journal: journal.clone(),
                kept: Arc::clone(&slot),
            })
        });
        self.apps
            .lock()
            .push((well_known::APPLICATION_CLASS.new_role(), impl_adv));
        kept
    }

    /// Standard group implementation running the required and extra services
    /// and applications.
    pub fn group_impl(&self) -> ModuleImplAdvertisement {
        let std_group = ModuleImplAdvertisement::std_group();
        let mut params = std_group.std_group_params().unwrap_or_default();
        for (class_id, spec_id) in self.extra.lock().iter() {
            params = params.with_service(*class_id, ModuleRef::spec(*spec_id));
        }
        for (class_id, impl_adv) in self.apps.lock().iter() {
            params = params.with_app(*class_id, ModuleRef::implementation(impl_adv.clone()));
        }
        std_group.clone().with_group_params(&params).unwrap_or(std_group)
    }

    /// Build the root group with [`group_impl`](Self::group_impl).
    pub fn root(&self) -> Result<GroupInterface> {
        GroupBuilder::root(Arc::clone(&self.registry))
            .with_impl(self.group_impl())
            .with_pool_config(small_pools())
            .with_loader_config(fast_loader())
            .build()
    }
}

fn register_probe(factories: &ModuleFactories, spec_id: ModuleSpecId, probe: &ProbeSpec, journal: &Journal) {
    let probe = probe.clone();
    let journal = journal.clone();
    factories.register(
        ModuleImplAdvertisement::new(spec_id, format!("probe.{}", probe.name)),
        move || -> Arc<dyn Module> { Arc::new(Probe::new(&probe, &journal)) },
    );
}
