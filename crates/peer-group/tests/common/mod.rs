//! Shared fixtures for the peer-group integration tests.

#![allow(dead_code)]

use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use peer_group::{
    GroupRegistry, LoaderConfig, Module, ModuleError, ModuleFactories, PeerGroupApi, PoolConfig,
    StartStatus,
};
use shared_types::{well_known, ModuleClassId, ModuleImplAdvertisement, ModuleSpecId};

// =============================================================================
// JOURNAL
// =============================================================================

/// Ordered record of module lifecycle events across a test.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn since(&self, start: usize) -> Vec<String> {
        self.0.lock()[start..].to_vec()
    }

    /// Entries ending in `suffix`, in order.
    pub fn with_suffix(&self, suffix: &str) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter(|e| e.ends_with(suffix))
            .cloned()
            .collect()
    }
}

// =============================================================================
// TEST MODULE
// =============================================================================

/// Module that journals every hook and replays a scripted start sequence.
pub struct TestService {
    pub name: String,
    journal: Journal,
    script: Mutex<VecDeque<StartStatus>>,
}

impl TestService {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self::scripted(name, journal, &[])
    }

    pub fn scripted(name: &str, journal: &Journal, script: &[StartStatus]) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
            script: Mutex::new(script.iter().copied().collect()),
        }
    }
}

impl Module for TestService {
    fn init(
        &self,
        group: Arc<dyn PeerGroupApi>,
        _assigned_id: &ModuleClassId,
        _impl_adv: &ModuleImplAdvertisement,
    ) -> Result<(), ModuleError> {
        // Only a counted handle has a reference to give back.
        let kind = if group.unref() { "counted" } else { "raw" };
        self.journal.record(format!("{}:init:{}", self.name, kind));
        Ok(())
    }

    fn start_app(&self, args: &[String]) -> StartStatus {
        let status = self.script.lock().pop_front().unwrap_or(StartStatus::Ok);
        if status == StartStatus::Ok {
            self.journal.record(format!("{}:start", self.name));
            if !args.is_empty() {
                self.journal.record(format!("{}:args:{}", self.name, args.join(" ")));
            }
        }
        status
    }

    fn stop_app(&self) -> Result<(), ModuleError> {
        self.journal.record(format!("{}:stop", self.name));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Application that holds on to the handle it was given in `init`.
pub struct HandleKeeper {
    journal: Journal,
    kept: KeptHandle,
}

/// Where a [`HandleKeeper`] parks its group handle.
pub type KeptHandle = Arc<Mutex<Option<Arc<dyn PeerGroupApi>>>>;

impl Module for HandleKeeper {
    fn init(
        &self,
        group: Arc<dyn PeerGroupApi>,
        _assigned_id: &ModuleClassId,
        _impl_adv: &ModuleImplAdvertisement,
    ) -> Result<(), ModuleError> {
        *self.kept.lock() = Some(group);
        self.journal.record("keeper:init");
        Ok(())
    }

    fn start_app(&self, _args: &[String]) -> StartStatus {
        self.journal.record("keeper:start");
        StartStatus::Ok
    }

    fn stop_app(&self) -> Result<(), ModuleError> {
        self.journal.record("keeper:stop");
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Register a [`HandleKeeper`] application and return its implementation.
pub fn register_keeper(factories: &ModuleFactories, journal: &Journal, kept: &KeptHandle) -> ModuleImplAdvertisement {
    let adv = ModuleImplAdvertisement::new(ModuleSpecId::new(well_known::APPLICATION_CLASS), "test.keeper");
    let journal = journal.clone();
    let kept = Arc::clone(kept);
    factories.register(adv.clone(), move || -> Arc<dyn Module> {
        Arc::new(HandleKeeper {
            journal: journal.clone(),
            kept: Arc::clone(&kept),
        })
    });
    adv
}

/// Service that asks its parent for its own group while initializing and
/// journals the phase it is handed back.
pub struct SelfLookup {
    journal: Journal,
}

impl Module for SelfLookup {
    fn init(
        &self,
        group: Arc<dyn PeerGroupApi>,
        _assigned_id: &ModuleClassId,
        _impl_adv: &ModuleImplAdvertisement,
    ) -> Result<(), ModuleError> {
        let gid = group.peer_group_id();
        let entry = match group.parent().map(|parent| parent.new_group(&gid)) {
            Some(Ok(handle)) => format!("self-lookup:{:?}", handle.phase()),
            Some(Err(e)) => format!("self-lookup:error:{e}"),
            None => "self-lookup:no-parent".to_string(),
        };
        self.journal.record(entry);
        Ok(())
    }

    fn start_app(&self, _args: &[String]) -> StartStatus {
        StartStatus::Ok
    }

    fn stop_app(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Register a [`SelfLookup`] service and return its spec.
pub fn register_self_lookup(factories: &ModuleFactories, journal: &Journal) -> ModuleSpecId {
    let spec_id = ModuleSpecId::new(ModuleClassId::new());
    let journal = journal.clone();
    factories.register(
        ModuleImplAdvertisement::new(spec_id, "test.self-lookup"),
        move || -> Arc<dyn Module> {
            Arc::new(SelfLookup {
                journal: journal.clone(),
            })
        },
    );
    spec_id
}

// =============================================================================
// FACTORIES AND CONFIG
// =============================================================================

pub const REQUIRED: [(ModuleSpecId, &str); 4] = [
    (well_known::REF_ENDPOINT_SPEC, "endpoint"),
    (well_known::REF_RESOLVER_SPEC, "resolver"),
    (well_known::REF_MEMBERSHIP_SPEC, "membership"),
    (well_known::REF_ACCESS_SPEC, "access"),
];

pub fn register_test_module(factories: &ModuleFactories, spec_id: ModuleSpecId, name: &str, journal: &Journal) {
    let name = name.to_string();
    let journal = journal.clone();
    factories.register(
        ModuleImplAdvertisement::new(spec_id, format!("test.{name}")),
        move || -> Arc<dyn Module> { Arc::new(TestService::new(&name, &journal)) },
    );
}

/// Factories providing every required service.
pub fn required_factories(journal: &Journal) -> Arc<ModuleFactories> {
    let factories = Arc::new(ModuleFactories::new());
    for (spec_id, name) in REQUIRED {
        register_test_module(&factories, spec_id, name, journal);
    }
    factories
}

pub fn test_registry(journal: &Journal) -> Arc<GroupRegistry> {
    Arc::new(GroupRegistry::new(required_factories(journal)))
}

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
