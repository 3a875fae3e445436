//! # Module Loader
//!
//! Turns module descriptors into initialized module instances.
//!
//! ## Loading an implementation advertisement
//!
//! 1. Reject the advertisement if its compatibility statement fails.
//! 2. Resolve its code locator to a registered factory and instantiate.
//! 3. `init` the module with the group itself (privileged) or a counted
//!    interface (everything else). A module whose `init` fails is stopped
//!    best-effort and reported as an initialization failure.
//! 4. Publish the advertisement into the group's store, best-effort.
//!
//! ## Loading by specification id
//!
//! Candidates come from the registered factories when any match. Otherwise
//! the stores of the requested scope are searched, and if a discovery
//! service is reachable the search is repeated, re-issuing remote queries
//! periodically, until the discovery timeout. Each candidate is tried in
//! order; the first that loads wins.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use group_telemetry::metrics;
use shared_types::{
    AdvertisementKind, ModuleClassId, ModuleImplAdvertisement, ModuleSpecId, PeerGroupId, ATTR_MSID,
};
use tracing::{debug, info, warn};

use crate::api::{PeerGroupApi, Scope};
use crate::error::{PeerGroupError, Result};
use crate::factory::ModuleFactories;
use crate::module::{isolate, stop_isolated, Module};
use crate::store::{ContentStore, DEFAULT_LIFETIME};

/// Discovery polling budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Total time a spec-id lookup may block waiting for remote results.
    pub discovery_timeout: Duration,
    /// Minimum spacing between remote queries.
    pub requery_interval: Duration,
    /// How often the local stores are re-searched while waiting.
    pub poll_interval: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            discovery_timeout: Duration::from_secs(120),
            requery_interval: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// What the loader needs from the group it loads into.
pub(crate) trait LoadHost {
    fn host_group_id(&self) -> PeerGroupId;

    /// The handle passed to a module's `init`.
    fn module_handle(&self, privileged: bool) -> Result<Arc<dyn PeerGroupApi>>;

    /// Stores searched for candidates in `scope`.
    fn stores_in(&self, scope: Scope) -> Vec<Arc<dyn ContentStore>>;

    /// Running modules offering a discovery capability in `scope`.
    fn discovery_in(&self, scope: Scope) -> Vec<Arc<dyn Module>>;

    /// Where loaded implementations are published.
    fn local_store(&self) -> Option<Arc<dyn ContentStore>>;
}

pub(crate) struct ModuleLoader {
    factories: Arc<ModuleFactories>,
    config: LoaderConfig,
}

impl ModuleLoader {
    pub(crate) fn new(factories: Arc<ModuleFactories>, config: LoaderConfig) -> Self {
        Self { factories, config }
    }

    pub(crate) fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub(crate) fn factories(&self) -> &Arc<ModuleFactories> {
        &self.factories
    }

    /// Load one implementation.
    pub(crate) fn load_impl(
        &self,
        host: &dyn LoadHost,
        assigned_id: &ModuleClassId,
        impl_adv: &ModuleImplAdvertisement,
        privileged: bool,
    ) -> Result<Arc<dyn Module>> {
        if let Err(source) = impl_adv.compat.check() {
            metrics::module_failed("compat");
            return Err(PeerGroupError::Compatibility {
                spec_id: impl_adv.module_spec_id,
                source,
            });
        }

        let factory = self.factories.factory_for(&impl_adv.code).ok_or_else(|| {
            metrics::module_failed("resolve");
            PeerGroupError::ResolutionFailure(format!(
                "no factory registered for code {}",
                impl_adv.code
            ))
        })?;

        let module = isolate(|| factory()).map_err(|source| PeerGroupError::InitializationFailure {
            class_id: *assigned_id,
            source,
        })?;

        let handle = module_handle_or_fail(host, privileged, assigned_id)?;
        let outcome = isolate(|| module.init(handle, assigned_id, impl_adv)).and_then(|r| r);
        if let Err(source) = outcome {
            metrics::module_failed("init");
            if let Err(e) = stop_isolated(module.as_ref()) {
                debug!("[Loader] Stopping half-initialized {} failed: {}", assigned_id, e);
            }
            return Err(PeerGroupError::InitializationFailure {
                class_id: *assigned_id,
                source,
            });
        }

        debug!(
            group = %host.host_group_id(),
            "[Loader] Loaded {} as {} (privileged={})",
            impl_adv.code, assigned_id, privileged
        );

        if let Some(store) = host.local_store() {
            if let Err(e) = store.publish(impl_adv.clone().into(), DEFAULT_LIFETIME) {
                debug!("[Loader] Could not publish {}: {}", impl_adv.code, e);
            }
        }

        Ok(module)
    }

    /// Load the first working implementation of `spec_id`.
    pub(crate) fn load_spec(
        &self,
        host: &dyn LoadHost,
        assigned_id: &ModuleClassId,
        spec_id: &ModuleSpecId,
        scope: Scope,
        privileged: bool,
    ) -> Result<Arc<dyn Module>> {
        let candidates = self.find_candidates(host, spec_id, scope);
        if candidates.is_empty() {
            metrics::module_failed("resolve");
            return Err(PeerGroupError::ResolutionFailure(format!(
                "no implementation of {spec_id} found"
            )));
        }

        let tried = candidates.len();
        for adv in candidates {
            match self.load_impl(host, assigned_id, &adv, privileged) {
                Ok(module) => return Ok(module),
                Err(e) => warn!(
                    group = %host.host_group_id(),
                    "[Loader] Candidate {} for {} rejected: {}",
                    adv.code, spec_id, e
                ),
            }
        }

        Err(PeerGroupError::ResolutionFailure(format!(
            "all {tried} candidate(s) for {spec_id} failed"
        )))
    }

    pub(crate) fn find_candidates(
        &self,
        host: &dyn LoadHost,
        spec_id: &ModuleSpecId,
        scope: Scope,
    ) -> Vec<ModuleImplAdvertisement> {
        let known = self.factories.impls_for_spec(spec_id);
        if !known.is_empty() {
            return known;
        }

        let stores = host.stores_in(scope);
        let found = search_stores(&stores, spec_id);
        if !found.is_empty() {
            return found;
        }

        let discoveries = host.discovery_in(scope);
        if discoveries.is_empty() {
            debug!("[Loader] No discovery service in {:?} scope, {} not found locally", scope, spec_id);
            return Vec::new();
        }

        info!(
            group = %host.host_group_id(),
            "[Loader] Waiting up to {:?} for implementations of {}",
            self.config.discovery_timeout, spec_id
        );

        let value = spec_id.to_string();
        let deadline = Instant::now() + self.config.discovery_timeout;
        let mut next_query = Instant::now();

        loop {
            let now = Instant::now();
            if now >= next_query {
                for module in &discoveries {
                    if let Some(discovery) = module.discovery() {
                        if let Err(e) =
                            discovery.remote_query(AdvertisementKind::ModuleImpl, ATTR_MSID, &value)
                        {
                            debug!("[Loader] Remote query for {} failed: {}", spec_id, e);
                        }
                    }
                }
                next_query = now + self.config.requery_interval;
            }

            let found = search_stores(&stores, spec_id);
            if !found.is_empty() {
                return found;
            }

            let now = Instant::now();
            if now >= deadline {
                warn!("[Loader] Gave up waiting for implementations of {}", spec_id);
                return Vec::new();
            }
            thread::sleep(self.config.poll_interval.min(deadline - now));
        }
    }
}

fn module_handle_or_fail(
    host: &dyn LoadHost,
    privileged: bool,
    assigned_id: &ModuleClassId,
) -> Result<Arc<dyn PeerGroupApi>> {
    host.module_handle(privileged).map_err(|e| {
        warn!("[Loader] No group handle for {}: {}", assigned_id, e);
        e
    })
}

/// Implementations of exactly `spec_id` found in `stores`, deduplicated.
fn search_stores(
    stores: &[Arc<dyn ContentStore>],
    spec_id: &ModuleSpecId,
) -> Vec<ModuleImplAdvertisement> {
    let value = spec_id.to_string();
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for store in stores {
        let advs = match store.search(AdvertisementKind::ModuleImpl, ATTR_MSID, &value) {
            Ok(advs) => advs,
            Err(e) => {
                debug!("[Loader] Store search failed: {}", e);
                continue;
            }
        };
        for adv in advs {
            if let Some(impl_adv) = adv.as_module_impl() {
                if impl_adv.module_spec_id == *spec_id && seen.insert(impl_adv.key()) {
                    found.push(impl_adv.clone());
                }
            }
        }
    }
    found
}
