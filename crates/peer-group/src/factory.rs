//! # Module Factories
//!
//! Maps code locators to constructors. Populated once at process startup;
//! the loader resolves every [`ModuleImplAdvertisement::code`] through it.
//!
//! The factories also remember which implementation advertisements were
//! registered for each specification, which is the loader's fast path for
//! spec-id resolution.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use shared_types::{ModuleImplAdvertisement, ModuleSpecId};
use tracing::{debug, warn};

use crate::module::Module;

/// Constructs a fresh, uninitialized module instance.
pub type ModuleFactory = Arc<dyn Fn() -> Arc<dyn Module> + Send + Sync>;

#[derive(Default)]
struct FactoryTables {
    by_code: HashMap<String, ModuleFactory>,
    by_spec: HashMap<ModuleSpecId, Vec<ModuleImplAdvertisement>>,
}

/// Registry of module constructors keyed by code locator.
#[derive(Default)]
pub struct ModuleFactories {
    tables: RwLock<FactoryTables>,
}

impl ModuleFactories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the implementation described by `impl_adv`.
    ///
    /// Registering the same code twice replaces the constructor; the
    /// advertisement is recorded once per (spec, code) pair.
    pub fn register<F>(&self, impl_adv: ModuleImplAdvertisement, factory: F)
    where
        F: Fn() -> Arc<dyn Module> + Send + Sync + 'static,
    {
        let mut tables = self.tables.write();
        debug!(
            "[Factories] Registering {} for {}",
            impl_adv.code, impl_adv.module_spec_id
        );

        if tables
            .by_code
            .insert(impl_adv.code.clone(), Arc::new(factory))
            .is_some()
        {
            warn!("[Factories] Code {} already registered, replacing", impl_adv.code);
        }

        let impls = tables.by_spec.entry(impl_adv.module_spec_id).or_default();
        impls.retain(|known| known.code != impl_adv.code);
        impls.push(impl_adv);
    }

    /// Record an advertisement whose code is resolved by some other
    /// registration, e.g. the standard group implementation.
    pub fn register_advertisement(&self, impl_adv: ModuleImplAdvertisement) {
        let mut tables = self.tables.write();
        let impls = tables.by_spec.entry(impl_adv.module_spec_id).or_default();
        impls.retain(|known| known.code != impl_adv.code);
        impls.push(impl_adv);
    }

    pub fn factory_for(&self, code: &str) -> Option<ModuleFactory> {
        self.tables.read().by_code.get(code).cloned()
    }

    /// Advertisements registered for exactly `spec_id`, in registration order.
    pub fn impls_for_spec(&self, spec_id: &ModuleSpecId) -> Vec<ModuleImplAdvertisement> {
        self.tables
            .read()
            .by_spec
            .get(spec_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Every registered advertisement.
    pub fn known_impls(&self) -> Vec<ModuleImplAdvertisement> {
        self.tables
            .read()
            .by_spec
            .values()
            .flat_map(|impls| impls.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tables.read().by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
