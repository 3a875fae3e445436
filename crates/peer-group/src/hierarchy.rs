//! # Group Hierarchy
//!
//! Root and child groups are the same [`StdPeerGroup`] built with different
//! settings:
//!
//! - **Root**: no parent, at most one per registry. Uses the supplied
//!   configuration or synthesizes one, and publishes every registered
//!   implementation into its own store.
//! - **Standard child**: the parent's configuration with the supplied one
//!   laid over it.
//! - **Config-inheriting child**: the parent's configuration verbatim, plus
//!   an optional top-level application started after everything else and
//!   stopped before anything else.
//!
//! A group handle is only returned once construction and `start_app` both
//! succeeded; any partial construction is torn down first.

use std::sync::Arc;

use shared_types::{
    ConfigParams, ModuleClassId, ModuleImplAdvertisement, PeerGroupAdvertisement, PeerGroupId,
};
use tracing::{info, warn};

use crate::api::PeerGroupApi;
use crate::error::{PeerGroupError, Result};
use crate::group::{StdPeerGroup, StoreLocation};
use crate::group_core::ConfigSource;
use crate::interface::GroupInterface;
use crate::loader::LoaderConfig;
use crate::pool::PoolConfig;
use crate::registry::GroupRegistry;

const ROOT_GROUP_NAME: &str = "World";

/// Construction-time flavour of a group.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupVariant {
    Root,
    Standard,
    InheritConfig {
        top_level_app: Option<(ModuleClassId, ModuleImplAdvertisement)>,
    },
}

/// Everything needed to allocate a group.
pub(crate) struct GroupSettings {
    pub(crate) registry: Arc<GroupRegistry>,
    pub(crate) group_adv: PeerGroupAdvertisement,
    pub(crate) impl_adv: ModuleImplAdvertisement,
    pub(crate) variant: GroupVariant,
    pub(crate) loader_config: LoaderConfig,
    pub(crate) pool_config: PoolConfig,
    pub(crate) store_location: StoreLocation,
}

/// Allocate, construct and start a group, returning the caller's handle.
pub(crate) fn construct(
    settings: GroupSettings,
    parent: Option<GroupInterface>,
    source: ConfigSource,
    args: &[String],
) -> Result<GroupInterface> {
    let group = StdPeerGroup::new(settings);
    let gid = group.peer_group_id();

    if let Err(e) = group.init(parent, source) {
        warn!(group = %gid, "[Group] ✗ Construction failed: {}", e);
        group.stop_app();
        return Err(e);
    }

    // Taken before the applications start so that handles they acquire and
    // release while starting can never bring the count back to zero.
    let handle = match group.get_interface() {
        Ok(handle) => handle,
        Err(e) => {
            group.stop_app();
            return Err(e);
        }
    };

    if let Err(e) = group.start_app(args) {
        warn!(group = %gid, "[Group] ✗ Applications failed to start: {}", e);
        handle.stop_group();
        return Err(e);
    }
    Ok(handle)
}

/// Builds root and child groups.
///
/// ```rust,ignore
/// let registry = Arc::new(GroupRegistry::new(factories));
/// let root = GroupBuilder::root(Arc::clone(&registry)).build()?;
/// let child = GroupBuilder::child(&root).with_name("chat", "team chat").build()?;
/// ```
pub struct GroupBuilder {
    registry: Arc<GroupRegistry>,
    parent: Option<Arc<StdPeerGroup>>,
    variant: GroupVariant,
    gid: Option<PeerGroupId>,
    name: String,
    description: String,
    group_adv: Option<PeerGroupAdvertisement>,
    impl_adv: Option<ModuleImplAdvertisement>,
    config: Option<ConfigParams>,
    loader_config: Option<LoaderConfig>,
    pool_config: Option<PoolConfig>,
    store_location: Option<StoreLocation>,
    args: Vec<String>,
}

impl GroupBuilder {
    fn with_variant(registry: Arc<GroupRegistry>, parent: Option<Arc<StdPeerGroup>>, variant: GroupVariant) -> Self {
        Self {
            registry,
            parent,
            variant,
            gid: None,
            name: String::new(),
            description: String::new(),
            group_adv: None,
            impl_adv: None,
            config: None,
            loader_config: None,
            pool_config: None,
            store_location: None,
            args: Vec::new(),
        }
    }

    /// The process's root group, registered in `registry`.
    pub fn root(registry: Arc<GroupRegistry>) -> Self {
        let mut builder = Self::with_variant(registry, None, GroupVariant::Root);
        builder.name = ROOT_GROUP_NAME.to_string();
        builder
    }

    /// A subgroup of `parent` layering its own configuration over the parent's.
    pub fn child(parent: &GroupInterface) -> Self {
        let group = Arc::clone(parent.group());
        Self::with_variant(Arc::clone(group.registry()), Some(group), GroupVariant::Standard)
    }

    /// A subgroup of `parent` running with exactly the parent's configuration.
    pub fn inheriting(parent: &GroupInterface) -> Self {
        let group = Arc::clone(parent.group());
        Self::with_variant(
            Arc::clone(group.registry()),
            Some(group),
            GroupVariant::InheritConfig { top_level_app: None },
        )
    }

    /// Application started after the group's own modules, inheriting groups only.
    #[must_use]
    pub fn with_top_level_app(mut self, class_id: ModuleClassId, impl_adv: ModuleImplAdvertisement) -> Self {
        match &mut self.variant {
            GroupVariant::InheritConfig { top_level_app } => *top_level_app = Some((class_id, impl_adv)),
            _ => warn!("[Group] Top-level application ignored: only inheriting groups run one"),
        }
        self
    }

    #[must_use]
    pub fn with_group_id(mut self, gid: PeerGroupId) -> Self {
        self.gid = Some(gid);
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.name = name.into();
        self.description = description.into();
        self
    }

    /// Use `adv` as the group's advertisement; overrides id and name.
    #[must_use]
    pub fn with_group_advertisement(mut self, adv: PeerGroupAdvertisement) -> Self {
        self.group_adv = Some(adv);
        self
    }

    /// Run `impl_adv` instead of the standard group implementation.
    #[must_use]
    pub fn with_impl(mut self, impl_adv: ModuleImplAdvertisement) -> Self {
        self.impl_adv = Some(impl_adv);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: ConfigParams) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn with_loader_config(mut self, config: LoaderConfig) -> Self {
        self.loader_config = Some(config);
        self
    }

    #[must_use]
    pub fn with_pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = Some(config);
        self
    }

    #[must_use]
    pub fn with_store(mut self, location: StoreLocation) -> Self {
        self.store_location = Some(location);
        self
    }

    /// Arguments passed to every application's `start_app`.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Construct and start the group.
    pub fn build(self) -> Result<GroupInterface> {
        let Self {
            registry,
            parent,
            variant,
            gid,
            name,
            description,
            group_adv,
            impl_adv,
            config,
            loader_config,
            pool_config,
            store_location,
            args,
        } = self;

        let is_root = matches!(variant, GroupVariant::Root);
        if !is_root && parent.is_none() {
            return Err(PeerGroupError::MissingParent);
        }

        let impl_adv = impl_adv.unwrap_or_else(ModuleImplAdvertisement::std_group);
        let group_adv = group_adv.unwrap_or_else(|| {
            let default_gid = if is_root { PeerGroupId::WORLD } else { PeerGroupId::new() };
            PeerGroupAdvertisement::new(gid.unwrap_or(default_gid), impl_adv.module_spec_id, name)
                .with_description(description)
        });

        let source = match &variant {
            GroupVariant::Root => ConfigSource::Root(config),
            GroupVariant::Standard => ConfigSource::Overlay(config),
            GroupVariant::InheritConfig { .. } => {
                if config.is_some() {
                    warn!("[Group] Supplied configuration ignored: group inherits its parent's");
                }
                ConfigSource::Inherit
            }
        };

        let settings = GroupSettings {
            registry: Arc::clone(&registry),
            group_adv,
            impl_adv,
            loader_config: loader_config
                .or_else(|| parent.as_ref().map(|p| p.loader_config().clone()))
                .unwrap_or_default(),
            pool_config: pool_config
                .or_else(|| parent.as_ref().map(|p| p.core().pool_config().clone()))
                .unwrap_or_default(),
            store_location: store_location
                .or_else(|| parent.as_ref().map(|p| p.store_location().clone()))
                .unwrap_or_default(),
            variant,
        };

        if is_root {
            registry.claim_root()?;
            let result = construct(settings, None, source, &args);
            match &result {
                Ok(handle) => {
                    registry.set_root(handle.group());
                    info!(group = %handle.peer_group_id(), "[Group] ✓ Root group running");
                }
                Err(_) => registry.release_root(),
            }
            return result;
        }

        let parent_handle = match &parent {
            Some(p) => p.get_interface()?,
            None => return Err(PeerGroupError::MissingParent),
        };
        construct(settings, Some(parent_handle), source, &args)
    }
}
