//! # Peer Node
//!
//! Boots the root group from a [`PlatformConfig`] and owns it until
//! shutdown.
//!
//! ## Startup Sequence
//!
//! 1. Validate the configuration
//! 2. Register the reference service implementations
//! 3. Build the root group (loads, starts and checks the required services)
//! 4. Hold the root handle until shutdown
//!
//! ## Shutdown Sequence
//!
//! 1. Release the root handle
//! 2. Stop every group still registered, newest first

use std::sync::Arc;

use anyhow::{Context, Result};
use peer_group::{GroupBuilder, GroupInterface, GroupRegistry, PeerGroupApi};
use shared_types::{ModuleImplAdvertisement, PeerGroupId};
use tracing::info;

use crate::config::PlatformConfig;
use crate::services::register_reference_modules;

/// A running peer: the root group and the registry it lives in.
pub struct PeerNode {
    registry: Arc<GroupRegistry>,
    root: GroupInterface,
}

impl PeerNode {
    /// Boot using the process-wide registry.
    pub fn boot(config: &PlatformConfig) -> Result<Self> {
        Self::boot_in(GroupRegistry::global(), config)
    }

    /// Boot using `registry`, registering the reference services into its factories.
    pub fn boot_in(registry: Arc<GroupRegistry>, config: &PlatformConfig) -> Result<Self> {
        config.validate().context("Invalid platform configuration")?;
        register_reference_modules(registry.factories());

        let root = GroupBuilder::root(Arc::clone(&registry))
            .with_config(config.group_config())
            .with_loader_config(config.loader_config())
            .with_pool_config(config.pool_config())
            .with_store(config.store_location())
            .build()
            .context("Failed to start the root group")?;

        info!(
            group = %root.peer_group_id(),
            peer = %root.peer_id(),
            services = root.running_modules().len(),
            "[Node] ✓ Peer {} is up", root.peer_name()
        );
        Ok(Self { registry, root })
    }

    pub fn root(&self) -> &GroupInterface {
        &self.root
    }

    pub fn registry(&self) -> &Arc<GroupRegistry> {
        &self.registry
    }

    /// Create and start a standard subgroup of the root group.
    pub fn create_group(&self, name: &str, description: &str) -> Result<GroupInterface> {
        self.root
            .new_group_with_impl(None, &ModuleImplAdvertisement::std_group(), name, description)
            .with_context(|| format!("Failed to create group {name}"))
    }

    /// The running subgroup `gid`, or a new instance built from its advertisement.
    pub fn join_group(&self, gid: &PeerGroupId) -> Result<GroupInterface> {
        self.root
            .new_group(gid)
            .with_context(|| format!("Failed to join group {gid}"))
    }

    /// Release the root and stop every remaining group.
    pub fn shutdown(self) {
        info!("[Node] Shutting down");
        let Self { registry, root } = self;
        drop(root);
        registry.shutdown();
        info!("[Node] ✓ Shutdown complete");
    }
}
