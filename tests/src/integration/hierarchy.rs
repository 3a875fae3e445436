//! # Group Hierarchy
//!
//! Tests for:
//! - Identity and configuration flowing from the root to nested subgroups
//! - Loading modules by specification through the parent chain
//! - Rejection of incompatible and unresolvable implementations
//! - Process-wide shutdown

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use node_runtime::services::{ResolverService, RESOLVER_CODE};
    use node_runtime::{PeerNode, PlatformConfig};
    use peer_group::{GroupRegistry, ModuleFactories, PeerGroupApi, PeerGroupError, Scope};
    use shared_types::{
        well_known, CompatibilityStatement, ModuleClassId, ModuleImplAdvertisement, ModuleSpecId,
        PeerGroupId,
    };

    // =========================================================================
    // TEST HELPERS
    // =========================================================================

    fn test_config() -> PlatformConfig {
        let mut config = PlatformConfig::default();
        config.peer.name = "hierarchy-peer".to_string();
        config.pool.core_threads = 1;
        config.pool.max_threads = 2;
        config.loader.discovery_timeout_secs = 1;
        config.loader.requery_interval_secs = 1;
        config.loader.poll_interval_ms = 10;
        config
    }

    fn boot() -> PeerNode {
        let registry = Arc::new(GroupRegistry::new(Arc::new(ModuleFactories::new())));
        PeerNode::boot_in(registry, &test_config()).unwrap()
    }

    // =========================================================================
    // NESTING
    // =========================================================================

    #[test]
    fn test_three_level_hierarchy_shares_peer_identity() {
        let node = boot();
        let root = node.root();
        let team = node.create_group("team", "first level").unwrap();
        let room = team
            .new_group_with_impl(None, &ModuleImplAdvertisement::std_group(), "room", "second level")
            .unwrap();

        assert_eq!(
            node.registry().live_groups(),
            vec![PeerGroupId::WORLD, team.peer_group_id(), room.peer_group_id()]
        );

        let parent = room.parent().unwrap();
        assert_eq!(parent.peer_group_id(), team.peer_group_id());
        let grandparent = parent.parent().unwrap();
        assert_eq!(grandparent.peer_group_id(), PeerGroupId::WORLD);

        // One peer, seen from three groups.
        assert_eq!(room.peer_id().unique(), root.peer_id().unique());
        assert_eq!(room.peer_id().group(), room.peer_group_id());
        assert_eq!(room.peer_name(), "hierarchy-peer");
        assert_eq!(room.running_modules().len(), root.running_modules().len());
    }

    #[test]
    fn test_parent_stays_up_while_child_holds_it() {
        let node = boot();
        let team = node.create_group("team", "").unwrap();
        let room = team
            .new_group_with_impl(None, &ModuleImplAdvertisement::std_group(), "room", "")
            .unwrap();
        let team_weak = team.get_weak_interface().unwrap();

        drop(team);
        assert!(team_weak.is_running());

        drop(room);
        assert!(!team_weak.is_running());
        assert_eq!(node.registry().live_groups(), vec![PeerGroupId::WORLD]);
    }

    // =========================================================================
    // LOADING
    // =========================================================================

    #[test]
    fn test_child_loads_spec_from_parent_scope() {
        let node = boot();
        let team = node.create_group("team", "").unwrap();

        let module = team
            .load_module_by_spec(&ModuleClassId::new(), &well_known::REF_RESOLVER_SPEC, Scope::FromParent)
            .unwrap();

        assert!(module.downcast_ref::<ResolverService>().is_some());
        assert_eq!(team.reference_count(), 1);
    }

    #[test]
    fn test_incompatible_implementation_is_rejected() {
        let node = boot();
        let adv = ModuleImplAdvertisement::new(well_known::REF_RESOLVER_SPEC, RESOLVER_CODE)
            .with_compat(CompatibilityStatement::new());

        let result = node.root().load_module(&ModuleClassId::new(), &adv);

        assert!(matches!(result, Err(PeerGroupError::Compatibility { .. })));
    }

    #[test]
    fn test_unknown_code_is_unresolvable() {
        let node = boot();
        let adv = ModuleImplAdvertisement::new(well_known::REF_RESOLVER_SPEC, "pg.impl.resolver.Missing");

        let result = node.root().load_module(&ModuleClassId::new(), &adv);

        assert!(matches!(result, Err(PeerGroupError::ResolutionFailure(_))));
    }

    #[test]
    fn test_unknown_spec_waits_for_discovery_then_fails() {
        let node = boot();
        let unknown = ModuleSpecId::new(ModuleClassId::new());

        let started = Instant::now();
        let result = node
            .root()
            .load_module_by_spec(&ModuleClassId::new(), &unknown, Scope::Here);

        assert!(matches!(result, Err(PeerGroupError::ResolutionFailure(_))));
        assert!(started.elapsed() >= Duration::from_millis(900));
    }

    // =========================================================================
    // SHUTDOWN
    // =========================================================================

    #[test]
    fn test_shutdown_stops_every_group() {
        let node = boot();
        let registry = Arc::clone(node.registry());
        let team = node.create_group("team", "").unwrap();
        let root = node.root().get_weak_interface().unwrap();

        node.shutdown();

        assert!(!team.is_running());
        assert!(!root.is_running());
        assert!(registry.live_groups().is_empty());
        assert!(registry.root().is_none());
        assert!(team.executor().is_err());
    }
}
