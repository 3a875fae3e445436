//! Booting a peer with the reference services against a private registry.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use node_runtime::services::{AlwaysAccessService, EndpointService, LocalDiscoveryService, ResolverService};
use node_runtime::{PeerNode, PlatformConfig};
use peer_group::{DiscoveryService, GroupRegistry, ModuleFactories, PeerGroupApi};
use shared_types::{well_known, AdvertisementKind, PeerGroupId, ATTR_GID};

// =============================================================================
// TEST HELPERS
// =============================================================================

fn test_config() -> PlatformConfig {
    let mut config = PlatformConfig::default();
    config.peer.name = "test-peer".to_string();
    config.pool.core_threads = 1;
    config.pool.max_threads = 2;
    config.loader.discovery_timeout_secs = 1;
    config.loader.requery_interval_secs = 1;
    config.loader.poll_interval_ms = 10;
    config
}

fn boot() -> PeerNode {
    let registry = Arc::new(GroupRegistry::new(Arc::new(ModuleFactories::new())));
    PeerNode::boot_in(registry, &test_config()).expect("node boots")
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

// =============================================================================
// TESTS
// =============================================================================

#[test]
fn test_root_runs_all_reference_services() {
    let node = boot();
    let root = node.root();

    assert!(root.is_running());
    assert_eq!(root.peer_name(), "test-peer");
    assert_eq!(root.running_modules().len(), 5);

    let endpoint = root.lookup_service(&well_known::ENDPOINT_CLASS).unwrap();
    let endpoint = endpoint.downcast_ref::<EndpointService>().unwrap();
    assert_eq!(endpoint.local_peer(), Some(root.peer_id()));

    // The resolver attached itself to the endpoint while starting.
    let resolver = root.lookup_service(&well_known::RESOLVER_CLASS).unwrap();
    let resolver = resolver.downcast_ref::<ResolverService>().unwrap();
    endpoint.send("resolver", b"query".to_vec()).unwrap();
    assert_eq!(resolver.query_count(), 1);

    let access = root.lookup_service(&well_known::ACCESS_CLASS).unwrap();
    assert!(access.downcast_ref::<AlwaysAccessService>().is_some());
}

#[test]
fn test_dependent_services_start_after_their_dependencies() {
    let node = boot();
    let order = node.root().start_order();
    let position = |class| order.iter().position(|c| *c == class).unwrap();

    assert!(position(well_known::ENDPOINT_CLASS) < position(well_known::RESOLVER_CLASS));
    assert!(position(well_known::MEMBERSHIP_CLASS) < position(well_known::ACCESS_CLASS));
}

#[test]
fn test_disabled_discovery_is_not_loaded() {
    let mut config = test_config();
    config.services.entry(well_known::DISCOVERY_CLASS).or_default().enabled = false;
    let registry = Arc::new(GroupRegistry::new(Arc::new(ModuleFactories::new())));

    let node = PeerNode::boot_in(registry, &config).unwrap();
    assert_eq!(node.root().running_modules().len(), 4);
    assert!(node.root().lookup_service(&well_known::DISCOVERY_CLASS).is_err());
}

#[test]
fn test_subgroups_are_shared_and_stopped_at_shutdown() {
    let node = boot();
    let chat = node.create_group("chat", "team chat").unwrap();
    let gid = chat.peer_group_id();

    let joined = node.join_group(&gid).unwrap();
    assert!(joined.same_group(&chat));
    assert_eq!(joined.peer_id().unique(), node.root().peer_id().unique());

    let registry = Arc::clone(node.registry());
    assert_eq!(registry.live_groups(), vec![PeerGroupId::WORLD, gid]);

    node.shutdown();
    assert!(registry.live_groups().is_empty());
    assert!(!chat.is_running());
}

#[test]
fn test_discovery_pulls_advertisements_from_enclosing_groups() {
    let node = boot();
    let chat = node.create_group("chat", "").unwrap();
    let world = PeerGroupId::WORLD.to_string();

    let own_store = chat.content_store().unwrap();
    assert!(own_store
        .search(AdvertisementKind::PeerGroup, ATTR_GID, &world)
        .unwrap()
        .is_empty());

    let discovery = chat.lookup_service(&well_known::DISCOVERY_CLASS).unwrap();
    let discovery = discovery.downcast_ref::<LocalDiscoveryService>().unwrap();
    discovery
        .remote_query(AdvertisementKind::PeerGroup, ATTR_GID, &world)
        .unwrap();

    assert!(wait_until(|| {
        own_store
            .search(AdvertisementKind::PeerGroup, ATTR_GID, &world)
            .map(|found| !found.is_empty())
            .unwrap_or(false)
    }));
}

#[test]
fn test_invalid_config_is_rejected_before_boot() {
    let mut config = test_config();
    config.pool.max_threads = 0;
    let registry = Arc::new(GroupRegistry::new(Arc::new(ModuleFactories::new())));

    assert!(PeerNode::boot_in(Arc::clone(&registry), &config).is_err());
    assert!(registry.live_groups().is_empty());
}
