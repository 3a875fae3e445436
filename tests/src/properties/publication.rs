//! # Concurrent Publication
//!
//! A group backed by a directory store can be republished from many
//! threads at once. Every publish succeeds and the store ends up holding
//! one record for the group.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use peer_group::{GroupBuilder, PeerGroupApi, StoreLocation};
    use shared_types::{AdvertisementKind, PeerGroupId, ATTR_GID};

    use crate::fixtures::{fast_loader, small_pools, Harness};

    const WRITERS: usize = 8;
    const ROUNDS: usize = 100;

    #[test]
    fn test_concurrent_republish_of_one_group() {
        let harness = Harness::new();
        let dir = tempfile::tempdir().unwrap();
        let root = GroupBuilder::root(Arc::clone(&harness.registry))
            .with_impl(harness.group_impl())
            .with_store(StoreLocation::Directory(dir.path().to_path_buf()))
            .with_pool_config(small_pools())
            .with_loader_config(fast_loader())
            .build()
            .unwrap();

        let failures: usize = thread::scope(|s| {
            let writers: Vec<_> = (0..WRITERS)
                .map(|w| {
                    let root = &root;
                    s.spawn(move || {
                        (0..ROUNDS)
                            .filter(|_| root.publish_group("world", &format!("writer {w}")).is_err())
                            .count()
                    })
                })
                .collect();
            writers.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(failures, 0);
        let store = root.content_store().unwrap();
        let found = store
            .search(AdvertisementKind::PeerGroup, ATTR_GID, &PeerGroupId::WORLD.to_string())
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].as_peer_group().unwrap().description.starts_with("writer "));
    }
}
