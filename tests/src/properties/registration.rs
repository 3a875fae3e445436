//! # Group Registration
//!
//! At most one live group exists per id in a registry. Asking for a group
//! that is already running hands back the running instance; two racing
//! constructions of the same id leave exactly one winner.

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use peer_group::{GroupBuilder, GroupInterface, PeerGroupApi, PeerGroupError, Result};
    use shared_types::{ModuleImplAdvertisement, PeerGroupId};

    use crate::fixtures::Harness;

    /// Run `build` on two threads released together.
    fn race<F>(build: F) -> Vec<Result<GroupInterface>>
    where
        F: Fn() -> Result<GroupInterface> + Sync,
    {
        let barrier = Barrier::new(2);
        thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        build()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    fn assert_single_winner(results: &[Result<GroupInterface>], gid: PeerGroupId) {
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        for result in results {
            if let Err(e) = result {
                assert!(
                    matches!(e, PeerGroupError::DuplicateRegistration(id) if *id == gid),
                    "unexpected error {e:?}"
                );
            }
        }
    }

    #[test]
    fn test_running_group_is_returned_not_rebuilt() {
        let harness = Harness::new();
        let root = harness.root().unwrap();
        let gid = PeerGroupId::new();

        let created = root
            .new_group_with_impl(Some(gid), &ModuleImplAdvertisement::std_group(), "chat", "team chat")
            .unwrap();
        let starts = harness.journal.names("start").len();

        let again = root.new_group(&gid).unwrap();
        let from_registry = harness.registry.lookup(&gid).unwrap();

        assert!(again.same_group(&created));
        assert!(from_registry.same_group(&created));
        assert_eq!(harness.journal.names("start").len(), starts);
        assert_eq!(created.reference_count(), 3);
    }

    #[test]
    fn test_concurrent_child_builds_leave_one_group() {
        let harness = Harness::new();
        let root = harness.root().unwrap();
        let gid = PeerGroupId::new();

        let results = race(|| GroupBuilder::child(&root).with_group_id(gid).build());

        assert_single_winner(&results, gid);
        assert!(harness.registry.contains(&gid));
        assert_eq!(harness.registry.live_groups(), vec![PeerGroupId::WORLD, gid]);
    }

    #[test]
    fn test_concurrent_new_group_with_impl_leaves_one_group() {
        let harness = Harness::new();
        let root = harness.root().unwrap();
        let gid = PeerGroupId::new();
        let std_group = ModuleImplAdvertisement::std_group();

        let results = race(|| root.new_group_with_impl(Some(gid), &std_group, "race", ""));

        assert_single_winner(&results, gid);
        let winner = results.into_iter().find_map(|r| r.ok()).unwrap();
        assert!(winner.is_running());
        assert_eq!(winner.peer_group_id(), gid);
    }

    #[test]
    fn test_id_is_free_again_after_stop() {
        let harness = Harness::new();
        let root = harness.root().unwrap();
        let gid = PeerGroupId::new();

        let first = GroupBuilder::child(&root).with_group_id(gid).build().unwrap();
        assert!(matches!(
            GroupBuilder::child(&root).with_group_id(gid).build(),
            Err(PeerGroupError::DuplicateRegistration(_))
        ));

        drop(first);
        assert!(!harness.registry.contains(&gid));
        let second = GroupBuilder::child(&root).with_group_id(gid).build().unwrap();
        assert!(second.is_running());
    }
}
