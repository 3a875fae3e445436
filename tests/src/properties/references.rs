//! # Counted References
//!
//! A group is stopped by the release of its last counted reference, but only
//! once construction has completed. References taken and dropped while the
//! group is still being built never stop it. Handles given to the group's
//! own applications are counted but never keep it running.

#[cfg(test)]
mod tests {
    use peer_group::{PeerGroupApi, PeerGroupError, Phase};

    use crate::fixtures::{Harness, ProbeSpec};

    #[test]
    fn test_handle_released_during_init_does_not_stop_group() {
        let harness = Harness::new();
        harness.with_service(&ProbeSpec::ok("eager").handle_in_init());

        let root = harness.root().unwrap();

        assert_eq!(harness.journal.count("eager:handle-released"), 1);
        assert!(root.is_running());
        assert_eq!(root.phase(), Phase::Running);
        assert!(harness.journal.names("stop").is_empty());
        assert_eq!(root.reference_count(), 1);
    }

    #[test]
    fn test_last_release_stops_exactly_once() {
        let harness = Harness::new();
        let root = harness.root().unwrap();
        let second = root.get_interface().unwrap();
        assert_eq!(root.reference_count(), 2);

        assert!(root.unref());
        assert!(second.is_running());
        assert!(harness.journal.names("stop").is_empty());

        assert!(second.unref());
        assert_eq!(second.phase(), Phase::Stopped);
        for name in ["endpoint", "resolver", "membership", "access"] {
            assert_eq!(harness.journal.count(&format!("{name}:stop")), 1, "{name}");
        }

        // Both handles are spent; releasing or dropping them again is a no-op.
        assert!(!root.unref());
        assert!(!second.unref());
        drop(root);
        drop(second);
        assert_eq!(harness.journal.names("stop").len(), 4);
    }

    #[test]
    fn test_released_group_cannot_be_reacquired() {
        let harness = Harness::new();
        let root = harness.root().unwrap();
        let weak = root.get_weak_interface().unwrap();

        root.unref();

        assert!(!weak.is_running());
        assert!(matches!(weak.get_interface(), Err(PeerGroupError::NotAcquirable(_))));
        assert!(!weak.unref());
    }

    #[test]
    fn test_dropping_handle_releases_reference() {
        let harness = Harness::new();
        let root = harness.root().unwrap();
        {
            let _scoped = root.get_interface().unwrap();
            assert_eq!(root.reference_count(), 2);
        }
        assert_eq!(root.reference_count(), 1);
        assert!(root.is_running());

        drop(root);
        assert_eq!(harness.journal.names("stop").len(), 4);
        assert!(harness.registry.root().is_none());
    }

    #[test]
    fn test_application_keeping_its_handle_does_not_pin_group() {
        let harness = Harness::new();
        let kept = harness.with_handle_keeping_app("keeper");
        let root = harness.root().unwrap();
        assert_eq!(harness.journal.count("keeper:start"), 1);
        assert_eq!(root.reference_count(), 2);

        drop(root);

        assert_eq!(harness.journal.count("keeper:stop"), 1);
        assert!(harness.registry.root().is_none());
        assert!(harness.registry.live_groups().is_empty());

        // The kept handle outlives the group and releases nothing when dropped.
        let handle = kept.lock().take().unwrap();
        assert!(matches!(handle.get_interface(), Err(PeerGroupError::NotAcquirable(_))));
        drop(handle);
        assert_eq!(harness.journal.count("keeper:stop"), 1);
    }
}
