//! # Reverse Teardown
//!
//! Modules stop in the reverse of the order they finished starting, which is
//! not necessarily the order they were listed in.

#[cfg(test)]
mod tests {
    use peer_group::{PeerGroupApi, StartStatus};

    use crate::fixtures::{Harness, ProbeSpec};

    fn reversed(mut names: Vec<String>) -> Vec<String> {
        names.reverse();
        names
    }

    #[test]
    fn test_stop_order_mirrors_start_order() {
        let harness = Harness::new();
        harness.with_service(&ProbeSpec::ok("x"));
        harness.with_service(&ProbeSpec::ok("y").script(&[StartStatus::AgainStalled]));
        harness.with_service(&ProbeSpec::ok("z"));

        let root = harness.root().unwrap();
        let started = harness.journal.names("start");
        assert_eq!(
            started,
            vec!["endpoint", "resolver", "membership", "access", "x", "z", "y"]
        );

        root.unref();
        assert_eq!(harness.journal.names("stop"), reversed(started));
    }

    #[test]
    fn test_each_module_starts_and_stops_once() {
        let harness = Harness::new();
        harness.with_service(&ProbeSpec::ok("solo"));

        let root = harness.root().unwrap();
        let starts = harness.journal.names("start");
        let position = starts.iter().position(|n| n == "solo").unwrap();

        root.stop_group();
        root.stop_group();

        let stops = harness.journal.names("stop");
        assert_eq!(harness.journal.count("solo:start"), 1);
        assert_eq!(harness.journal.count("solo:stop"), 1);
        assert_eq!(stops.len(), starts.len());
        assert_eq!(stops[stops.len() - 1 - position], "solo");
    }

    #[test]
    fn test_teardown_clears_services_and_pools() {
        let harness = Harness::new();
        let class_id = harness.with_service(&ProbeSpec::ok("held"));
        let root = harness.root().unwrap();
        let weak = root.get_weak_interface().unwrap();
        assert!(weak.lookup_service(&class_id).is_ok());

        root.unref();

        assert!(weak.lookup_service(&class_id).is_err());
        assert!(weak.executor().is_err());
        assert!(weak.scheduled_executor().is_err());
        assert!(weak.content_store().is_none());
        assert!(harness.registry.live_groups().is_empty());
    }
}
