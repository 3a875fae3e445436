//! # Startup Convergence
//!
//! The coordinator has no dependency graph: modules that wait on each other
//! report `Again*` until they can run. These tests pin down that:
//!
//! 1. A set that never makes progress fails in a bounded number of rounds,
//!    naming every module left behind
//! 2. A module waiting on another starts once the other one is up
//! 3. Modules that disable themselves or fail are dropped without failing
//!    the group

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use peer_group::{PeerGroupApi, PeerGroupError, StartStatus};
    use shared_types::{ModuleClassId, PeerGroupId};

    use crate::fixtures::{Harness, ProbeSpec};

    const REQUIRED_SERVICES: usize = 4;

    #[test]
    fn test_stalled_modules_fail_in_bounded_rounds() {
        let harness = Harness::new();
        let probes: Vec<ProbeSpec> = (0..3)
            .map(|i| ProbeSpec::ok(&format!("stuck-{i}")).then_always(StartStatus::AgainStalled))
            .collect();
        let classes: HashSet<_> = probes.iter().map(|p| harness.with_service(p)).collect();

        let result = harness.root();

        let remaining = match result {
            Err(PeerGroupError::ConvergenceFailure { group, remaining }) => {
                assert_eq!(group, PeerGroupId::WORLD);
                remaining
            }
            other => panic!("expected convergence failure, got {other:?}"),
        };
        let reported: HashSet<_> = remaining.iter().map(|(class_id, _)| *class_id).collect();
        assert_eq!(reported, classes);

        let total = probes.len() + REQUIRED_SERVICES;
        for probe in &probes {
            assert!(probe.calls() > 1);
            assert!(probe.calls() <= total * total + 1, "{} calls", probe.calls());
        }
    }

    #[test]
    fn test_failed_convergence_leaves_nothing_behind() {
        let harness = Harness::new();
        let stuck = ProbeSpec::ok("stuck").then_always(StartStatus::AgainStalled);
        harness.with_service(&stuck);

        assert!(harness.root().is_err());

        assert!(harness.registry.live_groups().is_empty());
        assert!(harness.registry.root().is_none());
        // Everything that started was stopped; the stalled module never ran.
        let mut started = harness.journal.names("start");
        let mut stopped = harness.journal.names("stop");
        started.sort();
        stopped.sort();
        assert_eq!(started, stopped);
        assert!(!started.contains(&"stuck".to_string()));
    }

    #[test]
    fn test_waiting_module_starts_after_its_dependency() {
        let harness = Harness::new();
        let dependency_class = ModuleClassId::new();
        // Listed before its dependency, so every round tries it first.
        let dependent_class = harness.with_service(&ProbeSpec::ok("a").waits_for(dependency_class));
        harness.with_service_as(
            dependency_class,
            &ProbeSpec::ok("b").script(&[StartStatus::AgainProgress, StartStatus::AgainProgress]),
        );

        let root = harness.root().unwrap();

        let started = harness.journal.names("start");
        let a = started.iter().position(|n| n == "a").unwrap();
        let b = started.iter().position(|n| n == "b").unwrap();
        assert!(b < a);
        let order = root.start_order();
        let a = order.iter().position(|c| *c == dependent_class).unwrap();
        let b = order.iter().position(|c| *c == dependency_class).unwrap();
        assert!(b < a);
    }

    #[test]
    fn test_briefly_stalled_module_still_starts() {
        let harness = Harness::new();
        let slow = ProbeSpec::ok("slow").script(&[StartStatus::AgainStalled, StartStatus::AgainStalled]);
        let class_id = harness.with_service(&slow);

        let root = harness.root().unwrap();
        assert!(root.lookup_service(&class_id).is_ok());
        assert_eq!(slow.calls(), 3);
    }

    #[test]
    fn test_disabled_and_failed_modules_are_dropped() {
        let harness = Harness::new();
        let disabled = harness.with_service(&ProbeSpec::ok("off").then_always(StartStatus::Disabled));
        let failed = harness.with_service(
            &ProbeSpec::ok("broken").script(&[StartStatus::AgainProgress]).then_always(StartStatus::Failed),
        );

        let root = harness.root().unwrap();
        assert!(root.is_running());
        assert!(matches!(root.lookup_service(&disabled), Err(PeerGroupError::ServiceNotFound(_))));
        assert!(matches!(root.lookup_service(&failed), Err(PeerGroupError::ServiceNotFound(_))));

        root.unref();
        let stopped = harness.journal.names("stop");
        assert!(!stopped.contains(&"off".to_string()));
        assert!(!stopped.contains(&"broken".to_string()));
        assert_eq!(stopped.len(), REQUIRED_SERVICES);
    }
}
