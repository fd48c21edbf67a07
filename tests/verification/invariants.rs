//! Invariant checks and contract violation reporting.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::sync::Arc;

use handheld_link::telemetry::{
    CollectingObserver, CompositeObserver, InvariantChecker, ViolationKind, ViolationObserver,
    ViolationSeverity,
};
use handheld_link::{assert_invariants, assert_no_violations, assert_violation, Network, Scheduler};

use crate::common::headless_device;

fn observed_network() -> (Network, Arc<CollectingObserver>) {
    let observer = Arc::new(CollectingObserver::new());
    let network = Network::new().with_observer(observer.clone());
    (network, observer)
}

#[test]
fn normal_use_reports_nothing() {
    let scheduler = Scheduler::manual();
    let (mut network, observer) = observed_network();
    let devices: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|id| headless_device(id, &scheduler))
        .collect();

    for device in &devices {
        network.add_device(device);
    }
    network.remove_device(&devices[1]);
    network.add_device(&devices[1]);
    network.clear();

    assert_no_violations!(observer);
    assert_invariants!(network);
}

#[test]
fn external_disconnect_breaks_the_invariant() {
    let scheduler = Scheduler::manual();
    let (mut network, _observer) = observed_network();
    let a = headless_device("a", &scheduler);
    let b = headless_device("b", &scheduler);
    network.add_device(&a);
    network.add_device(&b);

    a.disconnect_from(&b);

    let violation = network.check_invariants().unwrap_err();
    assert_eq!(violation.type_name, "Network");
    assert!(violation.to_string().contains("not fully connected"));
}

#[test]
fn removing_the_culprit_restores_the_invariant() {
    let scheduler = Scheduler::manual();
    let (mut network, _observer) = observed_network();
    let a = headless_device("a", &scheduler);
    let b = headless_device("b", &scheduler);
    network.add_device(&a);
    network.add_device(&b);
    b.disconnect_from(&a);

    network.remove_device(&b);

    assert!(network.check_invariants().is_ok());
}

#[cfg(debug_assertions)]
#[test]
fn audit_reports_a_broken_graph_after_a_change() {
    let scheduler = Scheduler::manual();
    let (mut network, observer) = observed_network();
    let a = headless_device("a", &scheduler);
    let b = headless_device("b", &scheduler);
    let c = headless_device("c", &scheduler);
    network.add_device(&a);
    network.add_device(&b);
    a.disconnect_from(&b);

    network.add_device(&c);

    assert_violation!(observer, ViolationKind::Invariant);
    let reported = observer.violations_of_kind(ViolationKind::Invariant);
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].severity, ViolationSeverity::Critical);
    assert!(reported[0].message.ends_with("after add_device"));
}

#[test]
fn duplicate_id_is_reported_with_the_device() {
    let scheduler = Scheduler::manual();
    let (mut network, observer) = observed_network();
    let original = headless_device("twin", &scheduler);
    let impostor = headless_device("twin", &scheduler);
    network.add_device(&original);

    assert!(!network.add_device(&impostor));

    let reported = observer.violations_of_kind(ViolationKind::Membership);
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].severity, ViolationSeverity::Error);
    assert_eq!(
        reported[0].device.as_ref().map(ToString::to_string),
        Some("twin".to_owned())
    );
    let json = reported[0].to_json().unwrap();
    assert!(json.contains(r#""kind":"membership""#));
    assert!(network.check_invariants().is_ok());
}

#[test]
fn same_id_devices_cannot_link() {
    let scheduler = Scheduler::manual();
    let first = headless_device("twin", &scheduler);
    let second = headless_device("twin", &scheduler);

    first.connect_to(&second);

    assert!(!first.is_connected_to(&second));
    assert_eq!(second.peer_count(), 0);
}

#[test]
fn composite_observer_fans_out() {
    let scheduler = Scheduler::manual();
    let left = Arc::new(CollectingObserver::new());
    let right = Arc::new(CollectingObserver::new());
    let composite: Arc<dyn ViolationObserver> = Arc::new(CompositeObserver::from_observers(vec![
        left.clone() as Arc<dyn ViolationObserver>,
        right.clone(),
    ]));
    let mut network = Network::new().with_observer(composite);
    network.add_device(&headless_device("x", &scheduler));

    network.add_device(&headless_device("x", &scheduler));

    assert_eq!(left.len(), 1);
    assert_eq!(right.len(), 1);
}
