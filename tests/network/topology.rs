//! Complete-graph maintenance tests.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use handheld_link::{DeviceEvent, DeviceId, Network, Scheduler};

use crate::common::{assert_complete_graph, headless_device};

#[test]
fn connect_is_symmetric_and_idempotent() {
    let scheduler = Scheduler::manual();
    let a = headless_device("a", &scheduler);
    let b = headless_device("b", &scheduler);

    a.connect_to(&b);
    b.connect_to(&a);

    assert!(a.is_connected_to(&b));
    assert!(b.is_connected_to(&a));
    assert_eq!(a.peer_count(), 1);
    assert_eq!(b.peer_count(), 1);
}

#[test]
fn disconnect_from_either_side_breaks_both_directions() {
    let scheduler = Scheduler::manual();
    let a = headless_device("a", &scheduler);
    let b = headless_device("b", &scheduler);
    a.connect_to(&b);

    b.disconnect_from(&a);

    assert!(!a.is_connected_to(&b));
    assert!(!b.is_connected_to(&a));
    // A second disconnect finds nothing to remove.
    a.disconnect_from(&b);
    assert_eq!(a.peer_count(), 0);
}

#[test]
fn second_peer_with_the_same_id_is_refused() {
    let scheduler = Scheduler::manual();
    let a = headless_device("a", &scheduler);
    let first = headless_device("b", &scheduler);
    let second = headless_device("b", &scheduler);
    a.connect_to(&first);

    a.connect_to(&second);
    second.connect_to(&a);

    assert!(a.is_connected_to(&first));
    assert!(first.is_connected_to(&a));
    assert!(!a.is_connected_to(&second));
    assert_eq!(second.peer_count(), 0);
    assert_eq!(a.peer_count(), 1);
}

#[test]
fn connect_to_self_is_ignored() {
    let device = headless_device("a", &Scheduler::manual());
    device.connect_to(&device);
    assert_eq!(device.peer_count(), 0);
    assert!(!device.is_connected_to(&device));
}

#[test]
fn link_changes_emit_peer_events_on_both_sides() {
    let scheduler = Scheduler::manual();
    let a = headless_device("a", &scheduler);
    let b = headless_device("b", &scheduler);

    a.connect_to(&b);
    a.disconnect_from(&b);

    assert_eq!(
        b.events().collect::<Vec<_>>(),
        vec![
            DeviceEvent::PeerConnected {
                peer: DeviceId::from("a")
            },
            DeviceEvent::PeerDisconnected {
                peer: DeviceId::from("a")
            },
        ]
    );
    assert_eq!(a.events().len(), 2);
}

#[test]
fn joining_device_connects_to_every_member() {
    let scheduler = Scheduler::manual();
    let a = headless_device("a", &scheduler);
    let b = headless_device("b", &scheduler);
    let c = headless_device("c", &scheduler);
    let mut network = Network::new();

    network.add_device(&a);
    network.add_device(&b);
    assert!(a.is_connected_to(&b));
    assert!(network.add_device(&c));

    assert_complete_graph(&[a.clone(), b.clone(), c.clone()]);
    assert_eq!(c.peer_ids(), vec![DeviceId::from("a"), DeviceId::from("b")]);
    assert_eq!(network.device_count(), 3);
}

#[test]
fn members_keep_insertion_order() {
    let scheduler = Scheduler::manual();
    let mut network = Network::new();
    for id in ["z", "m", "a"] {
        network.add_device(&headless_device(id, &scheduler));
    }
    let ids: Vec<String> = network
        .devices()
        .iter()
        .map(|device| device.id().to_string())
        .collect();
    assert_eq!(ids, vec!["z", "m", "a"]);
}

#[test]
fn leaving_device_is_disconnected_from_all_members() {
    let scheduler = Scheduler::manual();
    let a = headless_device("a", &scheduler);
    let b = headless_device("b", &scheduler);
    let c = headless_device("c", &scheduler);
    let mut network = Network::new();
    for device in [&a, &b, &c] {
        network.add_device(device);
    }

    assert!(network.remove_device(&b));

    assert_eq!(b.peer_count(), 0);
    assert!(!a.is_connected_to(&b));
    assert!(!c.is_connected_to(&b));
    assert!(a.is_connected_to(&c));
    assert!(!network.has_device(&b));
    assert_eq!(network.device_count(), 2);
}

#[test]
fn removing_keeps_links_to_outsiders() {
    let scheduler = Scheduler::manual();
    let a = headless_device("a", &scheduler);
    let b = headless_device("b", &scheduler);
    let outsider = headless_device("outsider", &scheduler);
    let mut network = Network::new();
    network.add_device(&a);
    network.add_device(&b);
    a.connect_to(&outsider);

    network.remove_device(&a);

    assert!(a.is_connected_to(&outsider));
    assert!(!a.is_connected_to(&b));
}

#[test]
fn clear_disconnects_everything() {
    let scheduler = Scheduler::manual();
    let devices: Vec<_> = ["a", "b", "c", "d"]
        .into_iter()
        .map(|id| headless_device(id, &scheduler))
        .collect();
    let mut network = Network::new();
    for device in &devices {
        network.add_device(device);
    }
    assert_complete_graph(&devices);

    network.clear();

    assert!(network.is_empty());
    assert_eq!(network.device_count(), 0);
    for device in &devices {
        assert_eq!(device.peer_count(), 0, "{} kept a peer", device.id());
    }
}

#[test]
fn clear_then_reuse() {
    let scheduler = Scheduler::manual();
    let a = headless_device("a", &scheduler);
    let b = headless_device("b", &scheduler);
    let mut network = Network::new();
    network.add_device(&a);
    network.add_device(&b);
    network.clear();

    assert!(network.add_device(&b));
    assert!(network.add_device(&a));
    assert_complete_graph(&[a, b]);
}

#[test]
fn dropping_a_device_releases_its_links() {
    let scheduler = Scheduler::manual();
    let a = headless_device("a", &scheduler);
    {
        let b = headless_device("b", &scheduler);
        a.connect_to(&b);
        assert_eq!(a.peer_count(), 1);
    }
    assert_eq!(a.peer_count(), 0);
    assert!(a.peers().is_empty());
}
