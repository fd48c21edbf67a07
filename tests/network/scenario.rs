//! End-to-end scenarios: three consoles playing in one network.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::sync::atomic::Ordering;

use handheld_link::{DeviceId, GameLibrary, Network, Recipient, Scheduler};
use serde_json::json;

use crate::common::stubs::{CountingGame, EchoGame};
use crate::common::{assert_complete_graph, headless_device, init_tracing, FRAME};

#[test]
fn three_devices_play_and_leave() {
    init_tracing();
    let scheduler = Scheduler::manual();
    let a = headless_device("A", &scheduler);
    let b = headless_device("B", &scheduler);
    let c = headless_device("C", &scheduler);

    let mut network = Network::new();
    network.add_device(&a);
    network.add_device(&b);
    network.add_device(&c);
    assert_complete_graph(&[a.clone(), b.clone(), c.clone()]);

    let (game_a, counters_a) = CountingGame::new("Counter");
    let (game_b, counters_b) = CountingGame::new("Counter");
    let (echo, answered) = EchoGame::new();
    a.load_game(game_a);
    b.load_game(game_b);
    c.load_game(echo);
    for device in [&a, &b, &c] {
        device.turn_on();
    }
    assert_eq!(scheduler.task_count(), 3);

    a.send_network_message(Recipient::All, json!({ "type": "ping" }));
    assert_eq!(a.network_messages(false).len(), 1);
    assert_eq!(b.network_messages(false).len(), 1);
    assert_eq!(c.network_messages(false).len(), 1);

    b.send_network_message("C", json!({ "type": "ping" }));
    assert_eq!(a.network_messages(false).len(), 1);

    scheduler.advance(FRAME * 10).unwrap();

    assert_eq!(counters_a.steps(), 10);
    assert_eq!(counters_b.steps(), 10);
    assert_eq!(answered.load(Ordering::SeqCst), 2);
    // Each ping got exactly one pong back.
    let pongs_for = |device: &handheld_link::Device| {
        device
            .network_messages(false)
            .iter()
            .filter(|message| message.from() == &DeviceId::from("C"))
            .count()
    };
    assert_eq!(pongs_for(&a), 1);
    assert_eq!(pongs_for(&b), 1);
    assert!(c.network_messages(false).iter().all(|m| m.from() == c.id()));

    network.remove_device(&c);
    assert!(!a.is_connected_to(&c));
    assert!(a.is_connected_to(&b));
    a.send_network_message(Recipient::All, json!({ "type": "ping" }));
    scheduler.advance(FRAME).unwrap();
    assert_eq!(answered.load(Ordering::SeqCst), 2);

    network.clear();
    for device in [&a, &b, &c] {
        device.turn_off();
        assert_eq!(device.peer_count(), 0);
    }
    assert_eq!(scheduler.task_count(), 0);
    assert_eq!(counters_a.inits(), 1);
    assert_eq!(counters_b.inits(), 1);
}

#[test]
fn library_games_run_on_networked_devices() {
    let scheduler = Scheduler::manual();
    let mut library = GameLibrary::new();
    library.register(|| EchoGame::new().0);
    library.register(|| CountingGame::new("Counter").0);
    let echo_id = handheld_link::GameId::from_title("Echo");
    assert!(library.contains(&echo_id));

    let a = headless_device("A", &scheduler);
    let b = headless_device("B", &scheduler);
    let mut network = Network::new();
    network.add_device(&a);
    network.add_device(&b);

    let game = library.create(&echo_id).unwrap();
    b.load_game(game);
    b.turn_on();
    assert_eq!(b.game_metadata().unwrap().title(), "Echo");

    a.send_network_message(&b, json!({ "type": "ping" }));
    scheduler.advance(FRAME).unwrap();

    let replies = a
        .network_messages(true)
        .into_iter()
        .filter(|message| message.from() == b.id())
        .count();
    assert_eq!(replies, 1);
}

#[test]
fn late_joiner_only_sees_new_traffic() {
    let scheduler = Scheduler::manual();
    let a = headless_device("A", &scheduler);
    let b = headless_device("B", &scheduler);
    let mut network = Network::new();
    network.add_device(&a);
    network.add_device(&b);
    a.send_network_message(Recipient::All, json!("before"));

    let late = headless_device("Late", &scheduler);
    network.add_device(&late);
    a.send_network_message(Recipient::All, json!("after"));

    let seen: Vec<_> = late
        .network_messages(false)
        .iter()
        .map(|message| message.data().clone())
        .collect();
    assert_eq!(seen, vec![json!("after")]);
    assert_eq!(b.network_messages(false).len(), 2);
}
