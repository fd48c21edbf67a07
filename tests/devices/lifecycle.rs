//! Power state machine and game lifecycle tests.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::time::Duration;

use handheld_link::surface::DetachedCanvas;
use handheld_link::{Device, DeviceEvent, GameId, HandheldError, PowerState, Scheduler, SCREEN_COLOR};

use crate::common::stubs::{AutoOffGame, CountingGame};
use crate::common::{headless_device, init_tracing, recorded_device, FRAME};

#[test]
fn construction_fails_without_surface() {
    let err = Device::new("device-1", DetachedCanvas, &Scheduler::manual()).unwrap_err();
    assert!(matches!(err, HandheldError::SurfaceUnavailable { .. }));
    assert!(err.to_string().contains("device-1"));
}

#[test]
fn turn_on_without_game_stays_off() {
    init_tracing();
    let scheduler = Scheduler::manual();
    let device = headless_device("device-1", &scheduler);

    device.turn_on();

    assert_eq!(device.power_state(), PowerState::Off);
    assert_eq!(scheduler.task_count(), 0);
    assert_eq!(device.events().len(), 0);
}

#[test]
fn turn_on_initializes_once_then_steps_every_tick() {
    let scheduler = Scheduler::manual();
    let device = headless_device("device-1", &scheduler);
    let (game, counters) = CountingGame::new("Counter");
    device.load_game(game);

    device.turn_on();
    assert!(device.is_on());
    assert_eq!(counters.inits(), 1);
    assert_eq!(counters.steps(), 0);

    scheduler.advance(FRAME * 5).unwrap();
    assert_eq!(counters.inits(), 1);
    assert_eq!(counters.steps(), 5);
}

#[test]
fn turn_on_twice_is_noop() {
    let scheduler = Scheduler::manual();
    let device = headless_device("device-1", &scheduler);
    let (game, counters) = CountingGame::new("Counter");
    device.load_game(game);

    device.turn_on();
    device.turn_on();

    assert_eq!(counters.inits(), 1);
    assert_eq!(scheduler.task_count(), 1);
}

#[test]
fn turn_off_is_idempotent_and_stops_ticks() {
    let scheduler = Scheduler::manual();
    let (device, recorder) = recorded_device("device-1", &scheduler);
    let (game, counters) = CountingGame::new("Counter");
    device.load_game(game);
    device.turn_on();
    scheduler.advance(FRAME * 3).unwrap();

    device.turn_off();
    device.turn_off();

    assert!(!device.is_on());
    assert_eq!(scheduler.task_count(), 0);
    assert_eq!(recorder.background(), Some(SCREEN_COLOR));
    scheduler.advance(Duration::from_secs(1)).unwrap();
    assert_eq!(counters.steps(), 3);
}

#[test]
fn power_cycle_reinitializes_the_game() {
    let scheduler = Scheduler::manual();
    let device = headless_device("device-1", &scheduler);
    let (game, counters) = CountingGame::new("Counter");
    device.load_game(game);

    device.turn_on();
    scheduler.advance(FRAME * 2).unwrap();
    device.turn_off();
    device.turn_on();
    scheduler.advance(FRAME * 2).unwrap();

    assert_eq!(counters.inits(), 2);
    assert_eq!(counters.steps(), 4);
    assert_eq!(scheduler.task_count(), 1);
}

#[test]
fn load_game_while_off_does_not_power_on() {
    let scheduler = Scheduler::manual();
    let device = headless_device("device-1", &scheduler);
    let (game, counters) = CountingGame::new("Counter");

    device.load_game(game);

    assert!(!device.is_on());
    assert!(device.has_game());
    assert_eq!(counters.inits(), 0);
    assert_eq!(
        device.game_metadata().unwrap().id(),
        &GameId::from_title("Counter")
    );
}

#[test]
fn load_game_while_on_swaps_and_keeps_one_task() {
    let scheduler = Scheduler::manual();
    let device = headless_device("device-1", &scheduler);
    let (first, first_counters) = CountingGame::new("First");
    let (second, second_counters) = CountingGame::new("Second");

    device.load_game(first);
    device.turn_on();
    scheduler.advance(FRAME * 2).unwrap();

    device.load_game(second);
    assert!(device.is_on());
    assert_eq!(scheduler.task_count(), 1);
    assert_eq!(second_counters.inits(), 1);

    scheduler.advance(FRAME * 3).unwrap();
    assert_eq!(first_counters.steps(), 2);
    assert_eq!(second_counters.steps(), 3);
    assert_eq!(device.game_metadata().unwrap().title(), "Second");
}

#[test]
fn load_game_clears_the_screen() {
    let scheduler = Scheduler::manual();
    let (device, recorder) = recorded_device("device-1", &scheduler);
    recorder.clear_calls();

    device.load_game(CountingGame::new("Counter").0);

    assert_eq!(recorder.background(), Some(SCREEN_COLOR));
}

#[test]
fn game_can_switch_its_own_device_off() {
    let scheduler = Scheduler::manual();
    let device = headless_device("device-1", &scheduler);
    device.load_game(AutoOffGame::new(3));

    device.turn_on();
    scheduler.advance(Duration::from_secs(1)).unwrap();

    assert!(!device.is_on());
    assert_eq!(scheduler.task_count(), 0);
}

#[test]
fn lifecycle_events_are_queued_in_order() {
    let scheduler = Scheduler::manual();
    let device = headless_device("device-1", &scheduler);

    device.load_game(CountingGame::new("Counter").0);
    device.turn_on();
    device.turn_off();

    let events: Vec<DeviceEvent> = device.events().collect();
    assert_eq!(
        events,
        vec![
            DeviceEvent::GameLoaded {
                game_id: GameId::from_title("Counter")
            },
            DeviceEvent::PoweredOn,
            DeviceEvent::PoweredOff,
        ]
    );
}

#[test]
fn custom_frame_rate_sets_tick_period() {
    let scheduler = Scheduler::manual();
    let device = Device::builder("device-1")
        .with_frame_rate(10)
        .unwrap()
        .build(handheld_link::surface::HeadlessCanvas::new(8, 8), &scheduler)
        .unwrap();
    let (game, counters) = CountingGame::new("Counter");
    device.load_game(game);
    device.turn_on();

    scheduler.advance(Duration::from_secs(1)).unwrap();

    assert_eq!(device.frame_rate(), 10);
    assert_eq!(counters.steps(), 10);
}
