//! Deterministic ticking on a manual clock.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::sync::Arc;
use std::time::Duration;

use handheld_link::{Device, Game, GameMetadata, Scheduler};
use parking_lot::Mutex;

use crate::common::stubs::CountingGame;
use crate::common::{headless_device, FRAME, SCREEN_SIZE};

/// Appends its device id to a shared trace on every step.
struct Tracer {
    metadata: GameMetadata,
    trace: Arc<Mutex<Vec<String>>>,
}

impl Tracer {
    fn new(trace: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            metadata: GameMetadata::new("Tracer", "", "", ""),
            trace: Arc::clone(trace),
        }
    }
}

impl Game for Tracer {
    fn metadata(&self) -> &GameMetadata {
        &self.metadata
    }

    fn on_init(&mut self, _device: &Device) {}

    fn on_step(&mut self, device: &Device) {
        self.trace.lock().push(device.id().to_string());
    }
}

fn device_at(id: &str, frame_rate: u32, scheduler: &Scheduler) -> Device {
    Device::builder(id)
        .with_frame_rate(frame_rate)
        .unwrap()
        .build(
            handheld_link::surface::HeadlessCanvas::new(SCREEN_SIZE.0, SCREEN_SIZE.1),
            scheduler,
        )
        .unwrap()
}

#[test]
fn every_device_ticks_once_per_period() {
    let scheduler = Scheduler::manual();
    let devices: Vec<_> = (0..4)
        .map(|n| headless_device(&format!("device-{n}"), &scheduler))
        .collect();
    let counters: Vec<_> = devices
        .iter()
        .map(|device| {
            let (game, counters) = CountingGame::new("Counter");
            device.load_game(game);
            device.turn_on();
            counters
        })
        .collect();

    let ran = scheduler.advance(FRAME * 30).unwrap();

    assert_eq!(ran, 120);
    for counter in &counters {
        assert_eq!(counter.steps(), 30);
    }
}

#[test]
fn mixed_frame_rates_tick_independently() {
    let scheduler = Scheduler::manual();
    let slow = device_at("slow", 10, &scheduler);
    let fast = device_at("fast", 50, &scheduler);
    let (slow_game, slow_counters) = CountingGame::new("Slow");
    let (fast_game, fast_counters) = CountingGame::new("Fast");
    slow.load_game(slow_game);
    fast.load_game(fast_game);
    slow.turn_on();
    fast.turn_on();

    scheduler.advance(Duration::from_secs(2)).unwrap();

    assert_eq!(slow_counters.steps(), 20);
    assert_eq!(fast_counters.steps(), 100);
}

#[test]
fn ticks_interleave_by_deadline_then_power_on_order() {
    let scheduler = Scheduler::manual();
    let trace = Arc::new(Mutex::new(Vec::new()));
    let a = device_at("a", 10, &scheduler);
    let b = device_at("b", 20, &scheduler);
    // b powers on first, so it wins ties.
    b.load_game(Tracer::new(&trace));
    a.load_game(Tracer::new(&trace));
    b.turn_on();
    a.turn_on();

    scheduler.advance(Duration::from_millis(200)).unwrap();

    assert_eq!(
        *trace.lock(),
        vec!["b", "b", "a", "b", "b", "a"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
    );
}

#[test]
fn same_steps_produce_same_trace() {
    let run = || {
        let scheduler = Scheduler::manual();
        let trace = Arc::new(Mutex::new(Vec::new()));
        let devices: Vec<_> = [("x", 30), ("y", 60), ("z", 45)]
            .into_iter()
            .map(|(id, rate)| device_at(id, rate, &scheduler))
            .collect();
        for device in &devices {
            device.load_game(Tracer::new(&trace));
            device.turn_on();
        }
        for _ in 0..7 {
            scheduler.advance(Duration::from_millis(37)).unwrap();
        }
        let result = trace.lock().clone();
        result
    };

    let first = run();
    assert!(!first.is_empty());
    assert_eq!(first, run());
}

#[test]
fn powered_off_devices_do_not_tick() {
    let scheduler = Scheduler::manual();
    let on = headless_device("on", &scheduler);
    let off = headless_device("off", &scheduler);
    let (on_game, on_counters) = CountingGame::new("On");
    let (off_game, off_counters) = CountingGame::new("Off");
    on.load_game(on_game);
    off.load_game(off_game);
    on.turn_on();

    scheduler.advance(FRAME * 3).unwrap();

    assert_eq!(on_counters.steps(), 3);
    assert_eq!(off_counters.steps(), 0);
    assert_eq!(off_counters.inits(), 0);
}

#[test]
fn dropping_a_powered_device_stops_its_task() {
    let scheduler = Scheduler::manual();
    let (game, counters) = CountingGame::new("Counter");
    {
        let device = headless_device("temp", &scheduler);
        device.load_game(game);
        device.turn_on();
        scheduler.advance(FRAME).unwrap();
        assert_eq!(scheduler.task_count(), 1);
    }
    scheduler.advance(FRAME * 5).unwrap();
    assert_eq!(counters.steps(), 1);
    assert_eq!(scheduler.task_count(), 0);
}
