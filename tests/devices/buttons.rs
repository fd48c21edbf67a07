//! Button state tests.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use handheld_link::surface::{DrawCall, Rect};
use handheld_link::{Button, ButtonStates, Scheduler};

use crate::common::stubs::ButtonPainter;
use crate::common::{headless_device, recorded_device, FRAME};

#[test]
fn fresh_device_has_all_buttons_released() {
    let device = headless_device("device-1", &Scheduler::manual());
    let states = device.button_states();
    assert_eq!(states, ButtonStates::default());
    for button in Button::ALL {
        assert!(!device.is_pressed(button));
    }
}

#[test]
fn set_button_state_only_touches_that_button() {
    let device = headless_device("device-1", &Scheduler::manual());

    device.set_button_state(Button::Start, true);

    let states = device.button_states();
    assert!(states.start);
    assert_eq!(states.pressed().collect::<Vec<_>>(), vec![Button::Start]);
}

#[test]
fn snapshots_do_not_write_back() {
    let device = headless_device("device-1", &Scheduler::manual());
    let mut snapshot = device.button_states();
    snapshot.set(Button::A, true);
    assert!(!device.is_pressed(Button::A));
}

#[test]
fn buttons_work_while_off() {
    let device = headless_device("device-1", &Scheduler::manual());
    device.set_button_state(Button::Left, true);
    device.set_button_state(Button::Left, false);
    assert!(!device.button_states().any_pressed());
}

#[test]
fn names_from_a_ui_layer_parse_into_buttons() {
    let device = headless_device("device-1", &Scheduler::manual());
    for name in ["up", "DOWN", "Select"] {
        device.set_button_state(name.parse().unwrap(), true);
    }
    let pressed: Vec<Button> = device.button_states().pressed().collect();
    assert_eq!(pressed, vec![Button::Up, Button::Down, Button::Select]);
    assert!("turbo".parse::<Button>().is_err());
}

#[test]
fn game_sees_buttons_on_the_next_tick() {
    let scheduler = Scheduler::manual();
    let (device, recorder) = recorded_device("device-1", &scheduler);
    device.load_game(ButtonPainter::new());
    device.turn_on();
    recorder.clear_calls();

    device.set_button_state(Button::A, true);
    scheduler.advance(FRAME).unwrap();

    let squares: Vec<Rect> = recorder
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            DrawCall::FillRect { rect, color } if color == ButtonPainter::INK => Some(rect),
            _ => None,
        })
        .collect();
    // A is the fifth button.
    assert_eq!(squares, vec![Rect::new(40.0, 0.0, 8.0, 8.0)]);
}
