//! Simulated handheld devices.
//!
//! A [`Device`] is a cheap, cloneable handle; clones refer to the same console. Devices
//! are compared by identity, not by id: two distinct devices may (unwisely) share an id,
//! and they are still different devices.
//!
//! # Power
//!
//! | From | Call | To | Condition |
//! |------|------|----|-----------|
//! | Off | [`Device::turn_on`] | On | a game is loaded |
//! | On | [`Device::turn_off`] | Off | |
//! | any | [`Device::load_game`] | same | powered-on devices are power cycled |
//!
//! While on, a device owns exactly one periodic task in its [`Scheduler`], which steps the
//! loaded game once per tick.

pub(crate) mod adjacency;
pub mod builder;
pub mod event_drain;
pub mod messages;

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, info, trace};

use crate::game::{Cartridge, Game, GameMetadata};
use crate::scheduler::{Scheduler, TaskHandle};
use crate::surface::{Color, RenderSurface, SurfaceProvider};
use crate::telemetry::{InvariantChecker, InvariantViolation, ViolationKind, ViolationSeverity};
use crate::report_violation;
use crate::{Button, ButtonStates, DeviceEvent, DeviceId, HandheldResult, PowerState};

use builder::{DeviceBuilder, DeviceConfig};
use event_drain::EventDrain;
use messages::{NetworkMessage, Recipient};

type PeerMap = BTreeMap<DeviceId, Weak<DeviceShared>>;

pub(crate) struct DeviceShared {
    id: DeviceId,
    config: DeviceConfig,
    frame_color: Color,
    scheduler: Scheduler,
    surface: Mutex<Box<dyn RenderSurface>>,
    buttons: Mutex<ButtonStates>,
    powered: AtomicBool,
    /// Bumped on every power-on; a tick only steps the game for the session that
    /// scheduled it.
    power_session: AtomicU64,
    /// The thread currently running one of this device's game hooks.
    hook_thread: Mutex<Option<ThreadId>>,
    tick_task: Mutex<Option<TaskHandle>>,
    cartridge: Mutex<Option<Cartridge>>,
    game_info: Mutex<Option<GameMetadata>>,
    peers: Mutex<PeerMap>,
    inbox: Mutex<Vec<NetworkMessage>>,
    events: Mutex<VecDeque<DeviceEvent>>,
}

impl Drop for DeviceShared {
    fn drop(&mut self) {
        // Remove the back references peers hold to this device.
        let me: *const Self = self;
        for (_, peer) in std::mem::take(self.peers.get_mut()) {
            let Some(peer) = peer.upgrade() else {
                continue;
            };
            let removed = {
                let mut their_peers = peer.peers.lock();
                match their_peers.get(&self.id) {
                    Some(entry) if std::ptr::eq(entry.as_ptr(), me) => {
                        their_peers.remove(&self.id);
                        true
                    },
                    _ => false,
                }
            };
            if removed {
                Device { shared: peer }.push_event(DeviceEvent::PeerDisconnected {
                    peer: self.id.clone(),
                });
            }
        }
    }
}

/// Marks the current thread as running one of a device's game hooks.
struct HookScope<'a> {
    slot: &'a Mutex<Option<ThreadId>>,
}

impl<'a> HookScope<'a> {
    fn enter(slot: &'a Mutex<Option<ThreadId>>) -> Self {
        *slot.lock() = Some(thread::current().id());
        Self { slot }
    }
}

impl Drop for HookScope<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}

/// Switches a device back off if `on_init` unwinds out of `turn_on`.
struct PowerOnGuard<'a> {
    device: &'a Device,
    armed: bool,
}

impl Drop for PowerOnGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.device.shared.powered.store(false, Ordering::Release);
        report_violation!(
            ViolationSeverity::Error,
            ViolationKind::Lifecycle,
            "Game initialization panicked on device {}, device left off",
            self.device.id()
        );
    }
}

/// A simulated handheld console.
///
/// # Example
///
/// ```
/// use handheld_link::{Button, Device, Scheduler};
/// use handheld_link::surface::HeadlessCanvas;
///
/// # fn main() -> Result<(), handheld_link::HandheldError> {
/// let scheduler = Scheduler::manual();
/// let device = Device::new("device-1", HeadlessCanvas::new(160, 144), &scheduler)?;
///
/// assert!(!device.is_on());
/// device.turn_on(); // no game loaded, stays off
/// assert!(!device.is_on());
///
/// device.set_button_state(Button::A, true);
/// assert!(device.button_states().a);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Device {
    shared: Arc<DeviceShared>,
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for Device {}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.shared.id)
            .field("power", &self.power_state())
            .field(
                "game",
                &self.game_metadata().map(|metadata| metadata.id().clone()),
            )
            .field("peers", &self.peer_ids())
            .finish_non_exhaustive()
    }
}

impl Device {
    /// Creates a powered-off device with default settings.
    ///
    /// # Errors
    ///
    /// [`HandheldError::SurfaceUnavailable`](crate::HandheldError::SurfaceUnavailable) if
    /// `provider` yields no surface.
    pub fn new<P: SurfaceProvider>(
        id: impl Into<DeviceId>,
        provider: P,
        scheduler: &Scheduler,
    ) -> HandheldResult<Self> {
        DeviceBuilder::new(id).build(provider, scheduler)
    }

    /// Starts a [`DeviceBuilder`] for finer control over the configuration.
    pub fn builder(id: impl Into<DeviceId>) -> DeviceBuilder {
        DeviceBuilder::new(id)
    }

    pub(crate) fn from_parts(
        id: DeviceId,
        config: DeviceConfig,
        frame_color: Color,
        mut surface: Box<dyn RenderSurface>,
        scheduler: Scheduler,
    ) -> Self {
        surface.set_image_smoothing(false);
        let device = Self {
            shared: Arc::new(DeviceShared {
                id,
                config,
                frame_color,
                scheduler,
                surface: Mutex::new(surface),
                buttons: Mutex::new(ButtonStates::default()),
                powered: AtomicBool::new(false),
                power_session: AtomicU64::new(0),
                hook_thread: Mutex::new(None),
                tick_task: Mutex::new(None),
                cartridge: Mutex::new(None),
                game_info: Mutex::new(None),
                peers: Mutex::new(BTreeMap::new()),
                inbox: Mutex::new(Vec::new()),
                events: Mutex::new(VecDeque::new()),
            }),
        };
        device.clear_screen();
        debug!(device = %device.id(), frame_color = %frame_color, "Device created");
        device
    }

    /// The device's id.
    #[must_use]
    pub fn id(&self) -> &DeviceId {
        &self.shared.id
    }

    /// The configuration the device was built with.
    #[must_use]
    pub fn config(&self) -> &DeviceConfig {
        &self.shared.config
    }

    /// Ticks per second while on.
    #[must_use]
    pub fn frame_rate(&self) -> u32 {
        self.shared.config.frame_rate
    }

    /// Color of the device's shell.
    #[must_use]
    pub fn frame_color(&self) -> Color {
        self.shared.frame_color
    }

    // ---- power ----

    /// Returns `true` while the device is on.
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.shared.powered.load(Ordering::Acquire)
    }

    /// The current power state.
    #[must_use]
    pub fn power_state(&self) -> PowerState {
        if self.is_on() {
            PowerState::On
        } else {
            PowerState::Off
        }
    }

    /// Powers the device on: initializes the loaded game and starts ticking it.
    ///
    /// Does nothing if the device is already on or has no game.
    pub fn turn_on(&self) {
        if !self.has_game() {
            debug!(device = %self.id(), "turn_on ignored: no game loaded");
            return;
        }
        if self
            .shared
            .powered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(device = %self.id(), "turn_on ignored: already on");
            return;
        }

        let session = self.shared.power_session.fetch_add(1, Ordering::AcqRel) + 1;
        {
            let mut slot = self.shared.cartridge.lock();
            let Some(cartridge) = slot.as_mut() else {
                self.shared.powered.store(false, Ordering::Release);
                report_violation!(
                    ViolationSeverity::Error,
                    ViolationKind::InternalError,
                    "Device {} has game metadata but an empty game slot",
                    self.id()
                );
                return;
            };
            info!("Device {} powered on", self.id());
            self.push_event(DeviceEvent::PoweredOn);
            let mut guard = PowerOnGuard {
                device: self,
                armed: true,
            };
            {
                let _hook = HookScope::enter(&self.shared.hook_thread);
                cartridge.init(self);
            }
            guard.armed = false;
        }

        let weak = Arc::downgrade(&self.shared);
        let task = self.shared.scheduler.schedule_periodic(
            format!("tick:{}", self.id()),
            self.shared.config.frame_period(),
            move || {
                if let Some(shared) = weak.upgrade() {
                    Device { shared }.tick(session);
                }
            },
        );

        let mut slot = self.shared.tick_task.lock();
        // on_init may already have switched the device off again
        if self.is_on() {
            *slot = Some(task);
        }
    }

    /// Powers the device off: stops ticking and blanks the screen.
    ///
    /// Does nothing if the device is already off. Safe to call from a game hook.
    ///
    /// When called from outside this device's hooks, a step already running on another
    /// thread is allowed to finish before this returns; no step starts afterwards.
    pub fn turn_off(&self) {
        if self
            .shared
            .powered
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(device = %self.id(), "turn_off ignored: already off");
            return;
        }
        let task = self.shared.tick_task.lock().take();
        if let Some(task) = task {
            task.cancel();
        }
        if !self.in_own_hook() {
            // waits out a step in flight on the driver thread
            drop(self.shared.cartridge.lock());
        }
        self.clear_screen();
        info!("Device {} powered off", self.id());
        self.push_event(DeviceEvent::PoweredOff);
    }

    fn tick(&self, session: u64) {
        let mut slot = self.shared.cartridge.lock();
        // checked under the slot lock so turn_off and load_game cannot slip in between
        if !self.is_on() || self.shared.power_session.load(Ordering::Acquire) != session {
            trace!(device = %self.id(), session, "stale tick skipped");
            return;
        }
        let Some(cartridge) = slot.as_mut() else {
            return;
        };
        trace!(device = %self.id(), "tick");
        let _hook = HookScope::enter(&self.shared.hook_thread);
        cartridge.step(self);
    }

    fn in_own_hook(&self) -> bool {
        *self.shared.hook_thread.lock() == Some(thread::current().id())
    }

    // ---- game ----

    /// Inserts `game`, replacing and dropping any previous one, and clears the screen.
    ///
    /// A powered-on device is switched off and on again, so the new game is initialized
    /// and ticked by a fresh task.
    pub fn load_game<G: Game + 'static>(&self, game: G) {
        let cartridge = Cartridge::new(game);
        let metadata = cartridge.metadata().clone();

        let was_on = self.is_on();
        if was_on {
            self.turn_off();
        }

        let previous = self.shared.cartridge.lock().replace(cartridge);
        drop(previous);
        *self.shared.game_info.lock() = Some(metadata.clone());
        self.clear_screen();

        info!("Game \"{}\" loaded on device {}", metadata.title(), self.id());
        self.push_event(DeviceEvent::GameLoaded {
            game_id: metadata.id().clone(),
        });

        if was_on {
            self.turn_on();
        }
    }

    /// Returns `true` if a game is loaded.
    #[must_use]
    pub fn has_game(&self) -> bool {
        self.shared.game_info.lock().is_some()
    }

    /// Metadata of the loaded game. Safe to call from a game hook.
    #[must_use]
    pub fn game_metadata(&self) -> Option<GameMetadata> {
        self.shared.game_info.lock().clone()
    }

    // ---- buttons ----

    /// Records that `button` is pressed or released.
    pub fn set_button_state(&self, button: Button, pressed: bool) {
        self.shared.buttons.lock().set(button, pressed);
        trace!(device = %self.id(), %button, pressed, "button");
    }

    /// Snapshot of all eight buttons.
    #[must_use]
    pub fn button_states(&self) -> ButtonStates {
        *self.shared.buttons.lock()
    }

    /// Whether `button` is currently pressed.
    #[must_use]
    pub fn is_pressed(&self, button: Button) -> bool {
        self.shared.buttons.lock().get(button)
    }

    // ---- screen ----

    /// Runs `f` with exclusive access to the device's surface.
    ///
    /// Do not call [`Device::clear_screen`] or another `with_surface` on the same
    /// device from inside `f`.
    pub fn with_surface<R>(&self, f: impl FnOnce(&mut dyn RenderSurface) -> R) -> R {
        let mut surface = self.shared.surface.lock();
        f(surface.as_mut())
    }

    /// Fills the whole screen with the configured screen color.
    pub fn clear_screen(&self) {
        let color = self.shared.config.screen_color;
        self.with_surface(|surface| {
            let bounds = surface.bounds();
            surface.fill_rect(bounds, color);
        });
    }

    // ---- peers ----

    /// Connects this device and `peer` in both directions. Idempotent.
    ///
    /// A device cannot be connected to itself, or to another device with the same id;
    /// such requests are ignored and reported as a topology warning.
    pub fn connect_to(&self, peer: &Device) {
        adjacency::link(self, peer);
    }

    /// Removes the connection between this device and `peer` in both directions.
    /// Does nothing if they are not connected.
    pub fn disconnect_from(&self, peer: &Device) {
        adjacency::unlink(self, peer);
    }

    /// Whether this device is connected to `peer`.
    #[must_use]
    pub fn is_connected_to(&self, peer: &Device) -> bool {
        self.shared
            .peers
            .lock()
            .get(peer.id())
            .is_some_and(|entry| adjacency::points_to(entry, peer))
    }

    /// Handles of all connected peers, ordered by id.
    #[must_use]
    pub fn peers(&self) -> Vec<Device> {
        let peers = self.shared.peers.lock();
        peers
            .values()
            .filter_map(Weak::upgrade)
            .map(|shared| Device { shared })
            .collect()
    }

    /// Ids of all connected peers, ascending.
    #[must_use]
    pub fn peer_ids(&self) -> Vec<DeviceId> {
        self.shared.peers.lock().keys().cloned().collect()
    }

    /// Number of connected peers.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.shared.peers.lock().len()
    }

    // ---- messages ----

    /// Sends `data` to `to`, which is a peer id or [`Recipient::All`].
    ///
    /// The message is appended to this device's own log first, then delivered to every
    /// connected peer it is addressed to before this returns. A target that is not a
    /// connected peer receives nothing. Returns the message that was sent.
    pub fn send_network_message(
        &self,
        to: impl Into<Recipient>,
        data: serde_json::Value,
    ) -> NetworkMessage {
        let message = NetworkMessage::new(self.id().clone(), to, data);
        self.shared.inbox.lock().push(message.clone());

        let targets: SmallVec<[Device; 4]> = {
            let peers = self.shared.peers.lock();
            peers
                .iter()
                .filter(|(id, _)| message.to().matches(id))
                .filter_map(|(_, entry)| entry.upgrade())
                .map(|shared| Device { shared })
                .collect()
        };

        if targets.is_empty() && !message.to().is_broadcast() {
            debug!(
                device = %self.id(),
                target = %message.to(),
                "No connected peer matches the message target"
            );
        }
        for peer in &targets {
            peer.receive_network_message(message.clone());
        }
        debug!(
            device = %self.id(),
            target = %message.to(),
            delivered = targets.len(),
            "Message sent"
        );
        message
    }

    /// Appends `message` to this device's log.
    pub fn receive_network_message(&self, message: NetworkMessage) {
        let from = message.from().clone();
        self.shared.inbox.lock().push(message);
        if from != *self.id() {
            self.push_event(DeviceEvent::MessageReceived { from });
        }
    }

    /// The message log in arrival order. With `clear`, the returned messages are
    /// removed from the log in the same step.
    #[must_use]
    pub fn network_messages(&self, clear: bool) -> Vec<NetworkMessage> {
        let mut inbox = self.shared.inbox.lock();
        if clear {
            std::mem::take(&mut *inbox)
        } else {
            inbox.clone()
        }
    }

    // ---- events ----

    /// Drains the queued [`DeviceEvent`]s, oldest first.
    pub fn events(&self) -> EventDrain {
        let queue = std::mem::take(&mut *self.shared.events.lock());
        EventDrain::new(queue.into_iter())
    }

    pub(crate) fn push_event(&self, event: DeviceEvent) {
        let mut events = self.shared.events.lock();
        while events.len() >= self.shared.config.event_queue_size {
            events.pop_front();
        }
        events.push_back(event);
    }
}

impl InvariantChecker for Device {
    /// # Invariants
    ///
    /// 1. Every live peer entry is keyed by that peer's id
    /// 2. Every live peer links back to this device
    ///
    /// Peers are snapshotted first so no two peer sets are locked at once.
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let peers: Vec<(DeviceId, Device)> = self
            .shared
            .peers
            .lock()
            .iter()
            .filter_map(|(id, entry)| entry.upgrade().map(|shared| (id.clone(), Device { shared })))
            .collect();

        for (key, peer) in peers {
            if key != *peer.id() {
                return Err(InvariantViolation::new("Device", "peer stored under a foreign id")
                    .with_details(format!("device={}, key={}, peer={}", self.id(), key, peer.id())));
            }
            let links_back = peer
                .shared
                .peers
                .lock()
                .get(self.id())
                .is_some_and(|entry| adjacency::points_to(entry, self));
            if !links_back {
                return Err(InvariantViolation::new("Device", "adjacency is not symmetric")
                    .with_details(format!("{}->{} has no reverse link", self.id(), peer.id())));
            }
        }
        Ok(())
    }
}
