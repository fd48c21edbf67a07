//! A set of devices kept wired together as a complete graph.
//!
//! Every member of a [`Network`] is connected to every other member. Joining connects the
//! newcomer to all current members, leaving disconnects it from all of them, and
//! [`Network::clear`] tears every link down.
//!
//! Devices stay usable on their own: a member may also be linked to devices outside the
//! network, and nothing stops code from calling [`Device::disconnect_from`] on two members
//! directly. The network does not repair such links, but in debug builds (or with the
//! `paranoid` feature) it audits itself after every change and reports a broken graph
//! through its [`ViolationObserver`].

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::telemetry::{
    report_to_observer, ContractViolation, InvariantChecker, InvariantViolation, ViolationKind,
    ViolationObserver, ViolationSeverity,
};
use crate::{Device, DeviceId};

/// Devices connected pairwise, in insertion order.
///
/// ```
/// use handheld_link::{Device, Network, Scheduler};
/// use handheld_link::surface::HeadlessCanvas;
///
/// # fn main() -> Result<(), handheld_link::HandheldError> {
/// let scheduler = Scheduler::manual();
/// let a = Device::new("a", HeadlessCanvas::new(8, 8), &scheduler)?;
/// let b = Device::new("b", HeadlessCanvas::new(8, 8), &scheduler)?;
///
/// let mut network = Network::new();
/// network.add_device(&a);
/// network.add_device(&b);
/// assert!(a.is_connected_to(&b));
///
/// network.remove_device(&b);
/// assert!(!a.is_connected_to(&b));
/// assert_eq!(network.device_count(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct Network {
    devices: Vec<Device>,
    observer: Option<Arc<dyn ViolationObserver>>,
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field(
                "devices",
                &self.devices.iter().map(Device::id).collect::<Vec<_>>(),
            )
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}

impl Network {
    /// Creates an empty network that reports violations through tracing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes contract violations to `observer` instead of tracing.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Adds `device` and connects it to every current member.
    ///
    /// Returns `false` without changing anything if the device is already a member, or
    /// if a different device with the same id is (the latter is reported as a
    /// membership violation).
    pub fn add_device(&mut self, device: &Device) -> bool {
        if self.has_device(device) {
            debug!(device = %device.id(), "add_device ignored: already a member");
            return false;
        }
        if self.devices.iter().any(|member| member.id() == device.id()) {
            let violation = ContractViolation::new(
                ViolationSeverity::Error,
                ViolationKind::Membership,
                format!(
                    "A different device with id {} is already a member",
                    device.id()
                ),
                concat!(file!(), ":", line!()),
            )
            .with_device(device.id().clone())
            .with_context("members", self.devices.len().to_string());
            report_to_observer(self.observer.as_ref(), &violation);
            return false;
        }

        for member in &self.devices {
            device.connect_to(member);
        }
        self.devices.push(device.clone());
        info!(
            "Device {} joined the network ({} devices)",
            device.id(),
            self.devices.len()
        );
        self.audit("add_device");
        true
    }

    /// Disconnects `device` from every other member and removes it.
    ///
    /// Returns `false` if it was not a member.
    pub fn remove_device(&mut self, device: &Device) -> bool {
        let Some(index) = self.devices.iter().position(|member| member == device) else {
            debug!(device = %device.id(), "remove_device ignored: not a member");
            return false;
        };

        for member in &self.devices {
            if member != device {
                device.disconnect_from(member);
            }
        }
        self.devices.remove(index);
        info!(
            "Device {} left the network ({} devices)",
            device.id(),
            self.devices.len()
        );
        self.audit("remove_device");
        true
    }

    /// Handles of all members, in the order they joined.
    #[must_use]
    pub fn devices(&self) -> Vec<Device> {
        self.devices.clone()
    }

    /// Number of members.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Returns `true` if the network has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Whether this exact device is a member.
    #[must_use]
    pub fn has_device(&self, device: &Device) -> bool {
        self.devices.iter().any(|member| member == device)
    }

    /// The member with the given id.
    #[must_use]
    pub fn device(&self, id: &DeviceId) -> Option<Device> {
        self.devices.iter().find(|member| member.id() == id).cloned()
    }

    /// Disconnects every pair of members exactly once and empties the network.
    pub fn clear(&mut self) {
        for (index, device) in self.devices.iter().enumerate() {
            for other in self.devices.iter().skip(index + 1) {
                device.disconnect_from(other);
            }
        }
        let removed = self.devices.len();
        self.devices.clear();
        info!("Network cleared ({} devices removed)", removed);
    }

    #[cfg(any(debug_assertions, feature = "paranoid"))]
    fn audit(&self, operation: &str) {
        if let Err(violation) = self.check_invariants() {
            crate::report_violation_to!(
                self.observer,
                ViolationSeverity::Critical,
                ViolationKind::Invariant,
                "{} after {}",
                violation,
                operation
            );
        }
    }

    #[cfg(not(any(debug_assertions, feature = "paranoid")))]
    #[allow(clippy::unused_self)]
    fn audit(&self, _operation: &str) {}
}

impl InvariantChecker for Network {
    /// # Invariants
    ///
    /// 1. No two members share an id
    /// 2. Every pair of members is connected in both directions
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        for (index, device) in self.devices.iter().enumerate() {
            for other in self.devices.iter().skip(index + 1) {
                if device.id() == other.id() {
                    return Err(InvariantViolation::new("Network", "duplicate member id")
                        .with_details(format!("id={}", device.id())));
                }
                let forward = device.is_connected_to(other);
                let backward = other.is_connected_to(device);
                if !(forward && backward) {
                    return Err(InvariantViolation::new(
                        "Network",
                        "members are not fully connected",
                    )
                    .with_details(format!(
                        "{}->{}={}, {}->{}={}",
                        device.id(),
                        other.id(),
                        forward,
                        other.id(),
                        device.id(),
                        backward
                    )));
                }
            }
        }
        Ok(())
    }
}
