//! The one code path that mutates peer sets.
//!
//! Both endpoints of a link are updated under both peer-set locks, taken in id order,
//! so no caller ever observes a one-sided connection and two concurrent link operations
//! cannot deadlock.

use std::sync::{Arc, Weak};

use parking_lot::MutexGuard;
use tracing::{debug, info};

use super::{DeviceShared, PeerMap};
use crate::telemetry::{ViolationKind, ViolationSeverity};
use crate::{debug_check_invariants, report_violation, Device, DeviceEvent};

/// Whether `entry` refers to `device` itself rather than another device with the same id.
pub(super) fn points_to(entry: &Weak<DeviceShared>, device: &Device) -> bool {
    std::ptr::eq(entry.as_ptr(), Arc::as_ptr(&device.shared))
}

/// Locks the peer sets of `a` and `b` in id order and returns them as `(a, b)`.
fn lock_pair<'a>(
    a: &'a Device,
    b: &'a Device,
) -> (MutexGuard<'a, PeerMap>, MutexGuard<'a, PeerMap>) {
    if a.id() <= b.id() {
        let first = a.shared.peers.lock();
        let second = b.shared.peers.lock();
        (first, second)
    } else {
        let second = b.shared.peers.lock();
        let first = a.shared.peers.lock();
        (first, second)
    }
}

fn is_self_link(a: &Device, b: &Device) -> bool {
    if a.id() != b.id() {
        return false;
    }
    report_violation!(
        ViolationSeverity::Warning,
        ViolationKind::Topology,
        "Device {} cannot be connected to itself or to another device with the same id",
        a.id()
    );
    true
}

/// Whether `entry` is a live link to some device other than `device`.
fn held_by_other(entry: &Weak<DeviceShared>, device: &Device) -> bool {
    entry.strong_count() > 0 && !points_to(entry, device)
}

/// Connects `a` and `b` in both directions. Returns `false` if they already were
/// connected or the link was refused.
///
/// A link is refused when either side is already linked to a different device that
/// carries the other side's id; overwriting that entry would leave the old peer with a
/// one-sided link.
pub(super) fn link(a: &Device, b: &Device) -> bool {
    if is_self_link(a, b) {
        return false;
    }

    {
        let (mut a_peers, mut b_peers) = lock_pair(a, b);
        let forward = a_peers.get(b.id()).is_some_and(|entry| points_to(entry, b));
        let backward = b_peers.get(a.id()).is_some_and(|entry| points_to(entry, a));
        if forward && backward {
            debug!(device = %a.id(), peer = %b.id(), "Devices already connected");
            return false;
        }
        let taken = a_peers.get(b.id()).is_some_and(|entry| held_by_other(entry, b))
            || b_peers.get(a.id()).is_some_and(|entry| held_by_other(entry, a));
        if taken {
            drop(a_peers);
            drop(b_peers);
            report_violation!(
                ViolationSeverity::Warning,
                ViolationKind::Topology,
                "Device {} is already linked to another device with id {}",
                a.id(),
                b.id()
            );
            return false;
        }
        a_peers.insert(b.id().clone(), Arc::downgrade(&b.shared));
        b_peers.insert(a.id().clone(), Arc::downgrade(&a.shared));
    }

    info!("Device {} connected to {}", a.id(), b.id());
    a.push_event(DeviceEvent::PeerConnected {
        peer: b.id().clone(),
    });
    b.push_event(DeviceEvent::PeerConnected {
        peer: a.id().clone(),
    });
    debug_check_invariants!(a, "link");
    debug_check_invariants!(b, "link");
    true
}

/// Disconnects `a` and `b` in both directions. Returns `false` if they were not connected.
pub(super) fn unlink(a: &Device, b: &Device) -> bool {
    if a.id() == b.id() {
        return false;
    }

    let removed = {
        let (mut a_peers, mut b_peers) = lock_pair(a, b);
        let forward = a_peers.get(b.id()).is_some_and(|entry| points_to(entry, b));
        let backward = b_peers.get(a.id()).is_some_and(|entry| points_to(entry, a));
        if forward {
            a_peers.remove(b.id());
        }
        if backward {
            b_peers.remove(a.id());
        }
        forward || backward
    };

    if !removed {
        debug!(device = %a.id(), peer = %b.id(), "Devices were not connected");
        return false;
    }

    info!("Device {} disconnected from {}", a.id(), b.id());
    a.push_event(DeviceEvent::PeerDisconnected {
        peer: b.id().clone(),
    });
    b.push_event(DeviceEvent::PeerDisconnected {
        peer: a.id().clone(),
    });
    debug_check_invariants!(a, "unlink");
    debug_check_invariants!(b, "unlink");
    true
}
