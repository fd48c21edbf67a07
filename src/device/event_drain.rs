//! Draining a device's queued events.

use std::collections::vec_deque::IntoIter;
use std::iter::FusedIterator;

use crate::DeviceEvent;

/// An opaque iterator over the events drained from a device.
///
/// The device's queue is emptied when the drain is created, so events that arrive while
/// iterating show up in the next call to [`Device::events`](crate::Device::events).
/// Implements [`Iterator`], [`DoubleEndedIterator`], [`ExactSizeIterator`], and
/// [`FusedIterator`].
///
/// # Examples
///
/// ```ignore
/// for event in device.events() {
///     match event {
///         DeviceEvent::PeerConnected { peer } => println!("linked to {peer}"),
///         _ => { /* handle other events */ }
///     }
/// }
/// ```
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct EventDrain {
    inner: IntoIter<DeviceEvent>,
}

impl EventDrain {
    pub(crate) fn new(inner: IntoIter<DeviceEvent>) -> Self {
        Self { inner }
    }
}

impl Iterator for EventDrain {
    type Item = DeviceEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl DoubleEndedIterator for EventDrain {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl ExactSizeIterator for EventDrain {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl FusedIterator for EventDrain {}

impl std::fmt::Debug for EventDrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDrain")
            .field("remaining", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::DeviceId;
    use std::collections::VecDeque;

    fn drain_of(events: Vec<DeviceEvent>) -> EventDrain {
        EventDrain::new(VecDeque::from(events).into_iter())
    }

    #[test]
    fn empty_drain_returns_none() {
        let mut drain = drain_of(Vec::new());
        assert_eq!(drain.len(), 0);
        assert!(drain.next().is_none());
    }

    #[test]
    fn drain_yields_in_order() {
        let drain = drain_of(vec![
            DeviceEvent::PoweredOn,
            DeviceEvent::PeerConnected {
                peer: DeviceId::from("device-2"),
            },
            DeviceEvent::PoweredOff,
        ]);
        assert_eq!(drain.len(), 3);
        let events: Vec<_> = drain.collect();
        assert_eq!(events[0], DeviceEvent::PoweredOn);
        assert_eq!(events[2], DeviceEvent::PoweredOff);
    }

    #[test]
    fn drain_from_back() {
        let mut drain = drain_of(vec![DeviceEvent::PoweredOn, DeviceEvent::PoweredOff]);
        assert_eq!(drain.next_back(), Some(DeviceEvent::PoweredOff));
        assert_eq!(drain.len(), 1);
    }

    #[test]
    fn drain_is_fused() {
        let mut drain = drain_of(vec![DeviceEvent::PoweredOn]);
        assert!(drain.next().is_some());
        assert!(drain.next().is_none());
        assert!(drain.next().is_none());
    }

    #[test]
    fn debug_shows_remaining() {
        let drain = drain_of(vec![DeviceEvent::PoweredOn]);
        assert_eq!(format!("{drain:?}"), "EventDrain { remaining: 1 }");
    }
}
