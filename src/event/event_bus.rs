// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broadcast channel for session diagnostics.

use tokio::sync::broadcast;

use super::SessionEvent;

/// Events buffered per subscriber before the oldest are dropped.
const EVENT_CAPACITY: usize = 256;

/// Fan-out of [`SessionEvent`]s.
///
/// Subscribers only see events published after they subscribed. A
/// subscriber more than 256 events behind gets `RecvError::Lagged` and
/// skips ahead; the engine never waits on subscribers.
///
/// # Examples
///
/// ```
/// use culligan_ble::event::{EventBus, SessionEvent};
///
/// let bus = EventBus::new();
/// let mut rx = bus.subscribe();
///
/// bus.publish(SessionEvent::OperationsDiscarded { count: 2 });
/// assert!(matches!(
///     rx.try_recv(),
///     Ok(SessionEvent::OperationsDiscarded { count: 2 })
/// ));
/// ```
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Creates a bus without subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    /// Subscribes to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publishes an event. Without subscribers it is dropped.
    pub fn publish(&self, event: SessionEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No event subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
