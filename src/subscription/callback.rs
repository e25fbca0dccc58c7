// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sink storage and dispatch.
//!
//! - [`SubscriptionId`] - Unique identifier for detaching
//! - [`SinkRegistry`] - Registry storing sinks per register

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::Error;
use crate::register::{Catalog, RegisterId};
use crate::state::StateChange;

use super::{ActionOutcome, Sink};

/// Unique identifier for an attached sink.
///
/// IDs are unique within one softener's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    #[must_use]
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}

struct Entry {
    register: RegisterId,
    sink: Sink,
}

/// Registry of attached sinks.
///
/// Uses `parking_lot::RwLock` so hosts may attach and detach from any
/// task while the engine dispatches. Callbacks run synchronously on the
/// engine's task and must not block.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// use culligan_ble::register::{RegisterId, RegisterValue};
/// use culligan_ble::state::StateChange;
/// use culligan_ble::subscription::{Sink, SinkRegistry};
///
/// let registry = SinkRegistry::new();
/// let hits = Arc::new(AtomicU32::new(0));
/// let counter = hits.clone();
///
/// registry
///     .attach(RegisterId::TotalGallons, Sink::telemetry(move |_| {
///         counter.fetch_add(1, Ordering::SeqCst);
///     }))
///     .unwrap();
///
/// registry.dispatch(&StateChange {
///     register: RegisterId::TotalGallons,
///     previous: None,
///     current: RegisterValue::Integer(1200),
/// });
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// ```
pub struct SinkRegistry {
    next_id: AtomicU64,
    entries: RwLock<HashMap<SubscriptionId, Entry>>,
}

impl SinkRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Attaches a sink to a register.
    ///
    /// # Errors
    ///
    /// Returns `Error::Unsupported` if the sink kind does not fit the
    /// register's access class, e.g. a writable sink on a telemetry
    /// register.
    pub fn attach(&self, register: RegisterId, sink: Sink) -> Result<SubscriptionId, Error> {
        if !sink.fits(Catalog::get(register)) {
            return Err(Error::Unsupported {
                register,
                operation: sink.kind(),
            });
        }
        let id = self.next_id();
        tracing::debug!(register = %register, sink = sink.kind(), id = %id, "Attached sink");
        self.entries.write().insert(id, Entry { register, sink });
        Ok(id)
    }

    /// Detaches a sink.
    ///
    /// Returns `true` if a sink was found and removed.
    pub fn detach(&self, id: SubscriptionId) -> bool {
        self.entries.write().remove(&id).is_some()
    }

    /// Returns the register a sink is attached to.
    #[must_use]
    pub fn register_of(&self, id: SubscriptionId) -> Option<RegisterId> {
        self.entries.read().get(&id).map(|entry| entry.register)
    }

    /// Removes every sink.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Notifies value sinks of a change.
    pub fn dispatch(&self, change: &StateChange) {
        // Collect first so callbacks can attach or detach without deadlocking
        let callbacks: Vec<_> = self
            .entries
            .read()
            .values()
            .filter(|entry| entry.register == change.register)
            .filter_map(|entry| match &entry.sink {
                Sink::Telemetry(cb) | Sink::Writable(cb) => Some(cb.clone()),
                Sink::Action(_) => None,
            })
            .collect();
        for callback in callbacks {
            callback(change);
        }
    }

    /// Notifies action sinks of how a press ended.
    pub fn dispatch_outcome(&self, outcome: &ActionOutcome) {
        let callbacks: Vec<_> = self
            .entries
            .read()
            .values()
            .filter(|entry| entry.register == outcome.register)
            .filter_map(|entry| match &entry.sink {
                Sink::Action(cb) => Some(cb.clone()),
                Sink::Telemetry(_) | Sink::Writable(_) => None,
            })
            .collect();
        for callback in callbacks {
            callback(outcome);
        }
    }

    /// Returns the number of attached sinks.
    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if no sink is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sink_count() == 0
    }
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SinkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkRegistry")
            .field("sink_count", &self.sink_count())
            .finish_non_exhaustive()
    }
}
