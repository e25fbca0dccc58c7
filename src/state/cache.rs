// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Last known register values.

use tokio::time::Instant;

use crate::register::{RegisterId, RegisterValue};

use super::StateChange;

/// One cached observation.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue {
    value: RegisterValue,
    observed_at: Instant,
    stale: bool,
}

impl CachedValue {
    /// The decoded value.
    #[must_use]
    pub const fn value(&self) -> &RegisterValue {
        &self.value
    }

    /// When the page carrying the value was received.
    #[must_use]
    pub const fn observed_at(&self) -> Instant {
        self.observed_at
    }

    /// Returns true if the value predates the current session.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        self.stale
    }
}

/// Register values indexed by [`RegisterId`].
///
/// Updates are monotonic: an observation older than the cached one is
/// ignored. A disconnect keeps every value but marks it stale.
///
/// # Examples
///
/// ```
/// use culligan_ble::register::{RegisterId, RegisterValue};
/// use culligan_ble::state::RegisterCache;
/// use tokio::time::Instant;
///
/// let mut cache = RegisterCache::new();
/// let change = cache.apply(RegisterId::WaterHardness, RegisterValue::from(17u8), Instant::now());
/// assert!(change.is_some());
///
/// assert_eq!(cache.value(RegisterId::WaterHardness), Some(&RegisterValue::Integer(17)));
/// ```
#[derive(Debug, Clone)]
pub struct RegisterCache {
    entries: [Option<CachedValue>; RegisterId::ALL.len()],
}

impl Default for RegisterCache {
    fn default() -> Self {
        Self {
            entries: std::array::from_fn(|_| None),
        }
    }
}

impl RegisterCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an observation.
    ///
    /// Returns the change to report to sinks, or `None` if the observation
    /// was older than the cached one or repeated a fresh value.
    pub fn apply(
        &mut self,
        register: RegisterId,
        value: RegisterValue,
        observed_at: Instant,
    ) -> Option<StateChange> {
        let slot = &mut self.entries[register.index()];

        if let Some(cached) = slot.as_mut() {
            if observed_at < cached.observed_at {
                tracing::trace!(register = %register, "Ignoring out of order observation");
                return None;
            }
            let was_stale = cached.stale;
            cached.observed_at = observed_at;
            cached.stale = false;
            if cached.value == value && !was_stale {
                return None;
            }
            let previous = std::mem::replace(&mut cached.value, value.clone());
            return Some(StateChange {
                register,
                previous: Some(previous),
                current: value,
            });
        }

        *slot = Some(CachedValue {
            value: value.clone(),
            observed_at,
            stale: false,
        });
        Some(StateChange {
            register,
            previous: None,
            current: value,
        })
    }

    /// Returns the cached entry of a register.
    #[must_use]
    pub fn get(&self, register: RegisterId) -> Option<&CachedValue> {
        self.entries[register.index()].as_ref()
    }

    /// Returns the cached value of a register.
    #[must_use]
    pub fn value(&self, register: RegisterId) -> Option<&RegisterValue> {
        self.get(register).map(CachedValue::value)
    }

    /// Marks every value stale.
    pub fn mark_stale(&mut self) {
        for cached in self.entries.iter_mut().flatten() {
            cached.stale = true;
        }
    }

    /// Iterates over the cached registers in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = (RegisterId, &CachedValue)> {
        RegisterId::ALL
            .iter()
            .zip(&self.entries)
            .filter_map(|(id, entry)| entry.as_ref().map(|cached| (*id, cached)))
    }

    /// Number of registers with a value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    /// Returns true if nothing has been observed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn first_observation_is_reported() {
        let mut cache = RegisterCache::new();
        let change = cache
            .apply(RegisterId::BatteryLevel, RegisterValue::Integer(75), Instant::now())
            .unwrap();
        assert_eq!(change.previous, None);
        assert_eq!(change.current, RegisterValue::Integer(75));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn repeated_value_is_not_reported() {
        let mut cache = RegisterCache::new();
        let t0 = Instant::now();
        cache.apply(RegisterId::WaterHardness, RegisterValue::Integer(20), t0);
        let again = cache.apply(
            RegisterId::WaterHardness,
            RegisterValue::Integer(20),
            t0 + Duration::from_secs(1),
        );
        assert!(again.is_none());
        assert_eq!(
            cache.get(RegisterId::WaterHardness).unwrap().observed_at(),
            t0 + Duration::from_secs(1)
        );
    }

    #[test]
    fn older_observation_never_wins() {
        let mut cache = RegisterCache::new();
        let t0 = Instant::now();
        cache.apply(RegisterId::TotalGallons, RegisterValue::Integer(500), t0 + Duration::from_secs(5));
        let late = cache.apply(RegisterId::TotalGallons, RegisterValue::Integer(400), t0);
        assert!(late.is_none());
        assert_eq!(cache.value(RegisterId::TotalGallons), Some(&RegisterValue::Integer(500)));
    }

    #[test]
    fn stale_values_are_refreshed_and_reported() {
        let mut cache = RegisterCache::new();
        let t0 = Instant::now();
        cache.apply(RegisterId::BypassActive, RegisterValue::Flag(false), t0);
        cache.mark_stale();
        assert!(cache.get(RegisterId::BypassActive).unwrap().is_stale());

        let change = cache.apply(
            RegisterId::BypassActive,
            RegisterValue::Flag(false),
            t0 + Duration::from_secs(1),
        );
        assert!(change.is_some());
        assert!(!cache.get(RegisterId::BypassActive).unwrap().is_stale());
    }

    #[test]
    fn iter_follows_catalog_order() {
        let mut cache = RegisterCache::new();
        let now = Instant::now();
        cache.apply(RegisterId::TotalGallons, RegisterValue::Integer(1), now);
        cache.apply(RegisterId::CurrentFlow, RegisterValue::Decimal(0.5), now);

        let ids: Vec<_> = cache.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![RegisterId::CurrentFlow, RegisterId::TotalGallons]);
    }
}
