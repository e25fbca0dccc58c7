// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! State change representation.
//!
//! A [`StateChange`] is produced whenever the cache takes a new value, and
//! is what sinks are notified with.

use std::fmt;

use serde::Serialize;

use crate::register::{RegisterId, RegisterValue};

/// A register taking a new value.
///
/// # Examples
///
/// ```
/// use culligan_ble::register::{RegisterId, RegisterValue};
/// use culligan_ble::state::StateChange;
///
/// let change = StateChange {
///     register: RegisterId::SaltLevel,
///     previous: Some(RegisterValue::Decimal(120.0)),
///     current: RegisterValue::Decimal(117.0),
/// };
/// assert!(change.is_update());
/// assert_eq!(change.to_string(), "salt_level: 120.00 -> 117.00");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChange {
    /// Register that changed.
    pub register: RegisterId,
    /// Value before the change, if one was cached.
    pub previous: Option<RegisterValue>,
    /// New value.
    pub current: RegisterValue,
}

impl StateChange {
    /// Returns true if the register had a value before.
    #[must_use]
    pub const fn is_update(&self) -> bool {
        self.previous.is_some()
    }
}

impl fmt::Display for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.previous {
            Some(previous) => write!(f, "{}: {previous} -> {}", self.register, self.current),
            None => write!(f, "{}: {}", self.register, self.current),
        }
    }
}
