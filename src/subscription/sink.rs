// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host-facing register sinks.

use std::fmt;
use std::sync::Arc;

use crate::error::RequestTimeout;
use crate::register::{AccessClass, Register};
use crate::state::StateChange;

/// Callback receiving value changes.
pub type ValueCallback = Arc<dyn Fn(&StateChange) + Send + Sync>;

/// Callback receiving the outcome of an action.
pub type ActionCallback = Arc<dyn Fn(&ActionOutcome) + Send + Sync>;

/// Result of one action press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    /// The register that was pressed.
    pub register: crate::register::RegisterId,
    /// `Ok` once the device answered, or the timeout that dropped it.
    pub result: Result<(), RequestTimeout>,
}

/// What a host entity attaches to a register.
///
/// Telemetry sinks only observe. Writable sinks observe and may write
/// through their binding. Action sinks are told how each press ended.
///
/// # Examples
///
/// ```
/// use culligan_ble::subscription::Sink;
///
/// let sink = Sink::telemetry(|change| println!("{change}"));
/// assert_eq!(sink.kind(), "telemetry");
/// ```
#[derive(Clone)]
pub enum Sink {
    /// Read-only value observer.
    Telemetry(ValueCallback),
    /// Value observer that may also write.
    Writable(ValueCallback),
    /// Action trigger.
    Action(ActionCallback),
}

impl Sink {
    /// Creates a telemetry sink.
    pub fn telemetry<F>(callback: F) -> Self
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        Self::Telemetry(Arc::new(callback))
    }

    /// Creates a writable sink.
    pub fn writable<F>(callback: F) -> Self
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        Self::Writable(Arc::new(callback))
    }

    /// Creates an action sink.
    pub fn action<F>(callback: F) -> Self
    where
        F: Fn(&ActionOutcome) + Send + Sync + 'static,
    {
        Self::Action(Arc::new(callback))
    }

    /// Short name for logs and errors.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Telemetry(_) => "telemetry",
            Self::Writable(_) => "writable",
            Self::Action(_) => "action",
        }
    }

    /// Returns true if this sink may be attached to `register`.
    ///
    /// Telemetry sinks fit any readable register, writable sinks only
    /// configuration registers, and action sinks only action registers.
    #[must_use]
    pub const fn fits(&self, register: &Register) -> bool {
        match self {
            Self::Telemetry(_) => register.access.is_readable(),
            Self::Writable(_) => matches!(register.access, AccessClass::Configuration),
            Self::Action(_) => matches!(register.access, AccessClass::Action),
        }
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sink::{}", self.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::{Catalog, RegisterId};

    #[test]
    fn sink_fit() {
        let flow = Catalog::get(RegisterId::CurrentFlow);
        let hardness = Catalog::get(RegisterId::WaterHardness);
        let regen = Catalog::get(RegisterId::RegenerateNow);

        let telemetry = Sink::telemetry(|_| {});
        let writable = Sink::writable(|_| {});
        let action = Sink::action(|_| {});

        assert!(telemetry.fits(flow));
        assert!(telemetry.fits(hardness));
        assert!(!telemetry.fits(regen));

        assert!(!writable.fits(flow));
        assert!(writable.fits(hardness));

        assert!(action.fits(regen));
        assert!(!action.fits(hardness));
    }

    #[test]
    fn debug_names_kind() {
        assert_eq!(format!("{:?}", Sink::action(|_| {})), "Sink::action");
    }
}
