// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Register sinks.
//!
//! Host entities observe and drive registers by attaching a [`Sink`]. A
//! single registration call covers all three kinds:
//!
//! - [`Sink::Telemetry`] - observes a readable register
//! - [`Sink::Writable`] - observes a configuration register and may write it
//! - [`Sink::Action`] - triggers an action register and hears how it ended
//!
//! Attaching returns a [`SubscriptionId`] used to detach later.
//!
//! # Examples
//!
//! ```
//! use culligan_ble::register::RegisterId;
//! use culligan_ble::subscription::{Sink, SinkRegistry};
//!
//! let registry = SinkRegistry::new();
//! let id = registry
//!     .attach(RegisterId::SaltLevel, Sink::writable(|change| println!("{change}")))
//!     .unwrap();
//!
//! // Actions reject value sinks
//! assert!(registry.attach(RegisterId::RegenerateNow, Sink::telemetry(|_| {})).is_err());
//!
//! assert!(registry.detach(id));
//! ```

mod callback;
mod sink;

pub use callback::{SinkRegistry, SubscriptionId};
pub use sink::{ActionCallback, ActionOutcome, Sink, ValueCallback};
