// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Diagnostic event stream.
//!
//! Every softener owns an [`EventBus`] and publishes a [`SessionEvent`] for
//! session transitions, authentication failures, dropped operations and
//! decode errors. Subscribers that fall behind lose the oldest events.
//!
//! # Examples
//!
//! ```
//! use culligan_ble::event::{EventBus, SessionEvent};
//!
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe();
//!
//! bus.publish(SessionEvent::OperationsDiscarded { count: 1 });
//! assert!(rx.try_recv().unwrap().is_failure());
//! ```

mod event_bus;
mod session_event;
mod session_id;

pub use event_bus::EventBus;
pub use session_event::SessionEvent;
pub use session_id::SessionId;
