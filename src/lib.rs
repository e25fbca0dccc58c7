// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `culligan_ble` - synchronize and control Culligan water softeners over
//! Bluetooth LE.
//!
//! The control head speaks a small paged protocol over the Nordic UART
//! service: 20-byte frames out, 20-byte pages back. This crate keeps a
//! typed cache of every register the head reports, polls it on a fixed
//! interval, and turns writes and button presses into command frames
//! delivered one at a time.
//!
//! # Layers
//!
//! - [`register`]: the register catalog, page layouts and value codecs
//! - [`protocol`]: frames, page reassembly, command encoding, auth packet
//! - [`session`]: connect, handshake and authentication state machine
//! - [`scheduler`]: single-flight poll and command queue with retries
//! - [`dispatch`]: page decoding and fan-out to the cache and sinks
//! - [`Engine`]: all of the above behind a sans-IO interface
//! - [`Softener`]: a background task driving the engine over a [`Transport`]
//!
//! # Quick Start
//!
//! ```ignore
//! use culligan_ble::{Softener, SoftenerConfig};
//! use culligan_ble::register::RegisterId;
//! use culligan_ble::subscription::Sink;
//! use culligan_ble::transport::{BleConfig, BleTransport};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> culligan_ble::Result<()> {
//!     let (tx, rx) = mpsc::channel(64);
//!     let transport = BleTransport::new(BleConfig::new("Culligan"), tx);
//!     let config = SoftenerConfig::default().with_password(1234)?;
//!     let softener = Softener::spawn(transport, rx, config)?;
//!
//!     softener.attach(
//!         RegisterId::SaltLevel,
//!         Sink::telemetry(|change| println!("{change}")),
//!     )?;
//!
//!     let regenerate = softener.attach(RegisterId::RegenerateNow, Sink::action(|_| {}))?;
//!     regenerate.press().await?;
//!
//!     softener.shutdown().await
//! }
//! ```
//!
//! # Testing without a radio
//!
//! [`Engine`] never performs I/O. Feed it [`LinkEvent`]s and timer
//! callbacks, then read the frames it wants written from
//! [`Engine::take_outputs`].

pub mod config;
pub mod dispatch;
mod engine;
pub mod error;
pub mod event;
pub mod protocol;
pub mod register;
pub mod scheduler;
pub mod session;
mod softener;
pub mod state;
pub mod subscription;
pub mod transport;
pub mod types;

pub use config::{ReconnectionPolicy, SoftenerConfig};
pub use engine::{Engine, Output};
pub use error::{
    AuthenticationError, DecodeError, Error, RequestTimeout, Result, TransportError, ValueError,
};
pub use event::{EventBus, SessionEvent, SessionId};
pub use register::{Catalog, RegisterGroup, RegisterId, RegisterValue};
pub use scheduler::OperationId;
pub use session::SessionState;
pub use softener::{Binding, Softener};
pub use state::{CachedValue, RegisterCache, StateChange};
pub use subscription::{ActionOutcome, Sink, SubscriptionId};
pub use transport::{LinkEvent, Transport};
pub use types::{ClockTime, Password};
