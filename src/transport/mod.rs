// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The radio link.
//!
//! A [`Transport`] moves 20-byte frames to the control head. Everything
//! that comes back, including link up and link loss, arrives on a separate
//! [`LinkEvent`] channel the transport was built with.
//!
//! With the `ble` feature, [`BleTransport`] implements the link over the
//! Nordic UART service.

#[cfg(feature = "ble")]
mod ble;

use std::future::Future;

use bytes::Bytes;

use crate::error::TransportError;

#[cfg(feature = "ble")]
pub use ble::{BleConfig, BleTransport, NUS_RX_CHARACTERISTIC, NUS_SERVICE, NUS_TX_CHARACTERISTIC};

/// Something that happened on the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The link can carry frames.
    Connected,
    /// The link dropped.
    Disconnected,
    /// A notification arrived. Chunks need not align with page boundaries.
    Received(Bytes),
}

/// Outbound half of the radio link.
///
/// Implementations report link up with [`LinkEvent::Connected`] once
/// frames can be written, normally before `connect` returns, and report
/// loss with [`LinkEvent::Disconnected`].
pub trait Transport: Send + 'static {
    /// Opens the link.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ConnectionFailed` if the device cannot be
    /// reached.
    fn connect(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Writes one frame.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::NotConnected` or
    /// `TransportError::SendFailed`.
    fn send(&mut self, frame: Bytes) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Closes the link. Closing a closed link is not an error.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the platform refuses to disconnect.
    fn disconnect(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
