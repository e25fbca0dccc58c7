// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the softener library.
//!
//! Failures are grouped by concern: the radio link, the password exchange,
//! unanswered requests, malformed or out-of-range payloads, and rejected
//! writes. None of them is fatal to the host process; the worst outcome is a
//! dropped session, a dropped operation or a stale cached value.

use std::time::Duration;

use thiserror::Error;

use crate::register::{PageId, RegisterGroup, RegisterId};

/// The main error type for this library.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The radio link failed or dropped.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The device rejected or never answered the password exchange.
    #[error("authentication error: {0}")]
    Authentication(#[from] AuthenticationError),

    /// A request exhausted its attempts without an answer.
    #[error(transparent)]
    Timeout(#[from] RequestTimeout),

    /// An inbound page could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A write was rejected before transmission.
    #[error("validation error: {0}")]
    Validation(#[from] ValueError),

    /// The register identifier is not part of the catalog.
    #[error("unknown register: {0}")]
    UnknownRegister(String),

    /// The register does not support the requested use.
    #[error("{register} does not support {operation}")]
    Unsupported {
        /// The register that was addressed.
        register: RegisterId,
        /// What the caller tried to do.
        operation: &'static str,
    },

    /// The session is not ready to carry traffic.
    #[error("session is not ready")]
    NotReady,

    /// The background driver has stopped.
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

/// Errors related to value validation and constraints.
///
/// These errors occur when a caller tries to write a value that the
/// register cannot hold, or when a constrained type is built from an
/// invalid number.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A numeric value is outside the allowed range.
    #[error("value {actual} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Minimum allowed value.
        min: u32,
        /// Maximum allowed value.
        max: u32,
        /// The actual value that was provided.
        actual: u32,
    },

    /// The value's type does not match the register kind.
    #[error("{register} expects a {expected} value")]
    WrongKind {
        /// The register being written.
        register: RegisterId,
        /// Human readable name of the expected kind.
        expected: &'static str,
    },

    /// Encoding the value needs device state that has not been read yet.
    #[error("{register} cannot be encoded before {missing} is known")]
    MissingContext {
        /// The register being written.
        register: RegisterId,
        /// The register whose value is missing.
        missing: RegisterId,
    },

    /// A configuration setting is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Errors raised by the radio link collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection to the device failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The link is not connected.
    #[error("link is not connected")]
    NotConnected,

    /// Writing a frame to the device failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The link dropped while in use.
    #[error("link lost")]
    LinkLost,

    /// Transport configuration is invalid.
    #[error("invalid transport configuration: {0}")]
    InvalidConfiguration(String),
}

/// Errors from the password exchange.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationError {
    /// The device answered the password packet with a fresh handshake.
    #[error("password rejected by device")]
    Rejected,

    /// The device did not complete the handshake in time.
    #[error("handshake timed out after {} ms", .0.as_millis())]
    Timeout(Duration),
}

/// A request that ran out of attempts without an answer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{operation} timed out after {attempts} attempt(s)")]
pub struct RequestTimeout {
    /// Short description of the dropped operation.
    pub operation: String,
    /// How many times the frame was sent.
    pub attempts: u8,
}

/// Errors related to decoding inbound pages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The page is shorter than its layout requires.
    #[error("page too short: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes needed.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// The two header bytes do not name a known page type.
    #[error("unknown page header {0:#04x} {1:#04x}")]
    UnknownHeader(u8, u8),

    /// The page number is not part of the known layout.
    #[error("unknown {group} page {number}")]
    UnknownPage {
        /// The group named by the header.
        group: RegisterGroup,
        /// The page number at offset 2.
        number: u8,
    },

    /// The terminator byte does not match the page layout.
    #[error("bad terminator for {page}: expected {expected:#04x}, got {actual:#04x}")]
    BadTerminator {
        /// The page being checked.
        page: PageId,
        /// Expected terminator byte.
        expected: u8,
        /// Received terminator byte.
        actual: u8,
    },

    /// A decoded value is outside the register's declared bounds.
    #[error("{register} decoded {actual}, outside [{min}, {max}]")]
    OutOfRange {
        /// The register being decoded.
        register: RegisterId,
        /// Minimum allowed value.
        min: u32,
        /// Maximum allowed value.
        max: u32,
        /// The decoded raw value.
        actual: u32,
    },

    /// A raw field does not fit the register's codec.
    #[error("{register}: {message}")]
    InvalidValue {
        /// The register being decoded.
        register: RegisterId,
        /// Description of the failure.
        message: String,
    },
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_error_display() {
        let err = ValueError::OutOfRange {
            min: 0,
            max: 99,
            actual: 150,
        };
        assert_eq!(err.to_string(), "value 150 is out of range [0, 99]");
    }

    #[test]
    fn error_from_value_error() {
        let value_err = ValueError::InvalidConfiguration("poll interval".to_string());
        let err: Error = value_err.into();
        assert!(matches!(
            err,
            Error::Validation(ValueError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn decode_error_display() {
        let err = DecodeError::OutOfRange {
            register: RegisterId::SaltLevel,
            min: 0,
            max: 500,
            actual: 520,
        };
        assert_eq!(err.to_string(), "salt_level decoded 520, outside [0, 500]");
    }

    #[test]
    fn auth_timeout_display() {
        let err = AuthenticationError::Timeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "handshake timed out after 10000 ms");
    }

    #[test]
    fn request_timeout_display() {
        let err: Error = RequestTimeout {
            operation: "action regenerate_now".to_string(),
            attempts: 1,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "action regenerate_now timed out after 1 attempt(s)"
        );
    }
}
