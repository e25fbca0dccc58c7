// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Session event types.

use crate::error::{AuthenticationError, DecodeError, RequestTimeout};
use crate::scheduler::OperationId;
use crate::session::SessionState;
use crate::state::StateChange;

use super::SessionId;

/// Diagnostic events emitted by a softener.
///
/// # Examples
///
/// ```
/// use culligan_ble::event::{SessionEvent, SessionId};
/// use culligan_ble::session::SessionState;
///
/// let event = SessionEvent::StateChanged {
///     session: SessionId::new(),
///     from: SessionState::Authenticating,
///     to: SessionState::Ready,
/// };
/// assert!(event.is_state_change());
/// ```
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session moved between states.
    StateChanged {
        /// Session the transition belongs to.
        session: SessionId,
        /// Previous state.
        from: SessionState,
        /// New state.
        to: SessionState,
    },

    /// The device answered the handshake.
    HandshakeReceived {
        /// Session the handshake belongs to.
        session: SessionId,
        /// Firmware version, e.g. `C6.2`.
        firmware: String,
        /// Whether the password exchange follows.
        requires_auth: bool,
    },

    /// The password exchange failed and the link was torn down.
    AuthenticationFailed {
        /// Session that failed.
        session: SessionId,
        /// Why it failed.
        error: AuthenticationError,
    },

    /// A request was answered.
    OperationCompleted {
        /// The operation.
        id: OperationId,
        /// Short operation name.
        operation: &'static str,
        /// True if a poll timed out after receiving only some pages.
        partial: bool,
    },

    /// A request ran out of attempts and was dropped.
    OperationFailed {
        /// The operation.
        id: OperationId,
        /// Timeout details.
        error: RequestTimeout,
    },

    /// Queued operations were dropped because the session ended.
    OperationsDiscarded {
        /// How many were dropped.
        count: usize,
    },

    /// An inbound page or field could not be decoded.
    DecodeFailed(DecodeError),

    /// A register took a new value.
    RegisterChanged(StateChange),
}

impl SessionEvent {
    /// Returns `true` if this is a session state transition.
    #[must_use]
    pub fn is_state_change(&self) -> bool {
        matches!(self, Self::StateChanged { .. })
    }

    /// Returns `true` if this event reports a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed { .. }
                | Self::OperationFailed { .. }
                | Self::OperationsDiscarded { .. }
                | Self::DecodeFailed(_)
        )
    }

    /// Returns the session the event is tied to, if any.
    #[must_use]
    pub fn session(&self) -> Option<SessionId> {
        match self {
            Self::StateChanged { session, .. }
            | Self::HandshakeReceived { session, .. }
            | Self::AuthenticationFailed { session, .. } => Some(*session),
            _ => None,
        }
    }
}
