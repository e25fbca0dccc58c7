// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Session state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No link.
    #[default]
    Disconnected,
    /// Waiting for the link to come up.
    Connecting,
    /// Link up, handshake and password exchange in progress.
    Authenticating,
    /// Polls, writes and actions may be sent.
    Ready,
}

impl SessionState {
    /// Returns true if the scheduler may transmit.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns true if user operations may be queued.
    ///
    /// Operations queued before `Ready` are sent once the session is up.
    #[must_use]
    pub const fn accepts_operations(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
        })
    }
}
