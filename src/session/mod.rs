// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Session state machine.
//!
//! ```text
//! Disconnected -> Connecting -> Authenticating -> Ready
//!       ^______________|______________|____________|   (link loss)
//! ```
//!
//! On link up the session sends the handshake request. Firmware that
//! asks for it gets the password packet and a status poll, and the first
//! status page afterwards confirms the password. A second handshake page
//! means the password was wrong. Either failure, or running out of time,
//! ends the session.

mod machine;
mod state;

pub use machine::{Session, SessionStep};
pub use state::SessionState;
