// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The session state machine.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::error::AuthenticationError;
use crate::event::SessionId;
use crate::protocol::{Command, Frame, HandshakeInfo, auth};
use crate::register::RegisterGroup;
use crate::types::Password;

use super::SessionState;

/// Sub-phase of `Authenticating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthPhase {
    AwaitingHandshake,
    AwaitingAck,
}

/// What the engine should do after feeding the session an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStep {
    /// Nothing to do.
    Idle,
    /// Send these frames in order.
    Send(Vec<Frame>),
    /// The session just became `Ready`.
    Ready,
    /// Authentication failed; tear the link down.
    Failed(AuthenticationError),
}

/// One protocol session with the control head.
///
/// A session never outlives its link: after a disconnect the engine
/// starts over with a fresh one.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use culligan_ble::protocol::HandshakeInfo;
/// use culligan_ble::session::{Session, SessionState, SessionStep};
/// use culligan_ble::types::Password;
/// use rand::SeedableRng;
/// use rand::rngs::StdRng;
/// use tokio::time::Instant;
///
/// let mut rng = StdRng::seed_from_u64(1);
/// let mut session = Session::new(Password::DEFAULT);
/// session.start_connecting();
///
/// let now = Instant::now();
/// assert!(session.on_link_up(now, Duration::from_secs(10)).is_some());
/// assert_eq!(session.state(), SessionState::Authenticating);
///
/// let info = HandshakeInfo { firmware_major: 6, firmware_minor: 2, auth_flag: 0, connection_counter: 9 };
/// assert_eq!(session.on_handshake(info, now, &mut rng), SessionStep::Ready);
/// assert!(session.state().is_ready());
/// ```
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    state: SessionState,
    password: Password,
    phase: AuthPhase,
    deadline: Option<Instant>,
    timeout: Duration,
    last_activity: Option<Instant>,
    handshake: Option<HandshakeInfo>,
}

impl Session {
    /// Creates a disconnected session.
    #[must_use]
    pub fn new(password: Password) -> Self {
        Self {
            id: SessionId::new(),
            state: SessionState::Disconnected,
            password,
            phase: AuthPhase::AwaitingHandshake,
            deadline: None,
            timeout: Duration::ZERO,
            last_activity: None,
            handshake: None,
        }
    }

    /// Session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// The handshake reply, once received.
    #[must_use]
    pub const fn handshake(&self) -> Option<&HandshakeInfo> {
        self.handshake.as_ref()
    }

    /// When the last frame was sent or received.
    #[must_use]
    pub const fn last_activity(&self) -> Option<Instant> {
        self.last_activity
    }

    /// Handshake deadline while authenticating.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Records link traffic.
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = Some(now);
    }

    /// Moves from `Disconnected` to `Connecting`.
    ///
    /// Returns false if the session was not disconnected.
    pub fn start_connecting(&mut self) -> bool {
        if self.state != SessionState::Disconnected {
            return false;
        }
        self.state = SessionState::Connecting;
        true
    }

    /// Handles the link coming up.
    ///
    /// Returns the handshake request to send and arms the deadline.
    /// A link that comes up on its own while disconnected is accepted too.
    pub fn on_link_up(&mut self, now: Instant, timeout: Duration) -> Option<Frame> {
        if !matches!(
            self.state,
            SessionState::Disconnected | SessionState::Connecting
        ) {
            tracing::debug!(session = ?self.id, state = %self.state, "Ignoring duplicate link up");
            return None;
        }
        self.state = SessionState::Authenticating;
        self.phase = AuthPhase::AwaitingHandshake;
        self.deadline = Some(now + timeout);
        self.timeout = timeout;
        self.touch(now);
        Some(Command::Handshake.encode())
    }

    /// Handles a `tt` page.
    pub fn on_handshake<R: Rng + ?Sized>(
        &mut self,
        info: HandshakeInfo,
        now: Instant,
        rng: &mut R,
    ) -> SessionStep {
        self.touch(now);
        match (self.state, self.phase) {
            (SessionState::Authenticating, AuthPhase::AwaitingHandshake) => {
                self.handshake = Some(info);
                if !info.requires_auth() {
                    tracing::debug!(firmware = %info.firmware_version(), "No password required");
                    return self.become_ready();
                }
                tracing::debug!(
                    firmware = %info.firmware_version(),
                    counter = info.connection_counter,
                    "Sending password"
                );
                self.phase = AuthPhase::AwaitingAck;
                let packet = auth::build_packet(self.password, info.connection_counter, rng);
                let poll = Command::Poll(RegisterGroup::Status).encode();
                SessionStep::Send(vec![packet, poll])
            }
            (SessionState::Authenticating, AuthPhase::AwaitingAck) => {
                self.fail(AuthenticationError::Rejected)
            }
            _ => {
                tracing::debug!(state = %self.state, "Ignoring unexpected handshake page");
                SessionStep::Idle
            }
        }
    }

    /// Handles a status page while the password is being checked.
    ///
    /// The first status page after the password packet means it was
    /// accepted.
    pub fn on_status_page(&mut self, now: Instant) -> SessionStep {
        self.touch(now);
        if self.state == SessionState::Authenticating && self.phase == AuthPhase::AwaitingAck {
            return self.become_ready();
        }
        SessionStep::Idle
    }

    /// Fails the session if the handshake deadline has passed.
    pub fn check_deadline(&mut self, now: Instant) -> SessionStep {
        match self.deadline {
            Some(deadline) if self.state == SessionState::Authenticating && now >= deadline => {
                self.fail(AuthenticationError::Timeout(self.timeout))
            }
            _ => SessionStep::Idle,
        }
    }

    /// Handles link loss. Returns true if the state changed.
    ///
    /// While connecting no link of this session is up yet, so the loss
    /// reported there belongs to a previous link and is ignored.
    pub fn on_link_down(&mut self) -> bool {
        if self.state == SessionState::Connecting {
            tracing::debug!(session = ?self.id, "Ignoring link loss before link up");
            return false;
        }
        self.close()
    }

    /// Ends the session from any state. Returns true if the state changed.
    pub fn close(&mut self) -> bool {
        let changed = self.state != SessionState::Disconnected;
        self.state = SessionState::Disconnected;
        self.deadline = None;
        changed
    }

    fn become_ready(&mut self) -> SessionStep {
        self.state = SessionState::Ready;
        self.deadline = None;
        SessionStep::Ready
    }

    fn fail(&mut self, error: AuthenticationError) -> SessionStep {
        tracing::warn!(session = ?self.id, error = %error, "Authentication failed");
        self.state = SessionState::Disconnected;
        self.deadline = None;
        SessionStep::Failed(error)
    }
}
