// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pending operations.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::protocol::Command;
use crate::register::{RegisterGroup, RegisterId, RegisterValue};

/// Identifier of one enqueued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationId(u64);

impl OperationId {
    pub(crate) const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// What an operation does.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationKind {
    /// Reads every page of a group.
    Poll(RegisterGroup),
    /// Writes a configuration register.
    Write {
        /// Target register.
        register: RegisterId,
        /// Requested value.
        value: RegisterValue,
    },
    /// Triggers an action register.
    Action {
        /// Target register.
        register: RegisterId,
    },
}

impl OperationKind {
    /// Returns true for writes and actions.
    #[must_use]
    pub const fn is_user(&self) -> bool {
        !matches!(self, Self::Poll(_))
    }

    /// Returns true for actions.
    #[must_use]
    pub const fn is_action(&self) -> bool {
        matches!(self, Self::Action { .. })
    }

    /// Target register of a write or action.
    #[must_use]
    pub const fn register(&self) -> Option<RegisterId> {
        match self {
            Self::Poll(_) => None,
            Self::Write { register, .. } | Self::Action { register } => Some(*register),
        }
    }
}

/// An operation waiting for, or occupying, the channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOperation {
    id: OperationId,
    kind: OperationKind,
    command: Command,
    attempts: u8,
    enqueued_at: Instant,
}

impl PendingOperation {
    pub(crate) fn new(id: OperationId, kind: OperationKind, command: Command, enqueued_at: Instant) -> Self {
        Self {
            id,
            kind,
            command,
            attempts: 0,
            enqueued_at,
        }
    }

    /// Identifier.
    #[must_use]
    pub const fn id(&self) -> OperationId {
        self.id
    }

    /// What the operation does.
    #[must_use]
    pub const fn kind(&self) -> &OperationKind {
        &self.kind
    }

    /// The command, encoded once at enqueue time and resent unchanged.
    #[must_use]
    pub const fn command(&self) -> &Command {
        &self.command
    }

    /// How many times the frame has been sent.
    #[must_use]
    pub const fn attempts(&self) -> u8 {
        self.attempts
    }

    /// When the operation was enqueued.
    #[must_use]
    pub const fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    /// Short name for logs and events.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.command.name()
    }

    pub(crate) fn record_attempt(&mut self) -> u8 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_helpers() {
        let poll = OperationKind::Poll(RegisterGroup::Settings);
        assert!(!poll.is_user());
        assert_eq!(poll.register(), None);

        let press = OperationKind::Action {
            register: RegisterId::RegenerateNow,
        };
        assert!(press.is_user());
        assert!(press.is_action());
        assert_eq!(press.register(), Some(RegisterId::RegenerateNow));
    }

    #[test]
    fn attempts_count_up() {
        let mut op = PendingOperation::new(
            OperationId::new(7),
            OperationKind::Poll(RegisterGroup::Status),
            Command::Poll(RegisterGroup::Status),
            Instant::now(),
        );
        assert_eq!(op.attempts(), 0);
        assert_eq!(op.record_attempt(), 1);
        assert_eq!(op.record_attempt(), 2);
        assert_eq!(op.id().to_string(), "op-7");
        assert_eq!(op.name(), "poll");
    }
}
