// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Expected answer pages of a request.

use crate::protocol::Command;
use crate::register::{PageId, RegisterGroup};

/// Pages a request waits for.
///
/// Polls wait for every page of their group. Writes and actions are
/// answered with the group their frame is based on; its leading page
/// completes them. Later pages of that answer are not part of the request,
/// so they cannot acknowledge a request dispatched right after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// The first page of the group.
    LeadingPage(RegisterGroup),
    /// Every page of the group.
    AllPages {
        /// Group being collected.
        group: RegisterGroup,
        /// Pages still missing.
        pending: Vec<PageId>,
        /// Pages received so far.
        received: Vec<PageId>,
    },
}

impl Expectation {
    /// Builds the expectation for a command.
    ///
    /// Returns `None` for commands that are not answered with register
    /// pages.
    #[must_use]
    pub fn for_command(command: &Command) -> Option<Self> {
        match command {
            Command::Poll(group) => Some(Self::AllPages {
                group: *group,
                pending: group.pages().to_vec(),
                received: Vec::new(),
            }),
            other => other.group().map(Self::LeadingPage),
        }
    }

    /// Group whose pages answer the request.
    #[must_use]
    pub const fn group(&self) -> RegisterGroup {
        match self {
            Self::LeadingPage(group) | Self::AllPages { group, .. } => *group,
        }
    }

    /// Records an inbound page.
    ///
    /// Returns true if the page belongs to the request. Duplicates of a
    /// page already received still belong to it.
    pub fn record(&mut self, page: PageId) -> bool {
        match self {
            Self::LeadingPage(group) => {
                if page.group != *group || page.number != 0 {
                    return false;
                }
                *self = Self::AllPages {
                    group: *group,
                    pending: Vec::new(),
                    received: vec![page],
                };
                true
            }
            Self::AllPages {
                group,
                pending,
                received,
            } => {
                if page.group != *group {
                    return false;
                }
                if let Some(pos) = pending.iter().position(|p| *p == page) {
                    pending.swap_remove(pos);
                    received.push(page);
                }
                true
            }
        }
    }

    /// Returns true once every expected page has arrived.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        match self {
            Self::LeadingPage(_) => false,
            Self::AllPages { pending, .. } => pending.is_empty(),
        }
    }

    /// Returns true if some, but not all, pages have arrived.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        match self {
            Self::LeadingPage(_) => false,
            Self::AllPages {
                pending, received, ..
            } => !pending.is_empty() && !received.is_empty(),
        }
    }

    /// Number of pages received so far.
    #[must_use]
    pub fn received_count(&self) -> usize {
        match self {
            Self::LeadingPage(_) => 0,
            Self::AllPages { received, .. } => received.len(),
        }
    }

    /// Number of pages still missing.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        match self {
            Self::LeadingPage(_) => 1,
            Self::AllPages { pending, .. } => pending.len(),
        }
    }
}
