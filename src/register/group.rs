// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Register groups and the pages that carry them.

use std::fmt;

/// A set of registers the device reports together.
///
/// Polling a group makes the device answer with every page of that group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterGroup {
    /// Live status, pages `uu-0` and `uu-1`.
    Status,
    /// Settings, pages `vv-0` and `vv-1`.
    Settings,
    /// Counters, page `ww-0`.
    Statistics,
}

impl RegisterGroup {
    /// Groups in polling order.
    pub const ALL: [Self; 3] = [Self::Status, Self::Settings, Self::Statistics];

    /// Byte that identifies the group on the wire.
    #[must_use]
    pub const fn byte(&self) -> u8 {
        match self {
            Self::Status => b'u',
            Self::Settings => b'v',
            Self::Statistics => b'w',
        }
    }

    /// Looks up a group by its wire byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'u' => Some(Self::Status),
            b'v' => Some(Self::Settings),
            b'w' => Some(Self::Statistics),
            _ => None,
        }
    }

    /// Pages the device sends in answer to a poll of this group.
    #[must_use]
    pub const fn pages(&self) -> &'static [PageId] {
        match self {
            Self::Status => &[PageId::STATUS_0, PageId::STATUS_1],
            Self::Settings => &[PageId::SETTINGS_0, PageId::SETTINGS_1],
            Self::Statistics => &[PageId::STATISTICS_0],
        }
    }

    /// The group that follows this one in the round-robin order.
    #[must_use]
    pub const fn next(&self) -> Self {
        match self {
            Self::Status => Self::Settings,
            Self::Settings => Self::Statistics,
            Self::Statistics => Self::Status,
        }
    }
}

impl fmt::Display for RegisterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Status => "status",
            Self::Settings => "settings",
            Self::Statistics => "statistics",
        })
    }
}

/// One 20-byte page within a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId {
    /// Group the page belongs to.
    pub group: RegisterGroup,
    /// Page number carried at offset 2.
    pub number: u8,
}

impl PageId {
    /// Real-time status (`uu-0`).
    pub const STATUS_0: Self = Self::new(RegisterGroup::Status, 0);
    /// Brine tank and regeneration status (`uu-1`).
    pub const STATUS_1: Self = Self::new(RegisterGroup::Status, 1);
    /// Configuration (`vv-0`).
    pub const SETTINGS_0: Self = Self::new(RegisterGroup::Settings, 0);
    /// Cycle times (`vv-1`).
    pub const SETTINGS_1: Self = Self::new(RegisterGroup::Settings, 1);
    /// Totals and counters (`ww-0`).
    pub const STATISTICS_0: Self = Self::new(RegisterGroup::Statistics, 0);

    /// Creates a page identifier.
    #[must_use]
    pub const fn new(group: RegisterGroup, number: u8) -> Self {
        Self { group, number }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = char::from(self.group.byte());
        write!(f, "{c}{c}-{}", self.number)
    }
}
