// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The register model.
//!
//! A register is a named, typed device attribute with a fixed access class.
//! The [`Catalog`] holds one immutable [`Register`] descriptor per
//! [`RegisterId`], plus the byte layout of every inbound page.
//!
//! | Access class | Examples |
//! |--------------|----------|
//! | [`AccessClass::Telemetry`] | `current_flow`, `total_gallons`, `bypass_active` |
//! | [`AccessClass::Configuration`] | `water_hardness`, `salt_level`, `display` |
//! | [`AccessClass::Action`] | `regenerate_now`, `sync_time`, `reset_gallons` |

mod catalog;
mod codec;
mod group;
mod id;
mod value;

pub use catalog::{Catalog, Field, PageLayout, Register, Source};
pub use codec::Codec;
pub use group::{PageId, RegisterGroup};
pub use id::RegisterId;
pub use value::{AccessClass, Bounds, RegisterValue, Unit, ValueKind};
