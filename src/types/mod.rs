// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types for softener control.
//!
//! Each type ensures values are within their valid ranges at construction
//! time.
//!
//! # Types
//!
//! - [`Password`] - Four digit device PIN (0-9999)
//! - [`ClockTime`] - Twelve hour wall clock used by the control head
//! - [`TankType`] - Brine tank diameter and its salt multiplier

pub mod brine;
mod clock;
mod password;

pub use brine::TankType;
pub use clock::{ClockTime, format_12h};
pub use password::Password;
