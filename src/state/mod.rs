// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Register value state.
//!
//! The [`RegisterCache`] holds the last decoded value of every register.
//! Only the engine writes it; readers get a shared handle or a snapshot.
//! Each accepted update yields a [`StateChange`].
//!
//! # Examples
//!
//! ```
//! use culligan_ble::register::{RegisterId, RegisterValue};
//! use culligan_ble::state::RegisterCache;
//! use tokio::time::Instant;
//!
//! let mut cache = RegisterCache::new();
//! cache.apply(RegisterId::DisplayOff, RegisterValue::Flag(false), Instant::now());
//! cache.mark_stale();
//!
//! assert!(cache.get(RegisterId::DisplayOff).unwrap().is_stale());
//! ```

mod cache;
mod state_change;

use std::sync::Arc;

use parking_lot::RwLock;

pub use cache::{CachedValue, RegisterCache};
pub use state_change::StateChange;

/// Cache handle shared between the engine and readers.
pub type SharedCache = Arc<RwLock<RegisterCache>>;
