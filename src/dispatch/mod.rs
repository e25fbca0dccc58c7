// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoding inbound pages and dispatching their values.
//!
//! [`decode_page`] walks a page layout and range-checks every field
//! against its register descriptor. An out-of-range field is a non-fatal
//! [`DecodeError`](crate::error::DecodeError): it is counted and the cached
//! value is kept. The [`Dispatcher`] applies the rest to the cache and
//! notifies sinks and event subscribers.

mod decoder;
mod dispatcher;

pub use decoder::{DecodedPage, decode_page};
pub use dispatcher::Dispatcher;
