// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Poll and command scheduling.
//!
//! The device answers one request at a time over a lossy link. The
//! [`Scheduler`] keeps a single request outstanding, matches inbound pages
//! against what that request [expects](Expectation), and retries or drops
//! it when its deadline passes.
//!
//! Actions get a smaller attempt budget than polls and writes, one by
//! default, so a lost acknowledgment never repeats a regeneration.

mod expectation;
mod operation;
mod queue;

pub use expectation::Expectation;
pub use operation::{OperationId, OperationKind, PendingOperation};
pub use queue::{Completion, DeadlineOutcome, PageOutcome, RetryPolicy, Scheduler};
