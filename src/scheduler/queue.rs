// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The request queue and its retry policy.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::SoftenerConfig;
use crate::error::RequestTimeout;
use crate::protocol::{Command, Frame};
use crate::register::{PageId, RegisterGroup};

use super::{Expectation, OperationId, OperationKind, PendingOperation};

/// Attempt budget and per-request timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// How long each attempt waits for its answer.
    pub timeout: Duration,
    /// Attempts for polls and writes.
    pub max_attempts: u8,
    /// Attempts for actions.
    pub action_attempts: u8,
}

impl RetryPolicy {
    /// Attempt budget for an operation.
    #[must_use]
    pub const fn budget(&self, kind: &OperationKind) -> u8 {
        if kind.is_action() {
            self.action_attempts
        } else {
            self.max_attempts
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&SoftenerConfig::default())
    }
}

impl From<&SoftenerConfig> for RetryPolicy {
    fn from(config: &SoftenerConfig) -> Self {
        Self {
            timeout: config.request_timeout,
            max_attempts: config.max_attempts,
            action_attempts: config.action_attempts,
        }
    }
}

/// A request that finished.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// The finished operation.
    pub operation: PendingOperation,
    /// A poll that timed out after receiving only some of its pages.
    pub partial: bool,
}

/// How an inbound data page relates to the in-flight request.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    /// The page finished the in-flight request.
    Completed(Completion),
    /// The page belongs to the in-flight request, which needs more.
    Progress,
    /// A late page of the request that just finished.
    Trailing,
    /// Nothing asked for this page.
    Unsolicited,
}

impl PageOutcome {
    /// Returns true if the page should be decoded.
    #[must_use]
    pub const fn is_solicited(&self) -> bool {
        !matches!(self, Self::Unsolicited)
    }
}

/// What a passed deadline means for the in-flight request.
#[derive(Debug, Clone, PartialEq)]
pub enum DeadlineOutcome {
    /// A poll gave up on its missing pages but kept the rest.
    Completed(Completion),
    /// Send the same frame again.
    Retry(Frame),
    /// The operation ran out of attempts and was dropped.
    Failed {
        /// The dropped operation.
        operation: PendingOperation,
        /// What to report.
        error: RequestTimeout,
    },
}

#[derive(Debug)]
struct InFlight {
    operation: PendingOperation,
    expectation: Expectation,
    deadline: Instant,
}

/// Orders requests over the single channel to the device.
///
/// User writes and actions go first, oldest first. Polls run in sweeps: a
/// tick queues every group once, starting at a round-robin cursor. Only
/// one request is outstanding at a time.
///
/// The scheduler never checks the session state; callers only ask it for
/// frames while the session is ready.
///
/// # Examples
///
/// ```
/// use culligan_ble::register::{PageId, RegisterGroup};
/// use culligan_ble::scheduler::{PageOutcome, Scheduler};
/// use tokio::time::Instant;
///
/// let mut scheduler = Scheduler::default();
/// let now = Instant::now();
/// assert!(scheduler.tick());
///
/// let frame = scheduler.next_dispatch(now).unwrap();
/// assert_eq!(frame.as_bytes()[0], b'u');
/// assert_eq!(scheduler.on_page(PageId::STATUS_0), PageOutcome::Progress);
/// assert!(matches!(scheduler.on_page(PageId::STATUS_1), PageOutcome::Completed(_)));
/// ```
#[derive(Debug)]
pub struct Scheduler {
    policy: RetryPolicy,
    next_id: u64,
    user: VecDeque<PendingOperation>,
    sweep: VecDeque<RegisterGroup>,
    cursor: RegisterGroup,
    in_flight: Option<InFlight>,
    trailing: Option<RegisterGroup>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl Scheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            next_id: 1,
            user: VecDeque::new(),
            sweep: VecDeque::new(),
            cursor: RegisterGroup::Status,
            in_flight: None,
            trailing: None,
        }
    }

    /// The retry policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Queues a write or action behind earlier user operations.
    pub fn enqueue(&mut self, kind: OperationKind, command: Command, now: Instant) -> OperationId {
        let id = self.allocate_id();
        tracing::debug!(operation = %id, command = command.name(), queued = self.user.len(), "Enqueued");
        self.user
            .push_back(PendingOperation::new(id, kind, command, now));
        id
    }

    /// Starts a poll sweep.
    ///
    /// Returns false if the tick was coalesced because a sweep or a
    /// request is still outstanding.
    pub fn tick(&mut self) -> bool {
        if !self.sweep.is_empty() || self.in_flight.is_some() {
            tracing::debug!(
                sweep = self.sweep.len(),
                busy = self.in_flight.is_some(),
                "Coalescing poll tick"
            );
            return false;
        }
        let mut group = self.cursor;
        for _ in 0..RegisterGroup::ALL.len() {
            self.sweep.push_back(group);
            group = group.next();
        }
        true
    }

    /// Takes the next request if the channel is free.
    ///
    /// Returns the frame to send, or `None` if a request is outstanding
    /// or nothing is queued.
    pub fn next_dispatch(&mut self, now: Instant) -> Option<Frame> {
        if self.in_flight.is_some() {
            return None;
        }
        let mut operation = match self.user.pop_front() {
            Some(operation) => operation,
            None => {
                let group = self.sweep.pop_front()?;
                self.cursor = group.next();
                let id = self.allocate_id();
                PendingOperation::new(id, OperationKind::Poll(group), Command::Poll(group), now)
            }
        };

        let Some(expectation) = Expectation::for_command(operation.command()) else {
            tracing::warn!(operation = %operation.id(), command = operation.name(), "Dropping unanswerable command");
            return None;
        };
        let attempt = operation.record_attempt();
        let frame = operation.command().encode();
        tracing::debug!(
            operation = %operation.id(),
            command = operation.name(),
            attempt,
            "Dispatching"
        );
        self.in_flight = Some(InFlight {
            operation,
            expectation,
            deadline: now + self.policy.timeout,
        });
        Some(frame)
    }

    /// Matches an inbound data page against the in-flight request.
    pub fn on_page(&mut self, page: PageId) -> PageOutcome {
        if let Some(in_flight) = self.in_flight.as_mut() {
            if in_flight.expectation.record(page) {
                if !in_flight.expectation.is_complete() {
                    return PageOutcome::Progress;
                }
                return match self.finish() {
                    Some(operation) => PageOutcome::Completed(Completion {
                        operation,
                        partial: false,
                    }),
                    None => PageOutcome::Unsolicited,
                };
            }
        }
        if self.trailing == Some(page.group) {
            return PageOutcome::Trailing;
        }
        tracing::debug!(page = %page, "Unsolicited page");
        PageOutcome::Unsolicited
    }

    /// Handles a passed request deadline.
    ///
    /// Returns `None` if nothing is in flight or its deadline is still
    /// ahead.
    pub fn on_deadline(&mut self, now: Instant) -> Option<DeadlineOutcome> {
        let timeout = self.policy.timeout;
        let in_flight = self.in_flight.as_mut()?;
        if now < in_flight.deadline {
            return None;
        }

        if in_flight.expectation.is_partial() {
            tracing::debug!(
                operation = %in_flight.operation.id(),
                received = in_flight.expectation.received_count(),
                missing = in_flight.expectation.pending_count(),
                "Poll completed partially"
            );
            let operation = self.finish()?;
            return Some(DeadlineOutcome::Completed(Completion {
                operation,
                partial: true,
            }));
        }

        let budget = self.policy.budget(in_flight.operation.kind());
        if in_flight.operation.attempts() < budget {
            let attempt = in_flight.operation.record_attempt();
            in_flight.deadline = now + timeout;
            tracing::debug!(
                operation = %in_flight.operation.id(),
                attempt,
                budget,
                "Retrying"
            );
            return Some(DeadlineOutcome::Retry(in_flight.operation.command().encode()));
        }

        let operation = self.in_flight.take()?.operation;
        let error = RequestTimeout {
            operation: operation_label(&operation),
            attempts: operation.attempts(),
        };
        tracing::warn!(operation = %operation.id(), error = %error, "Operation failed");
        Some(DeadlineOutcome::Failed { operation, error })
    }

    /// Deadline of the in-flight request.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.in_flight.as_ref().map(|f| f.deadline)
    }

    /// The in-flight request.
    #[must_use]
    pub fn in_flight(&self) -> Option<&PendingOperation> {
        self.in_flight.as_ref().map(|f| &f.operation)
    }

    /// Number of queued user operations.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.user.len()
    }

    /// Returns true if a sweep still has groups to poll.
    #[must_use]
    pub fn sweep_pending(&self) -> bool {
        !self.sweep.is_empty()
    }

    /// Returns true if nothing is queued or outstanding.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.user.is_empty() && self.sweep.is_empty()
    }

    /// Drops everything queued or outstanding.
    ///
    /// Returns the discarded operations, in-flight first. Polls not yet
    /// dispatched are not operations and are dropped silently.
    pub fn clear(&mut self) -> Vec<PendingOperation> {
        let mut discarded: Vec<_> = self.in_flight.take().map(|f| f.operation).into_iter().collect();
        discarded.extend(self.user.drain(..));
        self.sweep.clear();
        self.trailing = None;
        if !discarded.is_empty() {
            tracing::debug!(count = discarded.len(), "Discarded pending operations");
        }
        discarded
    }

    fn finish(&mut self) -> Option<PendingOperation> {
        let in_flight = self.in_flight.take()?;
        self.trailing = Some(in_flight.expectation.group());
        Some(in_flight.operation)
    }

    fn allocate_id(&mut self) -> OperationId {
        let id = OperationId::new(self.next_id);
        self.next_id += 1;
        id
    }
}

fn operation_label(operation: &PendingOperation) -> String {
    match operation.kind() {
        OperationKind::Poll(group) => format!("poll {group}"),
        OperationKind::Write { register, .. } => format!("write {register}"),
        OperationKind::Action { register } => format!("press {register}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::{RegisterId, RegisterValue};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn scheduler() -> Scheduler {
        Scheduler::new(RetryPolicy {
            timeout: TIMEOUT,
            max_attempts: 3,
            action_attempts: 1,
        })
    }

    fn write(scheduler: &mut Scheduler, percent: u8, now: Instant) -> OperationId {
        scheduler.enqueue(
            OperationKind::Write {
                register: RegisterId::ReserveCapacity,
                value: RegisterValue::Integer(u32::from(percent)),
            },
            Command::SetReserveCapacity(percent),
            now,
        )
    }

    fn press(scheduler: &mut Scheduler, now: Instant) -> OperationId {
        scheduler.enqueue(
            OperationKind::Action {
                register: RegisterId::RegenerateNow,
            },
            Command::RegenerateNow,
            now,
        )
    }

    fn complete_sweep(scheduler: &mut Scheduler, now: Instant) -> Vec<u8> {
        let mut bases = Vec::new();
        while let Some(frame) = scheduler.next_dispatch(now) {
            let base = frame.as_bytes()[0];
            bases.push(base);
            let group = RegisterGroup::from_byte(base).unwrap();
            for page in group.pages() {
                scheduler.on_page(*page);
            }
        }
        bases
    }

    #[test]
    fn tick_sweeps_every_group_once() {
        let now = Instant::now();
        let mut scheduler = scheduler();
        assert!(scheduler.tick());
        assert_eq!(complete_sweep(&mut scheduler, now), vec![b'u', b'v', b'w']);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn tick_is_coalesced_while_busy() {
        let now = Instant::now();
        let mut scheduler = scheduler();
        assert!(scheduler.tick());
        assert!(!scheduler.tick());

        scheduler.next_dispatch(now);
        assert!(!scheduler.tick());

        scheduler.clear();
        write(&mut scheduler, 10, now);
        scheduler.next_dispatch(now);
        assert!(!scheduler.tick(), "in-flight write coalesces too");
    }

    #[test]
    fn user_operations_jump_the_sweep() {
        let now = Instant::now();
        let mut scheduler = scheduler();
        scheduler.tick();

        // Status poll goes out first, then the write is queued
        assert_eq!(scheduler.next_dispatch(now).unwrap().as_bytes()[0], b'u');
        let id = write(&mut scheduler, 25, now);
        assert_eq!(scheduler.next_dispatch(now), None, "one request at a time");

        scheduler.on_page(PageId::STATUS_0);
        scheduler.on_page(PageId::STATUS_1);

        let frame = scheduler.next_dispatch(now).unwrap();
        assert_eq!(frame, Command::SetReserveCapacity(25).encode());
        assert_eq!(scheduler.in_flight().unwrap().id(), id);
    }

    #[test]
    fn user_operations_run_oldest_first() {
        let now = Instant::now();
        let mut scheduler = scheduler();
        let first = write(&mut scheduler, 10, now);
        let second = press(&mut scheduler, now);

        scheduler.next_dispatch(now);
        assert_eq!(scheduler.in_flight().unwrap().id(), first);
        scheduler.on_page(PageId::SETTINGS_0);

        scheduler.next_dispatch(now);
        assert_eq!(scheduler.in_flight().unwrap().id(), second);
    }

    #[test]
    fn write_completes_on_the_leading_page_of_its_group() {
        let now = Instant::now();
        let mut scheduler = scheduler();
        let id = write(&mut scheduler, 10, now);
        scheduler.next_dispatch(now);

        assert_eq!(scheduler.on_page(PageId::STATUS_0), PageOutcome::Unsolicited);
        assert_eq!(scheduler.on_page(PageId::SETTINGS_1), PageOutcome::Unsolicited);
        let PageOutcome::Completed(done) = scheduler.on_page(PageId::SETTINGS_0) else {
            panic!("write should complete");
        };
        assert_eq!(done.operation.id(), id);
        assert!(!done.partial);

        // The device sends the whole group; the rest still decodes
        assert_eq!(scheduler.on_page(PageId::SETTINGS_1), PageOutcome::Trailing);
        assert!(PageOutcome::Trailing.is_solicited());
    }

    #[test]
    fn trailing_page_does_not_acknowledge_the_next_write() {
        let now = Instant::now();
        let mut scheduler = scheduler();
        let first = write(&mut scheduler, 10, now);
        let second = write(&mut scheduler, 20, now);
        scheduler.next_dispatch(now);

        let PageOutcome::Completed(done) = scheduler.on_page(PageId::SETTINGS_0) else {
            panic!("first write should complete");
        };
        assert_eq!(done.operation.id(), first);
        scheduler.next_dispatch(now);

        assert_eq!(scheduler.on_page(PageId::SETTINGS_1), PageOutcome::Trailing);
        assert_eq!(scheduler.in_flight().unwrap().id(), second);
    }

    #[test]
    fn poll_retries_with_same_frame_then_fails() {
        let start = Instant::now();
        let mut scheduler = scheduler();
        scheduler.tick();
        let first = scheduler.next_dispatch(start).unwrap();

        assert_eq!(scheduler.on_deadline(start + Duration::from_secs(4)), None);

        let mut now = start + TIMEOUT;
        for _ in 0..2 {
            assert_eq!(scheduler.on_deadline(now), Some(DeadlineOutcome::Retry(first)));
            now += TIMEOUT;
        }
        let Some(DeadlineOutcome::Failed { operation, error }) = scheduler.on_deadline(now) else {
            panic!("third timeout should drop the poll");
        };
        assert_eq!(operation.attempts(), 3);
        assert_eq!(error.attempts, 3);
        assert_eq!(error.operation, "poll status");

        // The sweep carries on with the next group
        assert_eq!(scheduler.next_dispatch(now).unwrap().as_bytes()[0], b'v');
    }

    #[test]
    fn action_is_sent_once() {
        let now = Instant::now();
        let mut scheduler = scheduler();
        press(&mut scheduler, now);
        scheduler.next_dispatch(now);

        let Some(DeadlineOutcome::Failed { operation, error }) = scheduler.on_deadline(now + TIMEOUT)
        else {
            panic!("action must not be retried");
        };
        assert_eq!(operation.attempts(), 1);
        assert_eq!(error.operation, "press regenerate_now");
        assert!(scheduler.is_idle());
    }

    #[test]
    fn action_budget_is_configurable() {
        let now = Instant::now();
        let mut scheduler = Scheduler::new(RetryPolicy {
            timeout: TIMEOUT,
            max_attempts: 3,
            action_attempts: 2,
        });
        press(&mut scheduler, now);
        scheduler.next_dispatch(now);
        assert!(matches!(
            scheduler.on_deadline(now + TIMEOUT),
            Some(DeadlineOutcome::Retry(_))
        ));
    }

    #[test]
    fn partial_poll_completes_on_timeout() {
        let now = Instant::now();
        let mut scheduler = scheduler();
        scheduler.tick();
        scheduler.next_dispatch(now);
        assert_eq!(scheduler.on_page(PageId::STATUS_1), PageOutcome::Progress);

        let Some(DeadlineOutcome::Completed(done)) = scheduler.on_deadline(now + TIMEOUT) else {
            panic!("expected partial completion");
        };
        assert!(done.partial);
        assert_eq!(done.operation.attempts(), 1);
    }

    #[test]
    fn cursor_resumes_after_interrupted_sweep() {
        let now = Instant::now();
        let mut scheduler = scheduler();
        scheduler.tick();
        scheduler.next_dispatch(now);
        scheduler.on_page(PageId::STATUS_0);
        scheduler.on_page(PageId::STATUS_1);
        scheduler.next_dispatch(now);

        assert_eq!(scheduler.clear().len(), 1);
        assert!(scheduler.tick());
        assert_eq!(complete_sweep(&mut scheduler, now), vec![b'w', b'u', b'v']);
    }

    #[test]
    fn clear_discards_user_operations() {
        let now = Instant::now();
        let mut scheduler = scheduler();
        let a = write(&mut scheduler, 10, now);
        let b = press(&mut scheduler, now);
        scheduler.tick();
        scheduler.next_dispatch(now);

        let discarded: Vec<_> = scheduler.clear().iter().map(PendingOperation::id).collect();
        assert_eq!(discarded, vec![a, b]);
        assert!(scheduler.is_idle());
        assert_eq!(scheduler.next_deadline(), None);
        assert_eq!(scheduler.on_page(PageId::SETTINGS_0), PageOutcome::Unsolicited);
    }

    #[test]
    fn ids_are_unique() {
        let now = Instant::now();
        let mut scheduler = scheduler();
        scheduler.tick();
        scheduler.next_dispatch(now);
        let poll = scheduler.in_flight().unwrap().id();
        let a = write(&mut scheduler, 1, now);
        let b = write(&mut scheduler, 2, now);
        assert!(poll < a && a < b);
    }
}
