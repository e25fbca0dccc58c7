// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The synchronization engine.
//!
//! [`Engine`] owns one session, the scheduler, the frame assembler and the
//! dispatcher. It performs no I/O: callers feed it timestamped inputs and
//! drain the [`Output`]s it queues. The async driver in
//! [`Softener`](crate::Softener) is one such caller; tests are another.
//!
//! # Examples
//!
//! ```
//! use culligan_ble::SoftenerConfig;
//! use culligan_ble::{Engine, Output};
//! use culligan_ble::protocol::Frame;
//! use culligan_ble::session::SessionState;
//! use culligan_ble::transport::LinkEvent;
//! use tokio::time::Instant;
//!
//! let mut engine = Engine::new(SoftenerConfig::default());
//! engine.start_connecting();
//! engine.handle_link(LinkEvent::Connected, Instant::now());
//!
//! assert_eq!(engine.state(), SessionState::Authenticating);
//! assert_eq!(engine.take_outputs(), vec![Output::Send(Frame::filled(b't'))]);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::time::Instant;

use crate::config::SoftenerConfig;
use crate::dispatch::Dispatcher;
use crate::error::{Error, RequestTimeout};
use crate::event::{EventBus, SessionEvent, SessionId};
use crate::protocol::{Command, Frame, FrameAssembler, Page, action_command, write_command};
use crate::register::{RegisterGroup, RegisterId, RegisterValue};
use crate::scheduler::{
    Completion, DeadlineOutcome, OperationId, OperationKind, PageOutcome, PendingOperation,
    RetryPolicy, Scheduler,
};
use crate::session::{Session, SessionState, SessionStep};
use crate::state::{RegisterCache, SharedCache};
use crate::subscription::{ActionOutcome, SinkRegistry};
use crate::transport::LinkEvent;
use crate::types::ClockTime;

/// Something the engine wants done on the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Write this frame.
    Send(Frame),
    /// Tear the link down.
    Disconnect,
}

/// The I/O-free core of a softener.
#[derive(Debug)]
pub struct Engine {
    config: SoftenerConfig,
    session: Session,
    scheduler: Scheduler,
    assembler: FrameAssembler,
    dispatcher: Dispatcher,
    events: Arc<EventBus>,
    rng: StdRng,
    outputs: VecDeque<Output>,
    last_sent: Option<Instant>,
}

impl Engine {
    /// Creates an engine with its own cache, sinks and event bus.
    #[must_use]
    pub fn new(config: SoftenerConfig) -> Self {
        Self::with_shared(
            config,
            Arc::new(RwLock::new(RegisterCache::new())),
            Arc::new(SinkRegistry::new()),
            Arc::new(EventBus::new()),
        )
    }

    /// Creates an engine over state shared with readers.
    #[must_use]
    pub fn with_shared(
        config: SoftenerConfig,
        cache: SharedCache,
        sinks: Arc<SinkRegistry>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            session: Session::new(config.password),
            scheduler: Scheduler::new(RetryPolicy::from(&config)),
            assembler: FrameAssembler::new(),
            dispatcher: Dispatcher::new(cache, sinks, Arc::clone(&events)),
            events,
            rng: StdRng::from_entropy(),
            outputs: VecDeque::new(),
            last_sent: None,
            config,
        }
    }

    /// Replaces the random source used for the password packet.
    #[must_use]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Current session state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Current session identifier.
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session.id()
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &SoftenerConfig {
        &self.config
    }

    /// The register cache.
    #[must_use]
    pub fn cache(&self) -> &SharedCache {
        self.dispatcher.cache()
    }

    /// The sink registry.
    #[must_use]
    pub fn sinks(&self) -> &Arc<SinkRegistry> {
        self.dispatcher.sinks()
    }

    /// The event bus.
    #[must_use]
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// The scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Number of decode errors seen so far.
    #[must_use]
    pub const fn decode_errors(&self) -> u64 {
        self.dispatcher.decode_errors()
    }

    /// Drains the queued outputs in order.
    pub fn take_outputs(&mut self) -> Vec<Output> {
        self.outputs.drain(..).collect()
    }

    /// Begins a connection attempt.
    ///
    /// Returns false if the session was not disconnected.
    pub fn start_connecting(&mut self) -> bool {
        let before = self.snapshot();
        let started = self.session.start_connecting();
        self.publish_transition(before);
        started
    }

    /// Ends the current attempt or session without a link event.
    ///
    /// For connects that fail or never bring the link up, and for
    /// shutdown. Pending work is discarded as on link loss.
    pub fn abort(&mut self) {
        let before = self.snapshot();
        if self.session.close() {
            tracing::info!(session = ?self.session.id(), "Session aborted");
            self.teardown();
        }
        self.publish_transition(before);
    }

    /// Feeds a link event.
    ///
    /// A `Disconnected` that arrives while connecting is left over from
    /// the previous link and does not end the new attempt.
    pub fn handle_link(&mut self, event: LinkEvent, now: Instant) {
        let before = self.snapshot();
        match event {
            LinkEvent::Connected => {
                if let Some(frame) = self.session.on_link_up(now, self.config.handshake_timeout) {
                    self.assembler.reset();
                    self.send(frame, now);
                }
            }
            LinkEvent::Disconnected => self.link_down(),
            LinkEvent::Received(bytes) => {
                tracing::trace!(len = bytes.len(), "Received chunk");
                for page in self.assembler.push(&bytes) {
                    match page {
                        Ok(page) => self.handle_page(page, now),
                        Err(error) => self.dispatcher.record_error(error),
                    }
                }
            }
        }
        self.publish_transition(before);
    }

    /// Poll interval tick. Starts a sweep unless one is outstanding.
    pub fn tick(&mut self, now: Instant) {
        if !self.session.state().is_ready() {
            tracing::trace!(state = %self.session.state(), "Ignoring poll tick");
            return;
        }
        if self.scheduler.tick() {
            tracing::debug!("Poll sweep started");
        }
        self.pump(now);
    }

    /// Queues a write.
    ///
    /// # Errors
    ///
    /// - `Error::NotReady` while disconnected
    /// - `Error::Unsupported` if the register is not writable
    /// - `Error::Validation` if the value is rejected
    pub fn submit_write(
        &mut self,
        register: RegisterId,
        value: RegisterValue,
        now: Instant,
    ) -> Result<OperationId, Error> {
        self.ensure_accepting()?;
        let command = write_command(register, &value, &self.dispatcher.cache().read())?;
        tracing::info!(register = %register, value = %value, "Write requested");
        let id = self
            .scheduler
            .enqueue(OperationKind::Write { register, value }, command, now);
        self.pump(now);
        Ok(id)
    }

    /// Queues an action.
    ///
    /// # Errors
    ///
    /// - `Error::NotReady` while disconnected
    /// - `Error::Unsupported` if the register is not an action
    pub fn submit_press(&mut self, register: RegisterId, now: Instant) -> Result<OperationId, Error> {
        self.ensure_accepting()?;
        let command = action_command(register, ClockTime::now())?;
        tracing::info!(register = %register, "Action requested");
        let id = self
            .scheduler
            .enqueue(OperationKind::Action { register }, command, now);
        self.pump(now);
        Ok(id)
    }

    /// Handles passed deadlines and due keepalives.
    pub fn on_timer(&mut self, now: Instant) {
        let before = self.snapshot();

        let step = self.session.check_deadline(now);
        self.handle_step(step, now);

        if self.session.state().is_ready() {
            match self.scheduler.on_deadline(now) {
                Some(DeadlineOutcome::Completed(completion)) => self.complete(completion),
                Some(DeadlineOutcome::Retry(frame)) => self.send(frame, now),
                Some(DeadlineOutcome::Failed { operation, error }) => self.fail(&operation, error),
                None => {}
            }
            self.pump(now);
            if self.keepalive_due(now) {
                tracing::trace!("Sending keepalive");
                self.send(Command::Keepalive.encode(), now);
            }
        }

        self.publish_transition(before);
    }

    /// Earliest instant `on_timer` has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        let keepalive = self.next_keepalive();
        [self.session.deadline(), self.scheduler.next_deadline(), keepalive]
            .into_iter()
            .flatten()
            .min()
    }

    fn ensure_accepting(&self) -> Result<(), Error> {
        if self.session.state().accepts_operations() {
            Ok(())
        } else {
            Err(Error::NotReady)
        }
    }

    fn handle_page(&mut self, page: Page, now: Instant) {
        self.session.touch(now);
        match page {
            Page::Handshake(info) => {
                let first = self.session.handshake().is_none();
                let step = self.session.on_handshake(info, now, &mut self.rng);
                if first && self.session.handshake().is_some() {
                    tracing::info!(
                        firmware = %info.firmware_version(),
                        requires_auth = info.requires_auth(),
                        "Handshake received"
                    );
                    self.events.publish(SessionEvent::HandshakeReceived {
                        session: self.session.id(),
                        firmware: info.firmware_version(),
                        requires_auth: info.requires_auth(),
                    });
                    self.dispatcher.apply_handshake(&info, now);
                }
                self.handle_step(step, now);
            }
            Page::Data(page) => match self.session.state() {
                SessionState::Authenticating => {
                    if page.id().group != RegisterGroup::Status {
                        tracing::debug!(page = %page.id(), "Discarding page before authentication");
                        return;
                    }
                    let step = self.session.on_status_page(now);
                    if step == SessionStep::Ready {
                        self.dispatcher.apply_page(&page, now);
                    }
                    self.handle_step(step, now);
                }
                SessionState::Ready => {
                    let outcome = self.scheduler.on_page(page.id());
                    if outcome.is_solicited() {
                        self.dispatcher.apply_page(&page, now);
                    } else {
                        tracing::debug!(page = %page.id(), "Discarding unsolicited page");
                    }
                    if let PageOutcome::Completed(completion) = outcome {
                        self.complete(completion);
                        self.pump(now);
                    }
                }
                SessionState::Disconnected | SessionState::Connecting => {
                    tracing::debug!(page = %page.id(), "Discarding page without session");
                }
            },
            Page::Keepalive => tracing::trace!("Keepalive echo"),
        }
    }

    fn handle_step(&mut self, step: SessionStep, now: Instant) {
        match step {
            SessionStep::Idle => {}
            SessionStep::Send(frames) => {
                for frame in frames {
                    self.send(frame, now);
                }
            }
            SessionStep::Ready => {
                self.scheduler.tick();
                self.pump(now);
            }
            SessionStep::Failed(error) => {
                self.events.publish(SessionEvent::AuthenticationFailed {
                    session: self.session.id(),
                    error,
                });
                self.outputs.push_back(Output::Disconnect);
                self.teardown();
            }
        }
    }

    fn link_down(&mut self) {
        if self.session.on_link_down() {
            tracing::info!(session = ?self.session.id(), "Link lost");
            self.teardown();
        }
    }

    /// Ends the session: discards pending work and starts a fresh session.
    fn teardown(&mut self) {
        let discarded = self.scheduler.clear();
        if !discarded.is_empty() {
            for operation in &discarded {
                if let Some(register) = action_register(operation) {
                    self.dispatcher.notify_action(&ActionOutcome {
                        register,
                        result: Err(RequestTimeout {
                            operation: format!("press {register}"),
                            attempts: operation.attempts(),
                        }),
                    });
                }
            }
            self.events.publish(SessionEvent::OperationsDiscarded {
                count: discarded.len(),
            });
        }
        self.dispatcher.mark_stale();
        self.assembler.reset();
        self.last_sent = None;
        self.session = Session::new(self.config.password);
    }

    fn complete(&mut self, completion: Completion) {
        let Completion { operation, partial } = completion;
        if operation.kind().is_user() {
            tracing::info!(operation = %operation.id(), command = operation.name(), "Operation completed");
        } else {
            tracing::debug!(operation = %operation.id(), partial, "Poll completed");
        }
        if let Some(register) = action_register(&operation) {
            self.dispatcher.notify_action(&ActionOutcome {
                register,
                result: Ok(()),
            });
        }
        self.events.publish(SessionEvent::OperationCompleted {
            id: operation.id(),
            operation: operation.name(),
            partial,
        });
    }

    fn fail(&mut self, operation: &PendingOperation, error: RequestTimeout) {
        if let Some(register) = action_register(operation) {
            self.dispatcher.notify_action(&ActionOutcome {
                register,
                result: Err(error.clone()),
            });
        }
        self.events.publish(SessionEvent::OperationFailed {
            id: operation.id(),
            error,
        });
    }

    fn pump(&mut self, now: Instant) {
        if !self.session.state().is_ready() {
            return;
        }
        if let Some(frame) = self.scheduler.next_dispatch(now) {
            self.send(frame, now);
        }
    }

    fn send(&mut self, frame: Frame, now: Instant) {
        tracing::debug!(frame = ?frame, "Sending frame");
        self.session.touch(now);
        self.last_sent = Some(now);
        self.outputs.push_back(Output::Send(frame));
    }

    fn next_keepalive(&self) -> Option<Instant> {
        let interval = self.config.keepalive_interval?;
        if !self.session.state().is_ready() || self.scheduler.in_flight().is_some() {
            return None;
        }
        self.last_sent.map(|sent| sent + interval)
    }

    fn keepalive_due(&self, now: Instant) -> bool {
        self.next_keepalive().is_some_and(|due| now >= due)
    }

    fn snapshot(&self) -> (SessionId, SessionState) {
        (self.session.id(), self.session.state())
    }

    fn publish_transition(&self, (session, from): (SessionId, SessionState)) {
        let to = self.session.state();
        if from == to {
            return;
        }
        tracing::info!(session = ?session, from = %from, to = %to, "Session state changed");
        self.events
            .publish(SessionEvent::StateChanged { session, from, to });
    }
}

fn action_register(operation: &PendingOperation) -> Option<RegisterId> {
    match operation.kind() {
        OperationKind::Action { register } => Some(*register),
        _ => None,
    }
}
