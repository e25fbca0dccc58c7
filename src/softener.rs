// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level softener handle.
//!
//! [`Softener::spawn`] moves an [`Engine`] and a [`Transport`] into a
//! background task. That task is the only place the engine runs: ticks,
//! deadlines, link events and caller requests all go through one
//! `tokio::select!` loop. Handles talk to it over a channel and read the
//! cache directly.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::SoftenerConfig;
use crate::engine::{Engine, Output};
use crate::error::Error;
use crate::event::{EventBus, SessionEvent};
use crate::register::{Catalog, RegisterId, RegisterValue};
use crate::scheduler::OperationId;
use crate::session::SessionState;
use crate::state::{CachedValue, RegisterCache, SharedCache};
use crate::subscription::{Sink, SinkRegistry, SubscriptionId};
use crate::transport::{LinkEvent, Transport};

/// Capacity of the request channel.
const REQUEST_CHANNEL_CAPACITY: usize = 32;

type Reply = oneshot::Sender<Result<OperationId, Error>>;

enum Request {
    Write {
        register: RegisterId,
        value: RegisterValue,
        reply: Reply,
    },
    Press {
        register: RegisterId,
        reply: Reply,
    },
    Shutdown,
}

/// Cloneable sender half used by the softener and its bindings.
#[derive(Debug, Clone)]
struct Requests(mpsc::Sender<Request>);

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Write { register, value, .. } => write!(f, "Write({register} = {value})"),
            Self::Press { register, .. } => write!(f, "Press({register})"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl Requests {
    async fn write(&self, register: RegisterId, value: RegisterValue) -> Result<OperationId, Error> {
        self.call(|reply| Request::Write {
            register,
            value,
            reply,
        })
        .await
    }

    async fn press(&self, register: RegisterId) -> Result<OperationId, Error> {
        self.call(|reply| Request::Press { register, reply }).await
    }

    async fn call(&self, build: impl FnOnce(Reply) -> Request) -> Result<OperationId, Error> {
        let (reply, response) = oneshot::channel();
        self.0
            .send(build(reply))
            .await
            .map_err(|_| Error::ChannelClosed("softener task stopped".to_string()))?;
        response
            .await
            .map_err(|_| Error::ChannelClosed("softener task dropped the request".to_string()))?
    }
}

/// A connected water softener.
///
/// # Examples
///
/// ```ignore
/// use culligan_ble::{Softener, SoftenerConfig};
/// use culligan_ble::register::{RegisterId, RegisterValue};
/// use culligan_ble::subscription::Sink;
/// use culligan_ble::transport::{BleConfig, BleTransport};
/// use tokio::sync::mpsc;
///
/// let (tx, rx) = mpsc::channel(64);
/// let transport = BleTransport::new(BleConfig::new("Culligan"), tx);
/// let softener = Softener::spawn(transport, rx, SoftenerConfig::default().with_password(4821)?)?;
///
/// softener.attach(RegisterId::SaltLevel, Sink::telemetry(|change| println!("{change}")))?;
/// let hardness = softener.attach(RegisterId::WaterHardness, Sink::writable(|_| {}))?;
/// hardness.write(RegisterValue::Integer(18)).await?;
/// ```
#[derive(Debug)]
pub struct Softener {
    requests: Requests,
    cache: SharedCache,
    sinks: Arc<SinkRegistry>,
    events: Arc<EventBus>,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl Softener {
    /// Validates the configuration and starts the background task.
    ///
    /// The task connects immediately and reconnects according to the
    /// configured policy. Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if the configuration is invalid.
    pub fn spawn<T: Transport>(
        transport: T,
        link_events: mpsc::Receiver<LinkEvent>,
        config: SoftenerConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        let engine = Engine::new(config);
        Ok(Self::spawn_engine(transport, link_events, engine))
    }

    /// Starts the background task around an existing engine.
    ///
    /// The engine's configuration is trusted as is.
    pub fn spawn_engine<T: Transport>(
        transport: T,
        link_events: mpsc::Receiver<LinkEvent>,
        engine: Engine,
    ) -> Self {
        let cache = Arc::clone(engine.cache());
        let sinks = Arc::clone(engine.sinks());
        let events = Arc::clone(engine.events());
        let (state_tx, state) = watch::channel(engine.state());
        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);

        let driver = Driver {
            engine,
            transport,
            link_events,
            requests: rx,
            state_tx,
            reconnect_attempt: 0,
            reconnect_at: Some(Instant::now()),
            connect_deadline: None,
            exhausted: false,
        };
        let task = tokio::spawn(driver.run());

        Self {
            requests: Requests(tx),
            cache,
            sinks,
            events,
            state,
            task,
        }
    }

    /// Attaches a sink to a register.
    ///
    /// # Errors
    ///
    /// Returns `Error::Unsupported` if the sink does not fit the register,
    /// e.g. a writable sink on telemetry or an action sink on a value.
    pub fn attach(&self, register: RegisterId, sink: Sink) -> Result<Binding, Error> {
        let subscription = self.sinks.attach(register, sink)?;
        Ok(Binding {
            register,
            subscription,
            requests: self.requests.clone(),
            sinks: Arc::clone(&self.sinks),
        })
    }

    /// Attaches a sink by configuration key, e.g. `"water_hardness"`.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownRegister` for unknown keys, otherwise as
    /// [`attach`](Self::attach).
    pub fn attach_key(&self, key: &str, sink: Sink) -> Result<Binding, Error> {
        self.attach(Catalog::find(key)?.id, sink)
    }

    /// Queues a write.
    ///
    /// Resolves once the write is validated and queued; the new value
    /// reaches sinks when the device reports it.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotReady` while disconnected, `Error::Unsupported`
    /// or `Error::Validation` for rejected writes, and
    /// `Error::ChannelClosed` if the background task has stopped.
    pub async fn write(&self, register: RegisterId, value: RegisterValue) -> Result<OperationId, Error> {
        self.requests.write(register, value).await
    }

    /// Queues an action.
    ///
    /// # Errors
    ///
    /// As [`write`](Self::write).
    pub async fn press(&self, register: RegisterId) -> Result<OperationId, Error> {
        self.requests.press(register).await
    }

    /// Copy of every cached value, in catalog order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(RegisterId, CachedValue)> {
        self.cache
            .read()
            .iter()
            .map(|(id, cached)| (id, cached.clone()))
            .collect()
    }

    /// Copy of the whole cache.
    #[must_use]
    pub fn cache_snapshot(&self) -> RegisterCache {
        self.cache.read().clone()
    }

    /// Last decoded value of a register.
    #[must_use]
    pub fn value(&self, register: RegisterId) -> Option<RegisterValue> {
        self.cache.read().value(register).cloned()
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watches session state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Subscribes to diagnostic events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Returns true once the background task has stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the background task and closes the link.
    ///
    /// # Errors
    ///
    /// Returns `Error::ChannelClosed` if the task panicked.
    pub async fn shutdown(self) -> Result<(), Error> {
        // The task may already be gone; joining reports that
        let _ = self.requests.0.send(Request::Shutdown).await;
        self.task
            .await
            .map_err(|e| Error::ChannelClosed(format!("softener task failed: {e}")))
    }
}

/// A sink attached to a register.
///
/// Dropping the binding leaves the sink attached; call
/// [`detach`](Self::detach) to remove it.
#[derive(Debug, Clone)]
pub struct Binding {
    register: RegisterId,
    subscription: SubscriptionId,
    requests: Requests,
    sinks: Arc<SinkRegistry>,
}

impl Binding {
    /// The register the sink is attached to.
    #[must_use]
    pub const fn register(&self) -> RegisterId {
        self.register
    }

    /// The subscription identifier.
    #[must_use]
    pub const fn subscription(&self) -> SubscriptionId {
        self.subscription
    }

    /// Writes the bound register.
    ///
    /// # Errors
    ///
    /// Returns `Error::Unsupported` unless the register is writable, plus
    /// the errors of [`Softener::write`].
    pub async fn write(&self, value: RegisterValue) -> Result<OperationId, Error> {
        if !Catalog::get(self.register).is_writable() {
            return Err(Error::Unsupported {
                register: self.register,
                operation: "write",
            });
        }
        self.requests.write(self.register, value).await
    }

    /// Triggers the bound action.
    ///
    /// # Errors
    ///
    /// Returns `Error::Unsupported` unless the register is an action, plus
    /// the errors of [`Softener::press`].
    pub async fn press(&self) -> Result<OperationId, Error> {
        if !Catalog::get(self.register).is_action() {
            return Err(Error::Unsupported {
                register: self.register,
                operation: "press",
            });
        }
        self.requests.press(self.register).await
    }

    /// Removes the sink. Returns false if it was already removed.
    pub fn detach(self) -> bool {
        self.sinks.detach(self.subscription)
    }
}

struct Driver<T> {
    engine: Engine,
    transport: T,
    link_events: mpsc::Receiver<LinkEvent>,
    requests: mpsc::Receiver<Request>,
    state_tx: watch::Sender<SessionState>,
    reconnect_attempt: u32,
    reconnect_at: Option<Instant>,
    connect_deadline: Option<Instant>,
    exhausted: bool,
}

impl<T: Transport> Driver<T> {
    async fn run(mut self) {
        let mut poll = tokio::time::interval(self.engine.config().poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.engine.next_deadline();
            let reconnect_at = self.reconnect_at;
            let connect_deadline = self.connect_deadline;

            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(Request::Shutdown) | None => break,
                    Some(request) => self.handle_request(request),
                },
                event = self.link_events.recv() => match event {
                    Some(event) => self.engine.handle_link(event, Instant::now()),
                    None => {
                        tracing::warn!("Link event channel closed");
                        break;
                    }
                },
                _ = poll.tick() => self.engine.tick(Instant::now()),
                () = sleep_until(deadline) => self.engine.on_timer(Instant::now()),
                () = sleep_until(reconnect_at) => self.connect().await,
                () = sleep_until(connect_deadline) => self.connect_timed_out().await,
            }

            self.flush().await;
            self.after_step();
        }

        self.exhausted = true;
        self.engine.abort();
        self.after_step();
        if let Err(e) = self.transport.disconnect().await {
            tracing::debug!(error = %e, "Disconnect on shutdown failed");
        }
        tracing::info!("Softener task stopped");
    }

    fn handle_request(&mut self, request: Request) {
        let now = Instant::now();
        let (result, reply) = match request {
            Request::Write {
                register,
                value,
                reply,
            } => (self.engine.submit_write(register, value, now), reply),
            Request::Press { register, reply } => (self.engine.submit_press(register, now), reply),
            Request::Shutdown => return,
        };
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Request rejected");
        }
        // The caller may have stopped waiting
        let _ = reply.send(result);
    }

    async fn connect(&mut self) {
        self.reconnect_at = None;
        if !self.engine.start_connecting() {
            return;
        }
        self.after_step();
        tracing::info!(attempt = self.reconnect_attempt, "Connecting");
        match self.transport.connect().await {
            // Link up arrives as an event; give it one request timeout
            Ok(()) => {
                self.connect_deadline = Some(Instant::now() + self.engine.config().request_timeout);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Connection failed");
                self.engine.abort();
            }
        }
    }

    async fn connect_timed_out(&mut self) {
        self.connect_deadline = None;
        if self.engine.state() != SessionState::Connecting {
            return;
        }
        tracing::warn!(
            timeout_ms = self.engine.config().request_timeout.as_millis(),
            "Link did not come up, dropping the attempt"
        );
        self.engine.abort();
        self.disconnect().await;
    }

    async fn flush(&mut self) {
        for output in self.engine.take_outputs() {
            match output {
                Output::Send(frame) => {
                    tracing::trace!(frame = ?frame, "Writing frame");
                    if let Err(e) = self.transport.send(frame.to_bytes()).await {
                        tracing::warn!(error = %e, "Send failed, dropping link");
                        self.engine.handle_link(LinkEvent::Disconnected, Instant::now());
                        self.disconnect().await;
                        break;
                    }
                }
                Output::Disconnect => self.disconnect().await,
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Err(e) = self.transport.disconnect().await {
            tracing::debug!(error = %e, "Disconnect failed");
        }
        // Frames queued for the dropped link are meaningless now
        let _ = self.engine.take_outputs();
    }

    fn after_step(&mut self) {
        let state = self.engine.state();
        self.state_tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });

        if state != SessionState::Connecting {
            self.connect_deadline = None;
        }
        match state {
            SessionState::Ready => self.reconnect_attempt = 0,
            SessionState::Disconnected if self.reconnect_at.is_none() && !self.exhausted => {
                self.schedule_reconnect();
            }
            _ => {}
        }
    }

    fn schedule_reconnect(&mut self) {
        let policy = &self.engine.config().reconnection;
        if !policy.should_retry(self.reconnect_attempt) {
            tracing::warn!(attempts = self.reconnect_attempt, "Giving up reconnecting");
            self.exhausted = true;
            return;
        }
        let delay = policy.delay_for_attempt(self.reconnect_attempt);
        tracing::info!(
            delay_ms = delay.as_millis(),
            attempt = self.reconnect_attempt + 1,
            "Reconnecting"
        );
        self.reconnect_at = Some(Instant::now() + delay);
        self.reconnect_attempt += 1;
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
