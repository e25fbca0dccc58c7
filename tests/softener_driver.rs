// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Background task tests against a scripted control head.
//!
//! Time is paused, so reconnect backoff and poll intervals run instantly.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use culligan_ble::error::TransportError;
use culligan_ble::protocol::{Command, Frame};
use culligan_ble::{
    Error, LinkEvent, ReconnectionPolicy, RegisterId, RegisterValue, SessionState, Sink, Softener,
    SoftenerConfig, Transport,
};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct Counters {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    frames: AtomicUsize,
    hardness: AtomicU8,
}

/// Answers polls like a control head with open access.
struct MockHead {
    events: mpsc::Sender<LinkEvent>,
    counters: Arc<Counters>,
    reachable: bool,
    /// Connects that succeed without the link ever coming up.
    silent_connects: usize,
}

impl MockHead {
    fn new(events: mpsc::Sender<LinkEvent>, reachable: bool) -> (Self, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        counters.hardness.store(18, Ordering::SeqCst);
        let head = Self {
            events,
            counters: Arc::clone(&counters),
            reachable,
            silent_connects: 0,
        };
        (head, counters)
    }

    fn reply(&self, frame: &Bytes) -> Option<Bytes> {
        let hardness = self.counters.hardness.load(Ordering::SeqCst);
        if *frame == Frame::filled(b't').to_bytes() {
            let mut raw = [0u8; 20];
            raw[..2].copy_from_slice(b"tt");
            raw[5] = 6;
            raw[6] = 4;
            return Some(Bytes::copy_from_slice(&raw));
        }
        if *frame == Frame::filled(b'u').to_bytes() {
            return Some(status_pages(hardness));
        }
        if *frame == Frame::filled(b'v').to_bytes() {
            let mut raw = page(b'v', 0, b'B', &[(5, 20)]).to_vec();
            raw.extend_from_slice(&page(b'v', 1, b'C', &[(3, 10)]));
            return Some(Bytes::from(raw));
        }
        if *frame == Frame::filled(b'w').to_bytes() {
            return Some(Bytes::copy_from_slice(&page(b'w', 0, b'F', &[(12, 5)])));
        }
        for value in 1..=99 {
            if *frame == Command::SetHardness(value).encode().to_bytes() {
                self.counters.hardness.store(value, Ordering::SeqCst);
                return Some(status_pages(value));
            }
        }
        None
    }
}

impl Transport for MockHead {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        if !self.reachable {
            return Err(TransportError::ConnectionFailed("out of range".into()));
        }
        if self.silent_connects > 0 {
            self.silent_connects -= 1;
            return Ok(());
        }
        self.events
            .send(LinkEvent::Connected)
            .await
            .map_err(|_| TransportError::LinkLost)
    }

    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        self.counters.frames.fetch_add(1, Ordering::SeqCst);
        if let Some(reply) = self.reply(&frame) {
            self.events
                .send(LinkEvent::Received(reply))
                .await
                .map_err(|_| TransportError::LinkLost)?;
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.counters.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn page(header: u8, number: u8, terminator: u8, fields: &[(usize, u8)]) -> [u8; 20] {
    let mut raw = [0u8; 20];
    raw[0] = header;
    raw[1] = header;
    raw[2] = number;
    for &(offset, byte) in fields {
        raw[offset] = byte;
    }
    raw[19] = terminator;
    raw
}

fn status_pages(hardness: u8) -> Bytes {
    let mut raw = page(b'u', 0, b'9', &[(3, 8), (15, hardness), (16, 2)]).to_vec();
    raw.extend_from_slice(&page(b'u', 1, b':', &[(13, 30), (15, 1), (16, 18)]));
    Bytes::from(raw)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

fn spawn(reachable: bool, config: SoftenerConfig) -> (Softener, Arc<Counters>, mpsc::Sender<LinkEvent>) {
    let (tx, rx) = mpsc::channel(64);
    let (head, counters) = MockHead::new(tx.clone(), reachable);
    let softener = Softener::spawn(head, rx, config).unwrap();
    (softener, counters, tx)
}

#[tokio::test(start_paused = true)]
async fn connects_and_syncs() {
    let (softener, counters, _tx) = spawn(true, SoftenerConfig::default());

    let mut state = softener.watch_state();
    state.wait_for(SessionState::is_ready).await.unwrap();
    settle().await;

    assert_eq!(counters.connects.load(Ordering::SeqCst), 1);
    assert_eq!(softener.value(RegisterId::WaterHardness), Some(RegisterValue::Integer(18)));
    assert_eq!(softener.value(RegisterId::ReserveCapacity), Some(RegisterValue::Integer(20)));
    assert_eq!(softener.value(RegisterId::TotalRegenerations), Some(RegisterValue::Integer(5)));
    assert_eq!(
        softener.value(RegisterId::FirmwareVersion),
        Some(RegisterValue::Text("C6.4".into()))
    );
    assert!(!softener.snapshot().is_empty());

    softener.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn binding_writes_and_observes() {
    let (softener, counters, _tx) = spawn(true, SoftenerConfig::default());
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let hardness = softener
        .attach(
            RegisterId::WaterHardness,
            Sink::writable(move |change| {
                let _ = seen_tx.send(change.current.clone());
            }),
        )
        .unwrap();

    softener.watch_state().wait_for(SessionState::is_ready).await.unwrap();
    settle().await;
    assert_eq!(seen_rx.recv().await, Some(RegisterValue::Integer(18)));

    hardness.write(RegisterValue::Integer(25)).await.unwrap();
    assert_eq!(seen_rx.recv().await, Some(RegisterValue::Integer(25)));
    assert_eq!(counters.hardness.load(Ordering::SeqCst), 25);

    assert!(matches!(hardness.press().await, Err(Error::Unsupported { .. })));
    assert!(hardness.detach());

    softener.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn rejects_out_of_range_writes() {
    let (softener, counters, _tx) = spawn(true, SoftenerConfig::default());
    softener.watch_state().wait_for(SessionState::is_ready).await.unwrap();
    settle().await;
    let frames = counters.frames.load(Ordering::SeqCst);

    let result = softener
        .write(RegisterId::WaterHardness, RegisterValue::Integer(150))
        .await;
    assert!(matches!(result, Err(Error::Validation(_))));

    settle().await;
    assert_eq!(counters.frames.load(Ordering::SeqCst), frames);
    assert_eq!(softener.value(RegisterId::WaterHardness), Some(RegisterValue::Integer(18)));

    softener.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_link_loss() {
    let (softener, counters, tx) = spawn(true, SoftenerConfig::default());
    let mut state = softener.watch_state();
    state.wait_for(SessionState::is_ready).await.unwrap();
    settle().await;

    tx.send(LinkEvent::Disconnected).await.unwrap();
    state
        .wait_for(|s| *s == SessionState::Disconnected)
        .await
        .unwrap();
    assert!(softener.snapshot().iter().all(|(_, cached)| cached.is_stale()));

    state.wait_for(SessionState::is_ready).await.unwrap();
    assert_eq!(counters.connects.load(Ordering::SeqCst), 2);

    softener.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn retries_when_the_link_never_comes_up() {
    let (tx, rx) = mpsc::channel(64);
    let (mut head, counters) = MockHead::new(tx, true);
    head.silent_connects = 1;
    let config = SoftenerConfig::default().with_request_timeout(Duration::from_secs(2));
    let softener = Softener::spawn(head, rx, config).unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(softener.state(), SessionState::Connecting);

    softener.watch_state().wait_for(SessionState::is_ready).await.unwrap();
    assert_eq!(counters.connects.load(Ordering::SeqCst), 2);
    assert!(counters.disconnects.load(Ordering::SeqCst) >= 1);

    softener.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_retries() {
    let policy = ReconnectionPolicy::default()
        .with_max_retries(2)
        .with_initial_delay(Duration::from_secs(1));
    let (softener, counters, _tx) = spawn(false, SoftenerConfig::default().with_reconnection(policy));

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(counters.connects.load(Ordering::SeqCst), 3);
    assert_eq!(softener.state(), SessionState::Disconnected);

    let result = softener.press(RegisterId::RegenerateNow).await;
    assert!(matches!(result, Err(Error::NotReady)));

    softener.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_the_link() {
    let (softener, counters, _tx) = spawn(true, SoftenerConfig::default());
    softener.watch_state().wait_for(SessionState::is_ready).await.unwrap();

    softener.shutdown().await.unwrap();
    assert!(counters.disconnects.load(Ordering::SeqCst) >= 1);
}

#[tokio::test(start_paused = true)]
async fn invalid_config_is_rejected() {
    let (tx, rx) = mpsc::channel(8);
    let (head, _counters) = MockHead::new(tx, true);
    let config = SoftenerConfig::default().with_max_attempts(0);
    assert!(matches!(
        Softener::spawn(head, rx, config),
        Err(Error::Validation(_))
    ));
}
