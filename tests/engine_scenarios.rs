// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end engine scenarios driven with hand-built pages.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use culligan_ble::protocol::{Command, Frame};
use culligan_ble::{
    Engine, LinkEvent, Output, RegisterId, RegisterValue, SessionEvent, SessionState, Sink,
    SoftenerConfig,
};
use tokio::time::Instant;

fn handshake() -> Bytes {
    let mut raw = [0u8; 20];
    raw[..2].copy_from_slice(b"tt");
    raw[5] = 6;
    raw[6] = 2;
    Bytes::copy_from_slice(&raw)
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
    let mut raw = page(b'u', 0, b'9', &[(3, 9), (4, 30), (15, hardness), (16, 2), (17, 0)]).to_vec();
    raw.extend_from_slice(&page(
        b'u',
        1,
        b':',
        &[(13, 40), (15, 1), (16, 20), (17, 10)],
    ));
    Bytes::from(raw)
}

fn settings_pages() -> Bytes {
    let mut raw = page(b'v', 0, b'B', &[(3, 4), (5, 25), (6, 0), (7, 30)]).to_vec();
    raw.extend_from_slice(&page(b'v', 1, b'C', &[(3, 10), (4, 60), (5, 8), (6, 12)]));
    Bytes::from(raw)
}

fn statistics_page() -> Bytes {
    Bytes::copy_from_slice(&page(b'w', 0, b'F', &[(5, 0x01), (6, 0x02), (7, 0x03), (12, 77)]))
}

fn ready(config: SoftenerConfig, now: Instant) -> Engine {
    let mut engine = Engine::new(config);
    assert!(engine.start_connecting());
    engine.handle_link(LinkEvent::Connected, now);
    engine.handle_link(LinkEvent::Received(handshake()), now);
    assert_eq!(engine.state(), SessionState::Ready);
    engine
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

#[test]
fn full_sweep_fills_the_cache() {
    let now = Instant::now();
    let mut engine = ready(SoftenerConfig::default(), now);
    assert_eq!(
        engine.take_outputs(),
        vec![Output::Send(Frame::filled(b't')), Output::Send(Frame::filled(b'u'))]
    );

    engine.handle_link(LinkEvent::Received(status_pages(18)), now);
    assert_eq!(engine.take_outputs(), vec![Output::Send(Frame::filled(b'v'))]);
    engine.handle_link(LinkEvent::Received(settings_pages()), now);
    assert_eq!(engine.take_outputs(), vec![Output::Send(Frame::filled(b'w'))]);
    engine.handle_link(LinkEvent::Received(statistics_page()), now);
    assert!(engine.take_outputs().is_empty());
    assert!(engine.scheduler().is_idle());

    let cache = engine.cache().read();
    assert_eq!(cache.value(RegisterId::WaterHardness), Some(&RegisterValue::Integer(18)));
    assert_eq!(cache.value(RegisterId::FirmwareVersion), Some(&RegisterValue::Text("C6.2".into())));
    assert_eq!(cache.value(RegisterId::ReserveCapacity), Some(&RegisterValue::Integer(25)));
    assert_eq!(cache.value(RegisterId::ResinCapacity), Some(&RegisterValue::Integer(3000)));
    assert_eq!(cache.value(RegisterId::TotalGallons), Some(&RegisterValue::Integer(0x0001_0203)));
    assert_eq!(cache.value(RegisterId::TotalRegenerations), Some(&RegisterValue::Integer(77)));
    assert_eq!(cache.value(RegisterId::BrineRegenerationsRemaining), Some(&RegisterValue::Integer(40)));
    assert!(cache.value(RegisterId::BrineTankCapacity).is_some());
}

#[test]
fn pages_split_across_notifications_still_decode() {
    let now = Instant::now();
    let mut engine = ready(SoftenerConfig::default(), now);
    engine.take_outputs();

    let pages = status_pages(21);
    for chunk in pages.chunks(7) {
        engine.handle_link(LinkEvent::Received(Bytes::copy_from_slice(chunk)), now);
    }
    assert_eq!(
        engine.cache().read().value(RegisterId::WaterHardness),
        Some(&RegisterValue::Integer(21))
    );
    assert_eq!(engine.take_outputs(), vec![Output::Send(Frame::filled(b'v'))]);
}

#[test]
fn write_reaches_sinks_when_the_device_echoes_it() {
    let now = Instant::now();
    let mut engine = ready(SoftenerConfig::default(), now);
    let mut events = engine.events().subscribe();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    engine
        .sinks()
        .attach(
            RegisterId::WaterHardness,
            Sink::writable(move |change| sink_seen.lock().unwrap().push(change.current.clone())),
        )
        .unwrap();

    // Complete the initial sweep first
    engine.handle_link(LinkEvent::Received(status_pages(18)), now);
    engine.handle_link(LinkEvent::Received(settings_pages()), now);
    engine.handle_link(LinkEvent::Received(statistics_page()), now);
    engine.take_outputs();

    let id = engine
        .submit_write(RegisterId::WaterHardness, RegisterValue::Integer(22), now)
        .unwrap();
    assert_eq!(
        engine.take_outputs(),
        vec![Output::Send(Command::SetHardness(22).encode())]
    );

    engine.handle_link(LinkEvent::Received(status_pages(22)), now);
    assert!(engine.scheduler().is_idle());
    assert_eq!(
        *seen.lock().unwrap(),
        vec![RegisterValue::Integer(18), RegisterValue::Integer(22)]
    );
    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        SessionEvent::OperationCompleted { id: done, .. } if *done == id
    )));
}

#[test]
fn unanswered_press_reports_a_timeout_to_its_sink() {
    let now = Instant::now();
    let config = SoftenerConfig::default().with_request_timeout(Duration::from_secs(1));
    let mut engine = ready(config, now);
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let sink_outcomes = Arc::clone(&outcomes);
    engine
        .sinks()
        .attach(
            RegisterId::RegenerateNow,
            Sink::action(move |outcome| sink_outcomes.lock().unwrap().push(outcome.clone())),
        )
        .unwrap();

    engine.submit_press(RegisterId::RegenerateNow, now).unwrap();
    while !engine.scheduler().is_idle() {
        let due = engine.next_deadline().unwrap();
        engine.on_timer(due);
    }

    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].register, RegisterId::RegenerateNow);
    assert!(outcomes[0].result.is_err());
}

#[test]
fn stale_values_survive_reconnect_until_refreshed() {
    let now = Instant::now();
    let mut engine = ready(SoftenerConfig::default(), now);
    engine.handle_link(LinkEvent::Received(status_pages(18)), now);
    engine.handle_link(LinkEvent::Disconnected, now);

    let stale = engine.cache().read().get(RegisterId::WaterHardness).unwrap().clone();
    assert!(stale.is_stale());
    assert_eq!(stale.value(), &RegisterValue::Integer(18));

    let later = now + Duration::from_secs(30);
    assert!(engine.start_connecting());
    engine.handle_link(LinkEvent::Connected, later);
    engine.handle_link(LinkEvent::Received(handshake()), later);
    engine.handle_link(LinkEvent::Received(status_pages(18)), later);

    let fresh = engine.cache().read().get(RegisterId::WaterHardness).unwrap().clone();
    assert!(!fresh.is_stale());
    assert_eq!(fresh.observed_at(), later);
}

#[test]
fn writes_are_rejected_while_disconnected() {
    let mut engine = Engine::new(SoftenerConfig::default());
    let result = engine.submit_write(RegisterId::WaterHardness, RegisterValue::Integer(20), Instant::now());
    assert!(matches!(result, Err(culligan_ble::Error::NotReady)));
    assert!(engine.take_outputs().is_empty());
}

#[test]
fn telemetry_registers_refuse_writes() {
    let now = Instant::now();
    let mut engine = ready(SoftenerConfig::default(), now);
    let result = engine.submit_write(RegisterId::CurrentFlow, RegisterValue::Decimal(1.5), now);
    assert!(matches!(result, Err(culligan_ble::Error::Unsupported { .. })));
}

#[test]
fn two_presses_send_two_frames_one_at_a_time() {
    let now = Instant::now();
    let mut engine = ready(SoftenerConfig::default(), now);
    engine.handle_link(LinkEvent::Received(status_pages(18)), now);
    engine.handle_link(LinkEvent::Received(settings_pages()), now);
    engine.handle_link(LinkEvent::Received(statistics_page()), now);
    engine.take_outputs();

    let first = engine.submit_press(RegisterId::RegenerateNow, now).unwrap();
    let second = engine.submit_press(RegisterId::RegenerateNow, now).unwrap();
    assert_ne!(first, second);

    let regenerate = Output::Send(Command::RegenerateNow.encode());
    assert_eq!(engine.take_outputs(), vec![regenerate.clone()]);
    assert_eq!(engine.scheduler().queued(), 1);

    engine.handle_link(LinkEvent::Received(status_pages(18)), now);
    assert_eq!(engine.take_outputs(), vec![regenerate]);

    engine.handle_link(LinkEvent::Received(status_pages(18)), now);
    assert!(engine.take_outputs().is_empty());
    assert!(engine.scheduler().is_idle());
}
