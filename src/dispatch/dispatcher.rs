// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fans decoded values out to the cache, sinks and event bus.

use std::sync::Arc;

use tokio::time::Instant;

use crate::error::DecodeError;
use crate::event::{EventBus, SessionEvent};
use crate::protocol::{DataPage, HandshakeInfo};
use crate::register::{RegisterId, RegisterValue};
use crate::state::{SharedCache, StateChange};
use crate::subscription::{ActionOutcome, SinkRegistry};

use super::decode_page;

/// Applies decoded values and notifies whoever listens.
///
/// The dispatcher is the only writer of the cache. Sinks are called after
/// the cache lock is released, so a callback may read the cache.
#[derive(Debug)]
pub struct Dispatcher {
    cache: SharedCache,
    sinks: Arc<SinkRegistry>,
    events: Arc<EventBus>,
    decode_errors: u64,
}

impl Dispatcher {
    /// Creates a dispatcher over shared state.
    #[must_use]
    pub fn new(cache: SharedCache, sinks: Arc<SinkRegistry>, events: Arc<EventBus>) -> Self {
        Self {
            cache,
            sinks,
            events,
            decode_errors: 0,
        }
    }

    /// The cache this dispatcher writes.
    #[must_use]
    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    /// The sink registry.
    #[must_use]
    pub fn sinks(&self) -> &Arc<SinkRegistry> {
        &self.sinks
    }

    /// Number of decode errors seen so far.
    #[must_use]
    pub const fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    /// Decodes a page and applies its values.
    ///
    /// Returns the changes that were reported.
    pub fn apply_page(&mut self, page: &DataPage, now: Instant) -> Vec<StateChange> {
        let decoded = decode_page(page);
        tracing::debug!(
            page = %decoded.page,
            values = decoded.values.len(),
            errors = decoded.errors.len(),
            "Decoded page"
        );
        for error in decoded.errors {
            self.record_error(error);
        }
        self.apply(decoded.values, now)
    }

    /// Publishes the firmware version from a handshake.
    pub fn apply_handshake(&mut self, info: &HandshakeInfo, now: Instant) -> Vec<StateChange> {
        self.apply(
            vec![(
                RegisterId::FirmwareVersion,
                RegisterValue::Text(info.firmware_version()),
            )],
            now,
        )
    }

    /// Counts, logs and publishes a decode error.
    pub fn record_error(&mut self, error: DecodeError) {
        self.decode_errors += 1;
        tracing::warn!(error = %error, total = self.decode_errors, "Decode error");
        self.events.publish(SessionEvent::DecodeFailed(error));
    }

    /// Marks every cached value stale.
    pub fn mark_stale(&self) {
        self.cache.write().mark_stale();
    }

    /// Reports the result of a press to action sinks.
    pub fn notify_action(&self, outcome: &ActionOutcome) {
        self.sinks.dispatch_outcome(outcome);
    }

    fn apply(&mut self, values: Vec<(RegisterId, RegisterValue)>, now: Instant) -> Vec<StateChange> {
        let changes: Vec<StateChange> = {
            let mut cache = self.cache.write();
            values
                .into_iter()
                .filter_map(|(register, value)| cache.apply(register, value, now))
                .collect()
        };

        for change in &changes {
            tracing::debug!(change = %change, "Register changed");
            self.sinks.dispatch(change);
            self.events.publish(SessionEvent::RegisterChanged(change.clone()));
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::RwLock;

    use super::*;
    use crate::protocol::Page;
    use crate::state::RegisterCache;
    use crate::subscription::Sink;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            Arc::new(RwLock::new(RegisterCache::new())),
            Arc::new(SinkRegistry::new()),
            Arc::new(EventBus::new()),
        )
    }

    fn statistics(total: u32) -> DataPage {
        let mut raw = [0u8; 20];
        raw[..3].copy_from_slice(b"ww\x00");
        raw[5..8].copy_from_slice(&total.to_be_bytes()[1..]);
        raw[19] = b'F';
        match Page::parse(&raw) {
            Ok(Page::Data(page)) => page,
            other => panic!("not a data page: {other:?}"),
        }
    }

    #[test]
    fn repeated_page_reports_nothing_new() {
        let mut dispatcher = dispatcher();
        let now = Instant::now();

        let first = dispatcher.apply_page(&statistics(500), now);
        assert!(first.iter().any(|c| c.register == RegisterId::TotalGallons));
        assert!(dispatcher.apply_page(&statistics(500), now).is_empty());

        let changed = dispatcher.apply_page(&statistics(501), now);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].previous, Some(RegisterValue::Integer(500)));
    }

    #[test]
    fn sinks_see_changes_for_their_register() {
        let mut dispatcher = dispatcher();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        dispatcher
            .sinks()
            .attach(
                RegisterId::TotalGallons,
                Sink::telemetry(move |change| {
                    assert_eq!(change.current, RegisterValue::Integer(42));
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        dispatcher.apply_page(&statistics(42), Instant::now());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sink_may_read_cache_during_callback() {
        let mut dispatcher = dispatcher();
        let cache = Arc::clone(dispatcher.cache());
        dispatcher
            .sinks()
            .attach(
                RegisterId::TotalGallons,
                Sink::telemetry(move |_| {
                    assert!(cache.read().value(RegisterId::TotalGallons).is_some());
                }),
            )
            .unwrap();
        dispatcher.apply_page(&statistics(7), Instant::now());
    }

    #[test]
    fn stale_value_is_reported_again() {
        let mut dispatcher = dispatcher();
        let now = Instant::now();
        dispatcher.apply_page(&statistics(9), now);
        dispatcher.mark_stale();
        assert!(!dispatcher.apply_page(&statistics(9), now).is_empty());
    }

    #[test]
    fn errors_are_counted_and_published() {
        let mut dispatcher = dispatcher();
        let mut rx = dispatcher.events.subscribe();

        dispatcher.record_error(DecodeError::UnknownHeader(1, 1));
        assert_eq!(dispatcher.decode_errors(), 1);
        assert!(matches!(
            rx.try_recv(),
            Ok(SessionEvent::DecodeFailed(DecodeError::UnknownHeader(1, 1)))
        ));
    }

    #[test]
    fn out_of_range_salt_keeps_the_cached_level() {
        let mut dispatcher = dispatcher();
        let now = Instant::now();
        dispatcher
            .cache()
            .write()
            .apply(RegisterId::SaltLevel, RegisterValue::Decimal(42.0), now);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        dispatcher
            .sinks()
            .attach(
                RegisterId::SaltLevel,
                Sink::writable(move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        let mut rx = dispatcher.events.subscribe();

        // 40 regenerations at 15 lb each is 600 lb, above the 500 lb bound
        let mut raw = [0u8; 20];
        raw[..3].copy_from_slice(b"uu\x01");
        raw[13] = 40;
        raw[15] = 18;
        raw[16] = 20;
        raw[17] = 10;
        raw[19] = b':';
        let Ok(Page::Data(page)) = Page::parse(&raw) else {
            panic!("not a data page");
        };
        let changes = dispatcher.apply_page(&page, now + Duration::from_secs(1));

        assert!(changes.iter().all(|c| c.register != RegisterId::SaltLevel));
        let cache = dispatcher.cache().read();
        let salt = cache.get(RegisterId::SaltLevel).unwrap();
        assert_eq!(salt.value(), &RegisterValue::Decimal(42.0));
        assert_eq!(salt.observed_at(), now);
        drop(cache);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.decode_errors(), 1);
        assert!(std::iter::from_fn(|| rx.try_recv().ok()).any(|e| matches!(
            e,
            SessionEvent::DecodeFailed(DecodeError::OutOfRange {
                register: RegisterId::SaltLevel,
                actual: 600,
                ..
            })
        )));
    }

    #[test]
    fn handshake_sets_firmware_version() {
        let mut dispatcher = dispatcher();
        let info = HandshakeInfo {
            firmware_major: 5,
            firmware_minor: 12,
            auth_flag: 0,
            connection_counter: 0,
        };
        dispatcher.apply_handshake(&info, Instant::now());
        assert_eq!(
            dispatcher.cache().read().value(RegisterId::FirmwareVersion),
            Some(&RegisterValue::Text("C5.12".into()))
        );
    }
}
