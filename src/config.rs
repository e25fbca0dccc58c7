// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Softener configuration.
//!
//! [`SoftenerConfig`] can be built in code with the `with_*` methods or
//! deserialized from any serde format. Durations are written in
//! milliseconds.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use culligan_ble::SoftenerConfig;
//!
//! let config = SoftenerConfig::default()
//!     .with_password(4821)
//!     .unwrap()
//!     .with_poll_interval(Duration::from_secs(30));
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.password.value(), 4821);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValueError;
use crate::types::Password;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(4);
const DEFAULT_MAX_ATTEMPTS: u8 = 3;
const DEFAULT_ACTION_ATTEMPTS: u8 = 1;

/// Configuration of one softener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftenerConfig {
    /// Device PIN.
    pub password: Password,
    /// Time between poll sweeps.
    #[serde(with = "millis", rename = "poll_interval_ms")]
    pub poll_interval: Duration,
    /// Time to wait for an answer before resending.
    #[serde(with = "millis", rename = "request_timeout_ms")]
    pub request_timeout: Duration,
    /// Time allowed from link up to `Ready`.
    #[serde(with = "millis", rename = "handshake_timeout_ms")]
    pub handshake_timeout: Duration,
    /// Attempts for polls and writes.
    pub max_attempts: u8,
    /// Attempts for actions.
    ///
    /// A resent action may run twice if only the answer was lost, so
    /// this defaults to one.
    pub action_attempts: u8,
    /// Idle keepalive period, or `None` to never send keepalives.
    #[serde(with = "optional_millis", rename = "keepalive_interval_ms")]
    pub keepalive_interval: Option<Duration>,
    /// What to do after the link drops.
    pub reconnection: ReconnectionPolicy,
}

impl SoftenerConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the device PIN.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if `pin` exceeds 9999.
    pub fn with_password(mut self, pin: u16) -> Result<Self, ValueError> {
        self.password = Password::new(pin)?;
        Ok(self)
    }

    /// Sets the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the handshake timeout.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the attempt budget for polls and writes.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u8) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the attempt budget for actions.
    #[must_use]
    pub fn with_action_attempts(mut self, attempts: u8) -> Self {
        self.action_attempts = attempts;
        self
    }

    /// Sets the keepalive interval. `None` disables keepalives.
    #[must_use]
    pub fn with_keepalive_interval(mut self, interval: Option<Duration>) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Sets the reconnection policy.
    #[must_use]
    pub fn with_reconnection(mut self, policy: ReconnectionPolicy) -> Self {
        self.reconnection = policy;
        self
    }

    /// Checks the configuration for values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::InvalidConfiguration` naming the first bad
    /// setting.
    pub fn validate(&self) -> Result<(), ValueError> {
        let positive = [
            ("poll_interval", self.poll_interval),
            ("request_timeout", self.request_timeout),
            ("handshake_timeout", self.handshake_timeout),
        ];
        for (name, value) in positive {
            if value.is_zero() {
                return Err(invalid(format!("{name} must be positive")));
            }
        }
        if self.keepalive_interval.is_some_and(|d| d.is_zero()) {
            return Err(invalid("keepalive_interval must be positive".into()));
        }
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts must be at least 1".into()));
        }
        if self.action_attempts == 0 {
            return Err(invalid("action_attempts must be at least 1".into()));
        }
        self.reconnection.validate()
    }
}

impl Default for SoftenerConfig {
    fn default() -> Self {
        Self {
            password: Password::DEFAULT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            action_attempts: DEFAULT_ACTION_ATTEMPTS,
            keepalive_interval: Some(DEFAULT_KEEPALIVE_INTERVAL),
            reconnection: ReconnectionPolicy::default(),
        }
    }
}

/// Reconnection policy for a dropped or rejected link.
///
/// Uses exponential backoff between attempts.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use culligan_ble::config::ReconnectionPolicy;
///
/// let policy = ReconnectionPolicy::new()
///     .with_max_retries(5)
///     .with_initial_delay(Duration::from_secs(2));
///
/// assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(2));
/// assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(4));
/// assert!(!policy.should_retry(5));
///
/// assert!(!ReconnectionPolicy::disabled().should_retry(0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectionPolicy {
    /// Whether automatic reconnection is enabled.
    pub enabled: bool,
    /// Maximum number of retries before giving up (None = infinite).
    pub max_retries: Option<u32>,
    /// Delay before the first retry.
    #[serde(with = "millis", rename = "initial_delay_ms")]
    pub initial_delay: Duration,
    /// Upper bound on the delay between retries.
    #[serde(with = "millis", rename = "max_delay_ms")]
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f32,
}

impl ReconnectionPolicy {
    /// Creates a reconnection policy with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a disabled reconnection policy.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Sets the maximum number of retries.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets infinite retries.
    #[must_use]
    pub fn with_infinite_retries(mut self) -> Self {
        self.max_retries = None;
        self
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay between retries.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f32) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculates the delay before a given retry, counting from zero.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        let multiplier = self
            .backoff_multiplier
            .powi(i32::try_from(attempt).unwrap_or(i32::MAX));

        #[allow(clippy::cast_precision_loss)]
        let delay_ms = self.initial_delay.as_millis() as f32 * multiplier;

        // Saturating float cast; capped by max_delay below
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay = Duration::from_millis(delay_ms as u64);

        delay.min(self.max_delay)
    }

    /// Returns true if another retry should be attempted.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.enabled && self.max_retries.is_none_or(|max| attempt < max)
    }

    fn validate(&self) -> Result<(), ValueError> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(invalid("backoff_multiplier must be at least 1.0".into()));
        }
        if self.initial_delay > self.max_delay {
            return Err(invalid("initial_delay must not exceed max_delay".into()));
        }
        Ok(())
    }
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: Some(10),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

fn invalid(message: String) -> ValueError {
    ValueError::InvalidConfiguration(message)
}

/// `Duration` as whole milliseconds.
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// `Option<Duration>` as whole milliseconds or null.
mod optional_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SoftenerConfig::default();
        assert_eq!(config.password, Password::DEFAULT);
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.action_attempts, 1);
        assert_eq!(config.keepalive_interval, Some(Duration::from_secs(4)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn password_is_range_checked() {
        assert!(SoftenerConfig::new().with_password(9999).is_ok());
        assert!(matches!(
            SoftenerConfig::new().with_password(10_000),
            Err(ValueError::OutOfRange { max: 9999, .. })
        ));
    }

    #[test]
    fn zero_durations_are_rejected() {
        let err = SoftenerConfig::new()
            .with_poll_interval(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            ValueError::InvalidConfiguration("poll_interval must be positive".into())
        );

        assert!(SoftenerConfig::new()
            .with_keepalive_interval(Some(Duration::ZERO))
            .validate()
            .is_err());
        assert!(SoftenerConfig::new()
            .with_keepalive_interval(None)
            .validate()
            .is_ok());
    }

    #[test]
    fn attempts_must_be_positive() {
        assert!(SoftenerConfig::new().with_max_attempts(0).validate().is_err());
        assert!(SoftenerConfig::new().with_action_attempts(0).validate().is_err());
    }

    #[test]
    fn deserializes_milliseconds() {
        let config: SoftenerConfig = serde_json::from_str(
            r#"{
                "password": 4821,
                "poll_interval_ms": 30000,
                "keepalive_interval_ms": null,
                "reconnection": { "enabled": false }
            }"#,
        )
        .unwrap();

        assert_eq!(config.password.value(), 4821);
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.keepalive_interval, None);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(!config.reconnection.enabled);
        assert_eq!(config.reconnection.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn bad_password_fails_to_deserialize() {
        assert!(serde_json::from_str::<SoftenerConfig>(r#"{ "password": 12345 }"#).is_err());
    }

    #[test]
    fn serializes_round_trip() {
        let config = SoftenerConfig::default().with_keepalive_interval(None);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["poll_interval_ms"], 60_000);
        assert!(json["keepalive_interval_ms"].is_null());

        let back: SoftenerConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let policy = ReconnectionPolicy::new()
            .with_initial_delay(Duration::from_secs(10))
            .with_max_delay(Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(20));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(30));
    }

    #[test]
    fn retry_budget() {
        let policy = ReconnectionPolicy::new().with_max_retries(2);
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
        assert!(ReconnectionPolicy::new().with_infinite_retries().should_retry(1_000));
    }

    #[test]
    fn policy_validation() {
        let slow = ReconnectionPolicy::new().with_backoff_multiplier(0.5);
        assert!(SoftenerConfig::new().with_reconnection(slow).validate().is_err());

        let inverted = ReconnectionPolicy::new()
            .with_initial_delay(Duration::from_secs(90))
            .with_max_delay(Duration::from_secs(60));
        assert!(SoftenerConfig::new().with_reconnection(inverted).validate().is_err());
    }
}
