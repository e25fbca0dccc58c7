// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Numeric device password.
//!
//! Culligan control heads are gated by a four digit PIN. The PIN never
//! travels in clear text; see [`crate::protocol::auth`] for the exchange.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// Four digit device password (0-9999).
///
/// # Examples
///
/// ```
/// use culligan_ble::types::Password;
///
/// let pin = Password::new(4821).unwrap();
/// assert_eq!(pin.digits(), [4, 8, 2, 1]);
///
/// assert_eq!(Password::default().value(), 1234);
/// assert!(Password::new(10_000).is_err());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Password(u16);

impl Password {
    /// Highest accepted password.
    pub const MAX: u16 = 9999;

    /// Factory default PIN shipped on every control head.
    pub const DEFAULT: Self = Self(1234);

    /// Creates a password.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if the value exceeds 9999.
    pub fn new(value: u16) -> Result<Self, ValueError> {
        if value > Self::MAX {
            return Err(ValueError::OutOfRange {
                min: 0,
                max: u32::from(Self::MAX),
                actual: u32::from(value),
            });
        }
        Ok(Self(value))
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn value(&self) -> u16 {
        self.0
    }

    /// Returns the decimal digits, thousands first.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn digits(&self) -> [u8; 4] {
        // Each digit is < 10 so the narrowing casts are lossless
        [
            (self.0 / 1000) as u8,
            ((self.0 / 100) % 10) as u8,
            ((self.0 / 10) % 10) as u8,
            (self.0 % 10) as u8,
        ]
    }

    /// Rebuilds a password from its digits, thousands first.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if any digit is above 9.
    pub fn from_digits(digits: [u8; 4]) -> Result<Self, ValueError> {
        let mut value = 0u16;
        for digit in digits {
            if digit > 9 {
                return Err(ValueError::OutOfRange {
                    min: 0,
                    max: 9,
                    actual: u32::from(digit),
                });
            }
            value = value * 10 + u16::from(digit);
        }
        Ok(Self(value))
    }
}

impl Default for Password {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// Keep the PIN out of logs.
impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(****)")
    }
}

impl TryFrom<u16> for Password {
    type Error = ValueError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Password> for u16 {
    fn from(password: Password) -> Self {
        password.0
    }
}
