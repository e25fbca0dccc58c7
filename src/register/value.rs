// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Register values, kinds and bounds.

use std::fmt;

use serde::Serialize;

use crate::error::ValueError;

/// Unit of measurement attached to numeric registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Unit {
    /// Gallons per minute.
    GallonsPerMinute,
    /// US gallons.
    Gallons,
    /// Grains per gallon.
    GrainsPerGallon,
    /// Grains.
    Grains,
    /// Pounds.
    Pounds,
    /// Percent.
    Percent,
    /// Days.
    Days,
    /// Hours.
    Hours,
    /// Minutes.
    Minutes,
    /// Inches.
    Inches,
    /// Plain count.
    Count,
}

impl Unit {
    /// Display symbol.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::GallonsPerMinute => "GPM",
            Self::Gallons => "gal",
            Self::GrainsPerGallon => "GPG",
            Self::Grains => "grains",
            Self::Pounds => "lbs",
            Self::Percent => "%",
            Self::Days => "days",
            Self::Hours => "hrs",
            Self::Minutes => "min",
            Self::Inches => "in",
            Self::Count => "",
        }
    }
}

/// Inclusive numeric range a register may hold.
///
/// The same bounds are enforced when a value is decoded from the device
/// and when a caller asks to write one.
///
/// # Examples
///
/// ```
/// use culligan_ble::register::Bounds;
///
/// let hardness = Bounds::new(0, 99);
/// assert!(hardness.contains(42));
/// assert!(hardness.check(150).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Bounds {
    min: u32,
    max: u32,
}

impl Bounds {
    /// No effective limit.
    pub const UNBOUNDED: Self = Self::new(0, u32::MAX);

    /// Creates an inclusive range.
    #[must_use]
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Lower bound.
    #[must_use]
    pub const fn min(&self) -> u32 {
        self.min
    }

    /// Upper bound.
    #[must_use]
    pub const fn max(&self) -> u32 {
        self.max
    }

    /// Returns true if `value` lies in the range.
    #[must_use]
    pub const fn contains(&self, value: u32) -> bool {
        value >= self.min && value <= self.max
    }

    /// Returns true if the decimal `value` lies in the range.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn contains_decimal(&self, value: f32) -> bool {
        value.is_finite() && value >= self.min as f32 && value <= self.max as f32
    }

    /// Checks an integer against the range.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if the value is outside the range.
    pub fn check(&self, value: u32) -> Result<(), ValueError> {
        if self.contains(value) {
            Ok(())
        } else {
            Err(ValueError::OutOfRange {
                min: self.min,
                max: self.max,
                actual: value,
            })
        }
    }
}

/// Shape of the value a register holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValueKind {
    /// Two-state flag.
    Flag,
    /// Whole number with unit and bounds.
    Integer {
        /// Unit of measurement.
        unit: Unit,
        /// Accepted range.
        bounds: Bounds,
    },
    /// Fractional number with unit and bounds.
    Decimal {
        /// Unit of measurement.
        unit: Unit,
        /// Accepted range.
        bounds: Bounds,
    },
    /// Free text.
    Text,
}

impl ValueKind {
    /// Bounds of numeric kinds.
    #[must_use]
    pub const fn bounds(&self) -> Option<Bounds> {
        match self {
            Self::Integer { bounds, .. } | Self::Decimal { bounds, .. } => Some(*bounds),
            Self::Flag | Self::Text => None,
        }
    }

    /// Unit of numeric kinds.
    #[must_use]
    pub const fn unit(&self) -> Option<Unit> {
        match self {
            Self::Integer { unit, .. } | Self::Decimal { unit, .. } => Some(*unit),
            Self::Flag | Self::Text => None,
        }
    }

    /// Short name used in error messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Integer { .. } => "integer",
            Self::Decimal { .. } => "decimal",
            Self::Text => "text",
        }
    }
}

/// Who may read or write a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AccessClass {
    /// Read-only value reported by the device.
    Telemetry,
    /// Value reported by the device that callers may also write.
    Configuration,
    /// Write-only trigger for a physical behavior.
    Action,
}

impl AccessClass {
    /// Returns true if the device reports values for this class.
    #[must_use]
    pub const fn is_readable(&self) -> bool {
        matches!(self, Self::Telemetry | Self::Configuration)
    }
}

/// A decoded register value.
///
/// # Examples
///
/// ```
/// use culligan_ble::register::RegisterValue;
///
/// let v = RegisterValue::from(42u8);
/// assert_eq!(v.as_u32(), Some(42));
/// assert_eq!(v.as_f32(), Some(42.0));
///
/// let flag = RegisterValue::from(true);
/// assert_eq!(flag.as_bool(), Some(true));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RegisterValue {
    /// Two-state flag.
    Flag(bool),
    /// Whole number.
    Integer(u32),
    /// Fractional number.
    Decimal(f32),
    /// Free text.
    Text(String),
}

impl RegisterValue {
    /// Returns the flag, if this is one.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as a whole number.
    ///
    /// Decimals are accepted when they have no fractional part.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Decimal(v) if v.is_finite() && *v >= 0.0 && v.fract() == 0.0 => {
                // Non-negative whole number; saturates above u32::MAX
                Some(*v as u32)
            }
            _ => None,
        }
    }

    /// Returns the value as a decimal.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Integer(v) => Some(*v as f32),
            Self::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text, if this is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(true) => f.write_str("on"),
            Self::Flag(false) => f.write_str("off"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Decimal(v) => write!(f, "{v:.2}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for RegisterValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<u8> for RegisterValue {
    fn from(value: u8) -> Self {
        Self::Integer(u32::from(value))
    }
}

impl From<u16> for RegisterValue {
    fn from(value: u16) -> Self {
        Self::Integer(u32::from(value))
    }
}

impl From<u32> for RegisterValue {
    fn from(value: u32) -> Self {
        Self::Integer(value)
    }
}

impl From<f32> for RegisterValue {
    fn from(value: f32) -> Self {
        Self::Decimal(value)
    }
}

impl From<String> for RegisterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for RegisterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}
