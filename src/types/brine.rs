// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Brine tank geometry and salt arithmetic.

use std::fmt;

/// Pounds of salt consumed per minute of brine refill.
pub const SALT_PER_REFILL_MINUTE: f32 = 1.5;

/// Raw value reported when no brine tank has been configured.
pub const TANK_NOT_CONFIGURED: u8 = 0xFF;

/// Upper bound on the regeneration count the device accepts.
pub const MAX_REGENERATIONS: u8 = 100;

/// Brine tank diameter as reported by the control head.
///
/// Unknown diameters fall back to the 16 inch multiplier, which is what the
/// control head itself assumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TankType {
    /// 16 inch tank.
    Inch16,
    /// 18 inch tank.
    Inch18,
    /// 24 inch tank.
    Inch24,
    /// 30 inch tank.
    Inch30,
    /// Any other raw diameter.
    Other(u8),
}

impl TankType {
    /// Maps the raw diameter byte.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            16 => Self::Inch16,
            18 => Self::Inch18,
            24 => Self::Inch24,
            30 => Self::Inch30,
            other => Self::Other(other),
        }
    }

    /// Returns the raw diameter byte.
    #[must_use]
    pub const fn raw(&self) -> u8 {
        match self {
            Self::Inch16 => 16,
            Self::Inch18 => 18,
            Self::Inch24 => 24,
            Self::Inch30 => 30,
            Self::Other(raw) => *raw,
        }
    }

    /// Pounds of salt per inch of fill height.
    #[must_use]
    pub const fn pounds_per_inch(&self) -> f32 {
        match self {
            Self::Inch16 | Self::Other(_) => 8.1,
            Self::Inch18 => 10.4,
            Self::Inch24 => 18.6,
            Self::Inch30 => 29.55,
        }
    }

    /// Salt capacity of the tank filled to `fill_height` inches.
    #[must_use]
    pub fn capacity(&self, fill_height: u8) -> f32 {
        self.pounds_per_inch() * f32::from(fill_height)
    }
}

impl fmt::Display for TankType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\"", self.raw())
    }
}

/// Salt used by one regeneration for the given refill time.
#[must_use]
pub fn salt_per_regeneration(refill_minutes: u8) -> f32 {
    f32::from(refill_minutes) * SALT_PER_REFILL_MINUTE
}

/// Salt left in the tank, or `None` when the tank is not configured.
#[must_use]
pub fn salt_remaining(refill_minutes: u8, regenerations_left: u8) -> Option<f32> {
    if regenerations_left == TANK_NOT_CONFIGURED {
        return None;
    }
    Some(salt_per_regeneration(refill_minutes) * f32::from(regenerations_left))
}

/// Converts pounds of salt back into the regeneration count the device stores.
///
/// Partial regenerations are dropped and the result is capped at 100. A zero
/// refill time yields zero.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn regenerations_for(pounds: f32, refill_minutes: u8) -> u8 {
    let per_regen = salt_per_regeneration(refill_minutes);
    if per_regen <= 0.0 || pounds <= 0.0 {
        return 0;
    }
    // Bounded to 0..=100 before the cast
    (pounds / per_regen)
        .floor()
        .min(f32::from(MAX_REGENERATIONS)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipliers() {
        assert!((TankType::from_raw(16).capacity(10) - 81.0).abs() < 1e-3);
        assert!((TankType::from_raw(18).capacity(10) - 104.0).abs() < 1e-3);
        assert!((TankType::from_raw(24).capacity(10) - 186.0).abs() < 1e-3);
        assert!((TankType::from_raw(30).capacity(2) - 59.1).abs() < 1e-3);
        assert!((TankType::from_raw(21).pounds_per_inch() - 8.1).abs() < 1e-6);
    }

    #[test]
    fn raw_round_trip() {
        for raw in [16, 18, 24, 30, 21] {
            assert_eq!(TankType::from_raw(raw).raw(), raw);
        }
    }

    #[test]
    fn salt_remaining_requires_configured_tank() {
        assert_eq!(salt_remaining(8, TANK_NOT_CONFIGURED), None);
        assert_eq!(salt_remaining(8, 10), Some(120.0));
    }

    #[test]
    fn regenerations_floor_and_cap() {
        assert_eq!(regenerations_for(119.9, 8), 9);
        assert_eq!(regenerations_for(120.0, 8), 10);
        assert_eq!(regenerations_for(500.0, 1), 100);
        assert_eq!(regenerations_for(50.0, 0), 0);
    }
}
