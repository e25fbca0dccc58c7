// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Register identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Identifier of every register the engine knows about.
///
/// The discriminant doubles as the index into the catalog table, so the
/// order here must match [`RegisterId::ALL`].
///
/// # Examples
///
/// ```
/// use culligan_ble::register::RegisterId;
///
/// let id: RegisterId = "water_hardness".parse().unwrap();
/// assert_eq!(id, RegisterId::WaterHardness);
/// assert_eq!(id.key(), "water_hardness");
///
/// // Legacy configuration keys are still understood
/// assert_eq!("brine_level".parse::<RegisterId>().unwrap(), RegisterId::SaltLevel);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegisterId {
    /// Instantaneous flow rate.
    CurrentFlow,
    /// Soft water left before the next regeneration.
    SoftWaterRemaining,
    /// Water used since midnight.
    WaterUsageToday,
    /// Highest flow rate since midnight.
    PeakFlowToday,
    /// Configured water hardness.
    WaterHardness,
    /// Salt left in the brine tank.
    SaltLevel,
    /// Average daily water usage.
    AverageDailyUsage,
    /// Days until the next scheduled regeneration.
    DaysUntilRegeneration,
    /// Lifetime treated water.
    TotalGallons,
    /// Lifetime regeneration count.
    TotalRegenerations,
    /// Clock backup battery level.
    BatteryLevel,
    /// Reserve capacity kept before regenerating.
    ReserveCapacity,
    /// Resin grain capacity.
    ResinCapacity,
    /// Pre-fill duration.
    PrefillDuration,
    /// Brine soak duration.
    SoakDuration,
    /// Backwash cycle time.
    BackwashTime,
    /// Brine draw cycle time.
    BrineDrawTime,
    /// Rapid rinse cycle time.
    RapidRinseTime,
    /// Brine refill cycle time.
    BrineRefillTime,
    /// Days between filter backwashes.
    FilterBackwashDays,
    /// Days between air recharges.
    AirRechargeDays,
    /// Low salt alert threshold.
    LowSaltAlert,
    /// Salt capacity of the brine tank.
    BrineTankCapacity,
    /// Salt level as a share of tank capacity.
    BrineSaltPercent,
    /// Forced regeneration interval in days.
    RegenerationDayOverride,
    /// Air recharge frequency.
    AirRechargeFrequency,
    /// Resettable treated water counter.
    TotalGallonsResettable,
    /// Resettable regeneration counter.
    TotalRegenerationsResettable,
    /// Regeneration cycle position 5 time.
    CyclePosition5,
    /// Regeneration cycle position 6 time.
    CyclePosition6,
    /// Regeneration cycle position 7 time.
    CyclePosition7,
    /// Regeneration cycle position 8 time.
    CyclePosition8,
    /// Brine tank diameter.
    BrineTankType,
    /// Brine tank fill height.
    BrineFillHeight,
    /// Regenerations the salt in the tank still covers.
    BrineRegenerationsRemaining,
    /// Controller firmware version.
    FirmwareVersion,
    /// Controller clock.
    DeviceTime,
    /// Scheduled regeneration time of day.
    RegenerationTime,
    /// Whether the scheduled regeneration hour is in the afternoon.
    RegenerationPm,
    /// Display is switched off.
    DisplayOff,
    /// Bypass valve is engaged.
    BypassActive,
    /// Water shutoff is engaged.
    ShutoffActive,
    /// A regeneration is running.
    RegenerationActive,
    /// Rental unit with regeneration disabled.
    RentalRegenDisabled,
    /// Unit is a rental.
    RentalUnit,
    /// Pre-fill is enabled.
    PrefillEnabled,
    /// Pre-fill soak mode is enabled.
    PrefillSoakMode,
    /// Display on/off switch.
    Display,
    /// Scheduled regeneration hour (1-12).
    RegenerationHour,
    /// Start a regeneration immediately.
    RegenerateNow,
    /// Regenerate at the next scheduled time.
    RegenerateNext,
    /// Set the controller clock from the host clock.
    SyncTime,
    /// Reset the resettable water counter.
    ResetGallons,
    /// Reset the resettable regeneration counter.
    ResetRegenerations,
}

impl RegisterId {
    /// Every register, in catalog order.
    pub const ALL: [Self; 54] = [
        Self::CurrentFlow,
        Self::SoftWaterRemaining,
        Self::WaterUsageToday,
        Self::PeakFlowToday,
        Self::WaterHardness,
        Self::SaltLevel,
        Self::AverageDailyUsage,
        Self::DaysUntilRegeneration,
        Self::TotalGallons,
        Self::TotalRegenerations,
        Self::BatteryLevel,
        Self::ReserveCapacity,
        Self::ResinCapacity,
        Self::PrefillDuration,
        Self::SoakDuration,
        Self::BackwashTime,
        Self::BrineDrawTime,
        Self::RapidRinseTime,
        Self::BrineRefillTime,
        Self::FilterBackwashDays,
        Self::AirRechargeDays,
        Self::LowSaltAlert,
        Self::BrineTankCapacity,
        Self::BrineSaltPercent,
        Self::RegenerationDayOverride,
        Self::AirRechargeFrequency,
        Self::TotalGallonsResettable,
        Self::TotalRegenerationsResettable,
        Self::CyclePosition5,
        Self::CyclePosition6,
        Self::CyclePosition7,
        Self::CyclePosition8,
        Self::BrineTankType,
        Self::BrineFillHeight,
        Self::BrineRegenerationsRemaining,
        Self::FirmwareVersion,
        Self::DeviceTime,
        Self::RegenerationTime,
        Self::RegenerationPm,
        Self::DisplayOff,
        Self::BypassActive,
        Self::ShutoffActive,
        Self::RegenerationActive,
        Self::RentalRegenDisabled,
        Self::RentalUnit,
        Self::PrefillEnabled,
        Self::PrefillSoakMode,
        Self::Display,
        Self::RegenerationHour,
        Self::RegenerateNow,
        Self::RegenerateNext,
        Self::SyncTime,
        Self::ResetGallons,
        Self::ResetRegenerations,
    ];

    /// Position of this register in the catalog table.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Configuration key used by host integrations.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::CurrentFlow => "current_flow",
            Self::SoftWaterRemaining => "soft_water_remaining",
            Self::WaterUsageToday => "water_usage_today",
            Self::PeakFlowToday => "peak_flow_today",
            Self::WaterHardness => "water_hardness",
            Self::SaltLevel => "salt_level",
            Self::AverageDailyUsage => "avg_daily_usage",
            Self::DaysUntilRegeneration => "days_until_regen",
            Self::TotalGallons => "total_gallons",
            Self::TotalRegenerations => "total_regenerations",
            Self::BatteryLevel => "battery_level",
            Self::ReserveCapacity => "reserve_capacity",
            Self::ResinCapacity => "resin_capacity",
            Self::PrefillDuration => "prefill_duration",
            Self::SoakDuration => "soak_duration",
            Self::BackwashTime => "backwash_time",
            Self::BrineDrawTime => "brine_draw_time",
            Self::RapidRinseTime => "rapid_rinse_time",
            Self::BrineRefillTime => "brine_refill_time",
            Self::FilterBackwashDays => "filter_backwash_days",
            Self::AirRechargeDays => "air_recharge_days",
            Self::LowSaltAlert => "low_salt_alert",
            Self::BrineTankCapacity => "brine_tank_capacity",
            Self::BrineSaltPercent => "brine_salt_percent",
            Self::RegenerationDayOverride => "regen_day_override",
            Self::AirRechargeFrequency => "air_recharge_frequency",
            Self::TotalGallonsResettable => "total_gallons_resettable",
            Self::TotalRegenerationsResettable => "total_regenerations_resettable",
            Self::CyclePosition5 => "cycle_position_5",
            Self::CyclePosition6 => "cycle_position_6",
            Self::CyclePosition7 => "cycle_position_7",
            Self::CyclePosition8 => "cycle_position_8",
            Self::BrineTankType => "brine_tank_type",
            Self::BrineFillHeight => "brine_fill_height",
            Self::BrineRegenerationsRemaining => "brine_regenerations_remaining",
            Self::FirmwareVersion => "firmware_version",
            Self::DeviceTime => "device_time",
            Self::RegenerationTime => "regeneration_time",
            Self::RegenerationPm => "regeneration_pm",
            Self::DisplayOff => "display_off",
            Self::BypassActive => "bypass_active",
            Self::ShutoffActive => "shutoff_active",
            Self::RegenerationActive => "regeneration_active",
            Self::RentalRegenDisabled => "rental_regen_disabled",
            Self::RentalUnit => "rental_unit",
            Self::PrefillEnabled => "prefill_enabled",
            Self::PrefillSoakMode => "prefill_soak_mode",
            Self::Display => "display",
            Self::RegenerationHour => "regeneration_time_hour",
            Self::RegenerateNow => "regenerate_now",
            Self::RegenerateNext => "regenerate_next",
            Self::SyncTime => "sync_time",
            Self::ResetGallons => "reset_gallons",
            Self::ResetRegenerations => "reset_regenerations",
        }
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for RegisterId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        // Older configuration surfaces used these names for the same registers
        let key = match key.as_str() {
            "brine_level" => "salt_level",
            "regen_days" => "regen_day_override",
            _ => key.as_str(),
        };
        Self::ALL
            .iter()
            .copied()
            .find(|id| id.key() == key)
            .ok_or_else(|| Error::UnknownRegister(s.to_string()))
    }
}

impl Serialize for RegisterId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

impl<'de> Deserialize<'de> for RegisterId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        key.parse().map_err(serde::de::Error::custom)
    }
}
