// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The register catalog and page layouts.
//!
//! Every register is described once here. The descriptor carries the
//! value kind with its bounds, the access class, and where the value
//! comes from. Page layouts map byte offsets of each inbound page onto
//! registers.

use crate::error::{DecodeError, Error, ValueError};

use super::{
    AccessClass, Bounds, Codec, PageId, RegisterGroup, RegisterId, RegisterValue, Unit, ValueKind,
};

/// Where a register's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// Decoded from a field of a page in this group.
    Page(RegisterGroup),
    /// Computed from other fields of a page in this group.
    Derived(RegisterGroup),
    /// Taken from the session handshake.
    Handshake,
    /// Exposed to hosts but not located on any known page.
    Unmapped,
    /// Write-only command sent with this group's base byte.
    Command(RegisterGroup),
}

/// Immutable register descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    /// Identifier.
    pub id: RegisterId,
    /// Value kind, including unit and bounds.
    pub kind: ValueKind,
    /// Access class.
    pub access: AccessClass,
    /// Inbound source.
    pub source: Source,
    /// Layout of the value byte in write commands.
    ///
    /// `None` for registers callers cannot write, and for the salt level,
    /// whose command carries a regeneration count computed from the brine
    /// settings.
    pub codec: Option<Codec>,
}

impl Register {
    /// Configuration key.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        self.id.key()
    }

    /// Returns true if callers may write this register.
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        matches!(self.access, AccessClass::Configuration)
    }

    /// Returns true if this register triggers an action.
    #[must_use]
    pub const fn is_action(&self) -> bool {
        matches!(self.access, AccessClass::Action)
    }

    /// Checks a freshly decoded value against the declared bounds.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::OutOfRange` when a numeric value falls outside
    /// the bounds. Flags and text always pass.
    pub fn check_decoded(&self, value: &RegisterValue) -> Result<(), DecodeError> {
        let Some(bounds) = self.kind.bounds() else {
            return Ok(());
        };
        if in_bounds(bounds, value) {
            return Ok(());
        }
        Err(DecodeError::OutOfRange {
            register: self.id,
            min: bounds.min(),
            max: bounds.max(),
            actual: saturating_u32(value),
        })
    }

    /// Validates a value and encodes it into write command bytes.
    ///
    /// # Errors
    ///
    /// Returns the [`check_write`](Self::check_write) error, or
    /// `ValueError::WrongKind` if the register has no write codec or the
    /// value does not fit it.
    ///
    /// # Examples
    ///
    /// ```
    /// use culligan_ble::register::{Catalog, RegisterId, RegisterValue};
    ///
    /// let display = Catalog::get(RegisterId::Display);
    /// assert_eq!(display.encode(&RegisterValue::Flag(false)), Ok(vec![1]));
    /// assert!(display.encode(&RegisterValue::Integer(1)).is_err());
    /// ```
    pub fn encode(&self, value: &RegisterValue) -> Result<Vec<u8>, ValueError> {
        self.check_write(value)?;
        self.codec
            .and_then(|codec| codec.encode(value))
            .ok_or(ValueError::WrongKind {
                register: self.id,
                expected: self.kind.name(),
            })
    }

    /// Checks a value a caller wants to write.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::WrongKind` if the value's shape does not match
    /// the register, or `ValueError::OutOfRange` if it is outside the
    /// declared bounds.
    pub fn check_write(&self, value: &RegisterValue) -> Result<(), ValueError> {
        let wrong_kind = || ValueError::WrongKind {
            register: self.id,
            expected: self.kind.name(),
        };
        match self.kind {
            ValueKind::Flag => value.as_bool().map(|_| ()).ok_or_else(wrong_kind),
            ValueKind::Text => value.as_text().map(|_| ()).ok_or_else(wrong_kind),
            ValueKind::Integer { bounds, .. } => {
                let v = value.as_u32().ok_or_else(wrong_kind)?;
                bounds.check(v)
            }
            ValueKind::Decimal { bounds, .. } => {
                let v = value.as_f32().ok_or_else(wrong_kind)?;
                if bounds.contains_decimal(v) {
                    Ok(())
                } else {
                    Err(ValueError::OutOfRange {
                        min: bounds.min(),
                        max: bounds.max(),
                        actual: saturating_u32(value),
                    })
                }
            }
        }
    }
}

fn in_bounds(bounds: Bounds, value: &RegisterValue) -> bool {
    match value {
        RegisterValue::Integer(v) => bounds.contains(*v),
        RegisterValue::Decimal(v) => bounds.contains_decimal(*v),
        RegisterValue::Flag(_) | RegisterValue::Text(_) => true,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn saturating_u32(value: &RegisterValue) -> u32 {
    match value {
        RegisterValue::Integer(v) => *v,
        // Float to int casts saturate; only used for error reporting
        RegisterValue::Decimal(v) => v.round() as u32,
        RegisterValue::Flag(b) => u32::from(*b),
        RegisterValue::Text(_) => 0,
    }
}

/// One field of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Byte offset within the page.
    pub offset: usize,
    /// Register the field feeds.
    pub register: RegisterId,
    /// Field layout.
    pub codec: Codec,
}

/// Byte layout of one inbound page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    /// Page identifier.
    pub page: PageId,
    /// Expected byte at offset 19.
    pub terminator: u8,
    /// Fields carried by the page.
    pub fields: &'static [Field],
}

impl PageLayout {
    /// Offset of the terminator byte.
    pub const TERMINATOR_OFFSET: usize = 19;
}

/// Static catalog lookups.
///
/// # Examples
///
/// ```
/// use culligan_ble::register::{AccessClass, Catalog, RegisterId};
///
/// let hardness = Catalog::get(RegisterId::WaterHardness);
/// assert_eq!(hardness.access, AccessClass::Configuration);
/// assert_eq!(hardness.kind.bounds().unwrap().max(), 99);
///
/// assert!(Catalog::find("regenerate_now").unwrap().is_action());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Catalog;

impl Catalog {
    /// Returns the descriptor of a register.
    #[must_use]
    pub fn get(id: RegisterId) -> &'static Register {
        &REGISTERS[id.index()]
    }

    /// Looks up a register by configuration key.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownRegister` if the key is not in the catalog.
    pub fn find(key: &str) -> Result<&'static Register, Error> {
        key.parse::<RegisterId>().map(Self::get)
    }

    /// Iterates over every descriptor.
    pub fn iter() -> impl Iterator<Item = &'static Register> {
        REGISTERS.iter()
    }

    /// Returns the layout of an inbound page.
    #[must_use]
    pub fn layout(page: PageId) -> Option<&'static PageLayout> {
        LAYOUTS.iter().find(|layout| layout.page == page)
    }

    /// Iterates over every known page layout.
    pub fn layouts() -> impl Iterator<Item = &'static PageLayout> {
        LAYOUTS.iter()
    }

    /// Registers decoded from pages of a group.
    pub fn group_members(group: RegisterGroup) -> impl Iterator<Item = &'static Register> {
        REGISTERS.iter().filter(move |r| {
            matches!(r.source, Source::Page(g) | Source::Derived(g) if g == group)
        })
    }
}

const fn int(unit: Unit, min: u32, max: u32) -> ValueKind {
    ValueKind::Integer {
        unit,
        bounds: Bounds::new(min, max),
    }
}

const fn dec(unit: Unit, min: u32, max: u32) -> ValueKind {
    ValueKind::Decimal {
        unit,
        bounds: Bounds::new(min, max),
    }
}

const fn telemetry(id: RegisterId, kind: ValueKind, source: Source) -> Register {
    Register {
        id,
        kind,
        access: AccessClass::Telemetry,
        source,
        codec: None,
    }
}

const fn configuration(
    id: RegisterId,
    kind: ValueKind,
    source: Source,
    codec: Option<Codec>,
) -> Register {
    Register {
        id,
        kind,
        access: AccessClass::Configuration,
        source,
        codec,
    }
}

const fn action(id: RegisterId, group: RegisterGroup) -> Register {
    Register {
        id,
        kind: ValueKind::Flag,
        access: AccessClass::Action,
        source: Source::Command(group),
        codec: None,
    }
}

const STATUS: Source = Source::Page(RegisterGroup::Status);
const SETTINGS: Source = Source::Page(RegisterGroup::Settings);
const STATISTICS: Source = Source::Page(RegisterGroup::Statistics);
const U8_MAX: u32 = 0xFF;
const U16_MAX: u32 = 0xFFFF;
const U24_MAX: u32 = 0x00FF_FFFF;
const FLOW_MAX: u32 = 656;
/// Display command byte: 0 turns the screen on, 1 turns it off.
const DISPLAY_COMMAND: Codec = Codec::MaskClear(0x01);

#[rustfmt::skip]
static REGISTERS: [Register; 54] = {
    use RegisterId as R;
    use Unit as U;
    [
        telemetry(R::CurrentFlow, dec(U::GallonsPerMinute, 0, FLOW_MAX), STATUS),
        telemetry(R::SoftWaterRemaining, int(U::Gallons, 0, U16_MAX), STATUS),
        telemetry(R::WaterUsageToday, int(U::Gallons, 0, U16_MAX), STATUS),
        telemetry(R::PeakFlowToday, dec(U::GallonsPerMinute, 0, FLOW_MAX), STATUS),
        configuration(R::WaterHardness, int(U::GrainsPerGallon, 0, 99), STATUS, Some(Codec::U8)),
        configuration(R::SaltLevel, dec(U::Pounds, 0, 500), Source::Derived(RegisterGroup::Status), None),
        telemetry(R::AverageDailyUsage, int(U::Gallons, 0, U16_MAX), Source::Unmapped),
        telemetry(R::DaysUntilRegeneration, int(U::Days, 0, U8_MAX), SETTINGS),
        telemetry(R::TotalGallons, int(U::Gallons, 0, U24_MAX), STATISTICS),
        telemetry(R::TotalRegenerations, int(U::Count, 0, U16_MAX), STATISTICS),
        telemetry(R::BatteryLevel, int(U::Percent, 0, 100), STATUS),
        configuration(R::ReserveCapacity, int(U::Percent, 0, 49), SETTINGS, Some(Codec::U8)),
        telemetry(R::ResinCapacity, int(U::Grains, 0, 39_900), SETTINGS),
        telemetry(R::PrefillDuration, int(U::Hours, 0, 4), SETTINGS),
        telemetry(R::SoakDuration, int(U::Hours, 0, U8_MAX), SETTINGS),
        telemetry(R::BackwashTime, int(U::Minutes, 0, 99), SETTINGS),
        telemetry(R::BrineDrawTime, int(U::Minutes, 0, 99), SETTINGS),
        telemetry(R::RapidRinseTime, int(U::Minutes, 0, 99), SETTINGS),
        telemetry(R::BrineRefillTime, int(U::Minutes, 0, 99), STATUS),
        telemetry(R::FilterBackwashDays, int(U::Days, 0, U8_MAX), STATUS),
        telemetry(R::AirRechargeDays, int(U::Days, 0, U8_MAX), STATUS),
        telemetry(R::LowSaltAlert, int(U::Percent, 0, 100), STATUS),
        telemetry(R::BrineTankCapacity, dec(U::Pounds, 0, u32::MAX), Source::Derived(RegisterGroup::Status)),
        telemetry(R::BrineSaltPercent, dec(U::Percent, 0, 100), Source::Derived(RegisterGroup::Status)),
        telemetry(R::RegenerationDayOverride, int(U::Days, 0, 29), SETTINGS),
        telemetry(R::AirRechargeFrequency, int(U::Days, 0, U8_MAX), Source::Unmapped),
        telemetry(R::TotalGallonsResettable, int(U::Gallons, 0, U24_MAX), STATISTICS),
        telemetry(R::TotalRegenerationsResettable, int(U::Count, 0, U16_MAX), STATISTICS),
        telemetry(R::CyclePosition5, int(U::Minutes, 0, U8_MAX), Source::Unmapped),
        telemetry(R::CyclePosition6, int(U::Minutes, 0, U8_MAX), Source::Unmapped),
        telemetry(R::CyclePosition7, int(U::Minutes, 0, U8_MAX), Source::Unmapped),
        telemetry(R::CyclePosition8, int(U::Minutes, 0, U8_MAX), Source::Unmapped),
        telemetry(R::BrineTankType, int(U::Inches, 0, U8_MAX), STATUS),
        telemetry(R::BrineFillHeight, int(U::Inches, 0, U8_MAX), STATUS),
        telemetry(R::BrineRegenerationsRemaining, int(U::Count, 0, U8_MAX), STATUS),
        telemetry(R::FirmwareVersion, ValueKind::Text, Source::Handshake),
        telemetry(R::DeviceTime, ValueKind::Text, STATUS),
        telemetry(R::RegenerationTime, ValueKind::Text, STATUS),
        telemetry(R::RegenerationPm, ValueKind::Flag, STATUS),
        telemetry(R::DisplayOff, ValueKind::Flag, STATUS),
        telemetry(R::BypassActive, ValueKind::Flag, STATUS),
        telemetry(R::ShutoffActive, ValueKind::Flag, STATUS),
        telemetry(R::RegenerationActive, ValueKind::Flag, STATUS),
        telemetry(R::RentalRegenDisabled, ValueKind::Flag, Source::Unmapped),
        telemetry(R::RentalUnit, ValueKind::Flag, Source::Unmapped),
        telemetry(R::PrefillEnabled, ValueKind::Flag, SETTINGS),
        telemetry(R::PrefillSoakMode, ValueKind::Flag, Source::Unmapped),
        configuration(R::Display, ValueKind::Flag, STATUS, Some(DISPLAY_COMMAND)),
        configuration(R::RegenerationHour, int(U::Hours, 1, 12), STATUS, Some(Codec::U8)),
        action(R::RegenerateNow, RegisterGroup::Status),
        action(R::RegenerateNext, RegisterGroup::Status),
        action(R::SyncTime, RegisterGroup::Status),
        action(R::ResetGallons, RegisterGroup::Statistics),
        action(R::ResetRegenerations, RegisterGroup::Statistics),
    ]
};

const fn field(offset: usize, register: RegisterId, codec: Codec) -> Field {
    Field {
        offset,
        register,
        codec,
    }
}

/// Status flag byte layout, shared by `uu-0` and `vv-0`.
const SHUTOFF_ACTIVE: u8 = 0x04;
const BYPASS_ACTIVE: u8 = 0x08;
const DISPLAY_OFF: u8 = 0x10;

#[rustfmt::skip]
static LAYOUTS: [PageLayout; 5] = {
    use RegisterId as R;
    [
        PageLayout {
            page: PageId::STATUS_0,
            terminator: b'9',
            fields: &[
                field(3, R::DeviceTime, Codec::Clock),
                field(6, R::BatteryLevel, Codec::Battery),
                field(7, R::CurrentFlow, Codec::Centi16),
                field(9, R::SoftWaterRemaining, Codec::U16),
                field(11, R::WaterUsageToday, Codec::U16),
                field(13, R::PeakFlowToday, Codec::Centi16),
                field(15, R::WaterHardness, Codec::U8),
                field(16, R::RegenerationHour, Codec::U8),
                field(16, R::RegenerationTime, Codec::HourOfDay),
                field(17, R::RegenerationPm, Codec::NonZero),
                field(18, R::ShutoffActive, Codec::Mask(SHUTOFF_ACTIVE)),
                field(18, R::BypassActive, Codec::Mask(BYPASS_ACTIVE)),
                field(18, R::DisplayOff, Codec::Mask(DISPLAY_OFF)),
                field(18, R::Display, Codec::MaskClear(DISPLAY_OFF)),
            ],
        },
        PageLayout {
            page: PageId::STATUS_1,
            terminator: b':',
            fields: &[
                field(3, R::FilterBackwashDays, Codec::U8),
                field(4, R::AirRechargeDays, Codec::U8),
                field(8, R::RegenerationActive, Codec::NonZero),
                field(13, R::BrineRegenerationsRemaining, Codec::U8),
                field(14, R::LowSaltAlert, Codec::U8),
                field(15, R::BrineTankType, Codec::U8),
                field(16, R::BrineFillHeight, Codec::U8),
                field(17, R::BrineRefillTime, Codec::U8),
            ],
        },
        PageLayout {
            page: PageId::SETTINGS_0,
            terminator: b'B',
            fields: &[
                field(3, R::DaysUntilRegeneration, Codec::U8),
                field(4, R::RegenerationDayOverride, Codec::U8),
                field(5, R::ReserveCapacity, Codec::U8),
                field(6, R::ResinCapacity, Codec::Scaled16(100)),
                field(8, R::PrefillEnabled, Codec::NonZero),
                field(9, R::PrefillDuration, Codec::U8),
                field(10, R::SoakDuration, Codec::U8),
                field(16, R::ShutoffActive, Codec::Mask(SHUTOFF_ACTIVE)),
                field(16, R::BypassActive, Codec::Mask(BYPASS_ACTIVE)),
                field(16, R::DisplayOff, Codec::Mask(DISPLAY_OFF)),
                field(16, R::Display, Codec::MaskClear(DISPLAY_OFF)),
            ],
        },
        PageLayout {
            page: PageId::SETTINGS_1,
            terminator: b'C',
            fields: &[
                field(3, R::BackwashTime, Codec::Low7),
                field(4, R::BrineDrawTime, Codec::Low7),
                field(5, R::RapidRinseTime, Codec::Low7),
                // Offset 6 mirrors the uu-1 refill time, which feeds the salt level
            ],
        },
        PageLayout {
            page: PageId::STATISTICS_0,
            terminator: b'F',
            fields: &[
                field(3, R::CurrentFlow, Codec::Centi16),
                field(5, R::TotalGallons, Codec::U24),
                field(8, R::TotalGallonsResettable, Codec::U24),
                field(11, R::TotalRegenerations, Codec::U16),
                field(13, R::TotalRegenerationsResettable, Codec::U16),
            ],
        },
    ]
};
