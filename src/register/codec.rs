// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Field codecs.
//!
//! A codec turns the raw bytes of one page field into a [`RegisterValue`]
//! and back. Multi-byte numbers are big-endian.

use crate::types::{ClockTime, format_12h};

use super::RegisterValue;

/// Raw battery codes and the percentage each stands for.
const BATTERY_LEVELS: [(u8, u32); 5] = [(0, 0), (1, 100), (2, 75), (3, 50), (4, 25)];

/// Bit set on cycle times the installer cannot adjust.
const FIXED_CYCLE_BIT: u8 = 0x80;

/// How a page field is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// One unsigned byte.
    U8,
    /// Big-endian unsigned 16-bit.
    U16,
    /// Big-endian unsigned 24-bit.
    U24,
    /// Big-endian 16-bit in hundredths.
    Centi16,
    /// Big-endian 16-bit multiplied by a fixed factor.
    Scaled16(u32),
    /// One byte with the fixed-cycle bit masked off.
    Low7,
    /// Battery code looked up in a table.
    Battery,
    /// Any non-zero byte is set.
    NonZero,
    /// Set when any bit of the mask is set.
    Mask(u8),
    /// Set when no bit of the mask is set.
    MaskClear(u8),
    /// Hour, minute and AM/PM bytes rendered as `h:mm AM`.
    Clock,
    /// Hour and AM/PM bytes rendered as `h:00 AM`.
    HourOfDay,
}

impl Codec {
    /// Number of bytes the field occupies.
    #[must_use]
    pub const fn width(&self) -> usize {
        match self {
            Self::U8
            | Self::Low7
            | Self::Battery
            | Self::NonZero
            | Self::Mask(_)
            | Self::MaskClear(_) => 1,
            Self::U16 | Self::Centi16 | Self::Scaled16(_) | Self::HourOfDay => 2,
            Self::U24 | Self::Clock => 3,
        }
    }

    /// Decodes a field. Returns `None` if `raw` is shorter than the field.
    #[must_use]
    pub fn decode(&self, raw: &[u8]) -> Option<RegisterValue> {
        let raw = raw.get(..self.width())?;
        let value = match self {
            Self::U8 => RegisterValue::Integer(u32::from(raw[0])),
            Self::U16 => RegisterValue::Integer(be(raw)),
            Self::U24 => RegisterValue::Integer(be(raw)),
            Self::Centi16 => RegisterValue::Decimal(f32::from(u16::from_be_bytes([raw[0], raw[1]])) / 100.0),
            Self::Scaled16(factor) => RegisterValue::Integer(be(raw) * factor),
            Self::Low7 => RegisterValue::Integer(u32::from(raw[0] & !FIXED_CYCLE_BIT)),
            Self::Battery => {
                let percent = BATTERY_LEVELS
                    .iter()
                    .find(|(code, _)| *code == raw[0])
                    .map_or(0, |(_, pct)| *pct);
                RegisterValue::Integer(percent)
            }
            Self::NonZero => RegisterValue::Flag(raw[0] != 0),
            Self::Mask(mask) => RegisterValue::Flag(raw[0] & mask != 0),
            Self::MaskClear(mask) => RegisterValue::Flag(raw[0] & mask == 0),
            Self::Clock => RegisterValue::Text(format_12h(raw[0], raw[1], raw[2] != 0)),
            Self::HourOfDay => RegisterValue::Text(format_12h(raw[0], 0, raw[1] != 0)),
        };
        Some(value)
    }

    /// Encodes a value into field bytes.
    ///
    /// Returns `None` if the value has the wrong shape or does not fit the
    /// field.
    #[must_use]
    pub fn encode(&self, value: &RegisterValue) -> Option<Vec<u8>> {
        match self {
            Self::U8 => u8::try_from(value.as_u32()?).ok().map(|b| vec![b]),
            Self::U16 => u16::try_from(value.as_u32()?)
                .ok()
                .map(|v| v.to_be_bytes().to_vec()),
            Self::U24 => {
                let v = value.as_u32()?;
                (v <= 0x00FF_FFFF).then(|| v.to_be_bytes()[1..].to_vec())
            }
            Self::Centi16 => {
                let hundredths = (value.as_f32()? * 100.0).round();
                if !(0.0..=f32::from(u16::MAX)).contains(&hundredths) {
                    return None;
                }
                // Range checked above
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let raw = hundredths as u16;
                Some(raw.to_be_bytes().to_vec())
            }
            Self::Scaled16(factor) => {
                let v = value.as_u32()?;
                if *factor == 0 || v % factor != 0 {
                    return None;
                }
                u16::try_from(v / factor)
                    .ok()
                    .map(|raw| raw.to_be_bytes().to_vec())
            }
            Self::Low7 => u8::try_from(value.as_u32()?)
                .ok()
                .filter(|b| b & FIXED_CYCLE_BIT == 0)
                .map(|b| vec![b]),
            Self::Battery => {
                let percent = value.as_u32()?;
                BATTERY_LEVELS
                    .iter()
                    .find(|(_, pct)| *pct == percent)
                    .map(|(code, _)| vec![*code])
            }
            Self::NonZero => Some(vec![u8::from(value.as_bool()?)]),
            Self::Mask(mask) => Some(vec![if value.as_bool()? { *mask } else { 0 }]),
            Self::MaskClear(mask) => Some(vec![if value.as_bool()? { 0 } else { *mask }]),
            Self::Clock => {
                let time: ClockTime = value.as_text()?.parse().ok()?;
                Some(vec![time.hour(), time.minute(), u8::from(time.is_pm())])
            }
            Self::HourOfDay => {
                let time: ClockTime = value.as_text()?.parse().ok()?;
                (time.minute() == 0).then(|| vec![time.hour(), u8::from(time.is_pm())])
            }
        }
    }
}

fn be(raw: &[u8]) -> u32 {
    raw.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b))
}
