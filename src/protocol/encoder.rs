// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outbound commands.
//!
//! Every command frame is its base byte repeated 20 times, with an opcode
//! at offset 13 and the payload from offset 14.
//!
//! | Command | Base | Opcode | Payload |
//! |---------|------|--------|---------|
//! | [`Command::SetHardness`] | `u` | `H` | gpg |
//! | [`Command::SetRegenerationTime`] | `u` | `t` | hour, pm |
//! | [`Command::SetReserveCapacity`] | `v` | `B` | percent |
//! | [`Command::SetSaltLevel`] | `u` | `S` | regens, 5, tank type, fill height |
//! | [`Command::SetDisplay`] | `v` | `G` | 0 = on, 1 = off |
//! | [`Command::RegenerateNow`] | `u` | `R` | `N` |
//! | [`Command::RegenerateNext`] | `u` | `R` | `T` |
//! | [`Command::SyncTime`] | `u` | `T` | hour, minute, pm, second |
//! | [`Command::ResetGallons`] | `w` | `A` | |
//! | [`Command::ResetRegenerations`] | `w` | `B` | |
//!
//! Polls, the handshake request and keepalives carry no opcode.

use crate::error::{Error, ValueError};
use crate::register::{Catalog, Register, RegisterGroup, RegisterId, RegisterValue};
use crate::state::RegisterCache;
use crate::types::brine::{self, TankType};
use crate::types::ClockTime;

use super::frame::{FRAME_LEN, Frame, HANDSHAKE_BYTE, KEEPALIVE_BYTE};

/// Offset of the opcode in command frames.
pub const OPCODE_OFFSET: usize = 13;

/// Constant the device expects after the regeneration count in salt writes.
const SALT_COMMAND_MARKER: u8 = 5;

/// Display command byte that turns the screen on.
const DISPLAY_ON: u8 = 0;

/// A frame the engine can send.
///
/// # Examples
///
/// ```
/// use culligan_ble::protocol::Command;
///
/// let frame = Command::SetHardness(17).encode();
/// assert_eq!(frame.as_bytes()[..13], [b'u'; 13]);
/// assert_eq!(frame.as_bytes()[13..15], [b'H', 17]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Session handshake request.
    Handshake,
    /// Link keepalive.
    Keepalive,
    /// Requests every page of a group.
    Poll(RegisterGroup),
    /// Water hardness in grains per gallon.
    SetHardness(u8),
    /// Regeneration start hour on a 12-hour clock.
    SetRegenerationTime {
        /// Hour (1-12).
        hour: u8,
        /// Afternoon.
        pm: bool,
    },
    /// Reserve capacity in percent.
    SetReserveCapacity(u8),
    /// Salt level, expressed the way the device stores it.
    SetSaltLevel {
        /// Regenerations the salt lasts for.
        regenerations: u8,
        /// Brine tank type.
        tank_type: TankType,
        /// Fill height in inches.
        fill_height: u8,
    },
    /// Turns the display on or off.
    SetDisplay(bool),
    /// Regenerates immediately.
    RegenerateNow,
    /// Regenerates at the next scheduled time.
    RegenerateNext,
    /// Sets the device clock.
    SyncTime(ClockTime),
    /// Resets the resettable gallon counter.
    ResetGallons,
    /// Resets the resettable regeneration counter.
    ResetRegenerations,
}

impl Command {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Handshake => "handshake",
            Self::Keepalive => "keepalive",
            Self::Poll(_) => "poll",
            Self::SetHardness(_) => "set_hardness",
            Self::SetRegenerationTime { .. } => "set_regeneration_time",
            Self::SetReserveCapacity(_) => "set_reserve_capacity",
            Self::SetSaltLevel { .. } => "set_salt_level",
            Self::SetDisplay(_) => "set_display",
            Self::RegenerateNow => "regenerate_now",
            Self::RegenerateNext => "regenerate_next",
            Self::SyncTime(_) => "sync_time",
            Self::ResetGallons => "reset_gallons",
            Self::ResetRegenerations => "reset_regenerations",
        }
    }

    /// Group whose pages the device answers this command with.
    ///
    /// `None` for the handshake and keepalive, which are not answered
    /// with register pages.
    #[must_use]
    pub const fn group(&self) -> Option<RegisterGroup> {
        match self {
            Self::Handshake | Self::Keepalive => None,
            Self::Poll(group) => Some(*group),
            Self::SetHardness(_)
            | Self::SetRegenerationTime { .. }
            | Self::SetSaltLevel { .. }
            | Self::RegenerateNow
            | Self::RegenerateNext
            | Self::SyncTime(_) => Some(RegisterGroup::Status),
            Self::SetReserveCapacity(_) | Self::SetDisplay(_) => Some(RegisterGroup::Settings),
            Self::ResetGallons | Self::ResetRegenerations => Some(RegisterGroup::Statistics),
        }
    }

    /// Byte the frame is filled with.
    #[must_use]
    pub const fn base(&self) -> u8 {
        match self {
            Self::Handshake => HANDSHAKE_BYTE,
            Self::Keepalive => KEEPALIVE_BYTE,
            _ => match self.group() {
                Some(group) => group.byte(),
                None => KEEPALIVE_BYTE,
            },
        }
    }

    /// Opcode and payload, if the command carries any.
    #[must_use]
    pub fn payload(&self) -> Option<Vec<u8>> {
        let bytes = match *self {
            Self::Handshake | Self::Keepalive | Self::Poll(_) => return None,
            Self::SetHardness(gpg) => vec![b'H', gpg],
            Self::SetRegenerationTime { hour, pm } => vec![b't', hour, u8::from(pm)],
            Self::SetReserveCapacity(pct) => vec![b'B', pct],
            Self::SetSaltLevel {
                regenerations,
                tank_type,
                fill_height,
            } => vec![
                b'S',
                regenerations,
                SALT_COMMAND_MARKER,
                tank_type.raw(),
                fill_height,
            ],
            Self::SetDisplay(on) => vec![b'G', u8::from(!on)],
            Self::RegenerateNow => vec![b'R', b'N'],
            Self::RegenerateNext => vec![b'R', b'T'],
            Self::SyncTime(time) => vec![
                b'T',
                time.hour(),
                time.minute(),
                u8::from(time.is_pm()),
                time.second(),
            ],
            Self::ResetGallons => vec![b'A'],
            Self::ResetRegenerations => vec![b'B'],
        };
        Some(bytes)
    }

    /// Builds the 20-byte frame.
    #[must_use]
    pub fn encode(&self) -> Frame {
        let frame = Frame::filled(self.base());
        match self.payload() {
            Some(payload) => {
                debug_assert!(OPCODE_OFFSET + payload.len() <= FRAME_LEN);
                frame.with_payload(OPCODE_OFFSET, &payload)
            }
            None => frame,
        }
    }
}

/// Builds the command writing `value` to a configuration register.
///
/// The value is validated against the register's bounds first, and
/// single-byte values are encoded by the register's codec. Writes
/// that depend on other registers read them from `cache`: the salt level
/// needs the brine refill time, tank type and fill height, and the
/// regeneration hour keeps the cached AM/PM half (AM if unknown).
///
/// # Errors
///
/// - `Error::Unsupported` if the register is not writable
/// - `Error::Validation` if the value has the wrong kind, is out of
///   bounds, or needs cached context that is missing
pub fn write_command(
    register: RegisterId,
    value: &RegisterValue,
    cache: &RegisterCache,
) -> Result<Command, Error> {
    let descriptor = Catalog::get(register);
    if !descriptor.is_writable() {
        return Err(Error::Unsupported {
            register,
            operation: "write",
        });
    }

    let command = match register {
        RegisterId::WaterHardness => Command::SetHardness(value_byte(descriptor, value)?),
        RegisterId::ReserveCapacity => Command::SetReserveCapacity(value_byte(descriptor, value)?),
        RegisterId::RegenerationHour => {
            let pm = cache
                .value(RegisterId::RegenerationPm)
                .and_then(RegisterValue::as_bool)
                .unwrap_or(false);
            Command::SetRegenerationTime {
                hour: value_byte(descriptor, value)?,
                pm,
            }
        }
        RegisterId::Display => Command::SetDisplay(value_byte(descriptor, value)? == DISPLAY_ON),
        RegisterId::SaltLevel => {
            descriptor.check_write(value)?;
            let pounds = value.as_f32().ok_or(ValueError::WrongKind {
                register,
                expected: descriptor.kind.name(),
            })?;
            let refill = cached_byte(cache, register, RegisterId::BrineRefillTime)?;
            let tank = cached_byte(cache, register, RegisterId::BrineTankType)?;
            let fill_height = cached_byte(cache, register, RegisterId::BrineFillHeight)?;
            Command::SetSaltLevel {
                regenerations: brine::regenerations_for(pounds, refill),
                tank_type: TankType::from_raw(tank),
                fill_height,
            }
        }
        _ => {
            return Err(Error::Unsupported {
                register,
                operation: "write",
            });
        }
    };
    tracing::debug!(register = %register, value = %value, command = command.name(), "Encoded write");
    Ok(command)
}

/// Builds the command for an action register.
///
/// `now` is only used by the clock sync.
///
/// # Errors
///
/// Returns `Error::Unsupported` if the register is not an action.
pub fn action_command(register: RegisterId, now: ClockTime) -> Result<Command, Error> {
    match register {
        RegisterId::RegenerateNow => Ok(Command::RegenerateNow),
        RegisterId::RegenerateNext => Ok(Command::RegenerateNext),
        RegisterId::SyncTime => Ok(Command::SyncTime(now)),
        RegisterId::ResetGallons => Ok(Command::ResetGallons),
        RegisterId::ResetRegenerations => Ok(Command::ResetRegenerations),
        _ => Err(Error::Unsupported {
            register,
            operation: "press",
        }),
    }
}

/// Encodes a single-byte write through the register's codec.
fn value_byte(descriptor: &Register, value: &RegisterValue) -> Result<u8, ValueError> {
    match descriptor.encode(value)?.as_slice() {
        [byte] => Ok(*byte),
        _ => Err(ValueError::WrongKind {
            register: descriptor.id,
            expected: descriptor.kind.name(),
        }),
    }
}

fn cached_byte(cache: &RegisterCache, register: RegisterId, missing: RegisterId) -> Result<u8, ValueError> {
    cache
        .value(missing)
        .and_then(RegisterValue::as_u32)
        .and_then(|v| u8::try_from(v).ok())
        .ok_or(ValueError::MissingContext { register, missing })
}
