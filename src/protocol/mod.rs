// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire protocol for Culligan control heads.
//!
//! The control head speaks a fixed-size frame protocol over a UART-style
//! BLE service. This module covers both directions:
//!
//! - [`FrameAssembler`] and [`Page`]: inbound bytes to typed pages
//! - [`Command`]: outbound command frames
//! - [`auth`]: the password packet sent after the handshake
//!
//! # Examples
//!
//! ```
//! use culligan_ble::protocol::{Command, FrameAssembler, Page};
//! use culligan_ble::register::RegisterGroup;
//!
//! let poll = Command::Poll(RegisterGroup::Statistics).encode();
//! assert_eq!(poll.as_bytes(), &[b'w'; 20]);
//!
//! let mut assembler = FrameAssembler::new();
//! let mut handshake = [0u8; 20];
//! handshake[..2].copy_from_slice(b"tt");
//! handshake[5] = 6;
//! handshake[6] = 2;
//!
//! let pages = assembler.push(&handshake);
//! let Ok(Page::Handshake(info)) = &pages[0] else { panic!() };
//! assert!(!info.requires_auth());
//! assert_eq!(info.firmware_version(), "C6.2");
//! ```

pub mod auth;
mod encoder;
mod frame;

pub use encoder::{Command, OPCODE_OFFSET, action_command, write_command};
pub(crate) use frame::hex;
pub use frame::{
    DataPage, FRAME_LEN, Frame, FrameAssembler, HANDSHAKE_BYTE, HANDSHAKE_MIN_LEN, HandshakeInfo,
    KEEPALIVE_BYTE, Page,
};
