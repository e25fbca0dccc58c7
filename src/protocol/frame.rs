// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire frames and inbound page assembly.
//!
//! Every frame exchanged with the control head is 20 bytes. Inbound pages
//! start with a doubled type byte (`tt`, `uu`, `vv`, `ww`, `xx`), carry
//! their page number at offset 2 and end with a page-specific terminator
//! at offset 19. Notifications may split or merge pages, so inbound bytes
//! go through a [`FrameAssembler`] first.

use std::fmt;

use bytes::{Bytes, BytesMut};

use crate::error::DecodeError;
use crate::register::{Catalog, PageId, PageLayout, RegisterGroup};

/// Length of every frame.
pub const FRAME_LEN: usize = 20;

/// Bytes of a handshake page needed before it can be parsed.
///
/// [`FrameAssembler`] still waits for a full frame so that a split
/// handshake never borrows bytes from the next page.
pub const HANDSHAKE_MIN_LEN: usize = 18;

/// Type byte of handshake frames.
pub const HANDSHAKE_BYTE: u8 = b't';

/// Type byte of keepalive frames.
pub const KEEPALIVE_BYTE: u8 = b'x';

/// Handshake flag bit asking for the password exchange.
const AUTH_REQUIRED_FLAG: u8 = 0x80;

/// Firmware majors below this always require the password exchange.
const AUTH_FREE_FIRMWARE_MAJOR: u8 = 6;

/// An outbound 20-byte frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    /// Creates a frame with every byte set to `byte`.
    #[must_use]
    pub const fn filled(byte: u8) -> Self {
        Self([byte; FRAME_LEN])
    }

    /// Copies `payload` into the frame starting at `offset`.
    ///
    /// Bytes that would land past the end of the frame are dropped.
    #[must_use]
    pub fn with_payload(mut self, offset: usize, payload: &[u8]) -> Self {
        for (slot, byte) in self.0.iter_mut().skip(offset).zip(payload) {
            *slot = *byte;
        }
        self
    }

    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    /// Copies the frame into a [`Bytes`] buffer for the transport.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.0)
    }
}

impl From<[u8; FRAME_LEN]> for Frame {
    fn from(bytes: [u8; FRAME_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({})", hex(&self.0))
    }
}

/// Formats bytes as space separated hex.
pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Contents of the `tt` handshake page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeInfo {
    /// Firmware major version (offset 5).
    pub firmware_major: u8,
    /// Firmware minor version (offset 6).
    pub firmware_minor: u8,
    /// Authentication flag byte (offset 7).
    pub auth_flag: u8,
    /// Connection counter mixed into the password packet (offset 11).
    pub connection_counter: u8,
}

impl HandshakeInfo {
    fn parse(raw: &[u8]) -> Result<Self, DecodeError> {
        if raw.len() < HANDSHAKE_MIN_LEN {
            return Err(DecodeError::Truncated {
                expected: HANDSHAKE_MIN_LEN,
                actual: raw.len(),
            });
        }
        Ok(Self {
            firmware_major: raw[5],
            firmware_minor: raw[6],
            auth_flag: raw[7],
            connection_counter: raw[11],
        })
    }

    /// Returns true if the device expects the password packet.
    ///
    /// Older firmware does not always set the flag, so anything below
    /// major 6 is treated as gated.
    #[must_use]
    pub const fn requires_auth(&self) -> bool {
        self.firmware_major < AUTH_FREE_FIRMWARE_MAJOR || self.auth_flag & AUTH_REQUIRED_FLAG != 0
    }

    /// Firmware version as printed by the vendor app, e.g. `C5.12`.
    #[must_use]
    pub fn firmware_version(&self) -> String {
        format!("C{}.{}", self.firmware_major, self.firmware_minor)
    }
}

/// A validated register page.
#[derive(Clone, PartialEq, Eq)]
pub struct DataPage {
    id: PageId,
    layout: &'static PageLayout,
    bytes: [u8; FRAME_LEN],
}

impl DataPage {
    fn parse(group: RegisterGroup, raw: &[u8]) -> Result<Self, DecodeError> {
        let bytes: [u8; FRAME_LEN] = raw
            .get(..FRAME_LEN)
            .and_then(|r| r.try_into().ok())
            .ok_or(DecodeError::Truncated {
                expected: FRAME_LEN,
                actual: raw.len(),
            })?;

        let id = PageId::new(group, bytes[2]);
        let layout = Catalog::layout(id).ok_or(DecodeError::UnknownPage {
            group,
            number: bytes[2],
        })?;

        let actual = bytes[PageLayout::TERMINATOR_OFFSET];
        if actual != layout.terminator {
            return Err(DecodeError::BadTerminator {
                page: id,
                expected: layout.terminator,
                actual,
            });
        }

        Ok(Self { id, layout, bytes })
    }

    /// Page identifier.
    #[must_use]
    pub const fn id(&self) -> PageId {
        self.id
    }

    /// Layout the page was validated against.
    #[must_use]
    pub const fn layout(&self) -> &'static PageLayout {
        self.layout
    }

    /// Raw bytes.
    #[must_use]
    pub const fn bytes(&self) -> &[u8; FRAME_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for DataPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataPage({}: {})", self.id, hex(&self.bytes))
    }
}

/// A parsed inbound page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    /// Handshake reply.
    Handshake(HandshakeInfo),
    /// Register data.
    Data(DataPage),
    /// Keepalive echo; carries nothing.
    Keepalive,
}

impl Page {
    /// Parses one complete page.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] for short input, unknown headers, unknown
    /// page numbers, and terminator mismatches.
    pub fn parse(raw: &[u8]) -> Result<Self, DecodeError> {
        let [a, b, ..] = *raw else {
            return Err(DecodeError::Truncated {
                expected: 2,
                actual: raw.len(),
            });
        };
        if a != b {
            return Err(DecodeError::UnknownHeader(a, b));
        }
        match a {
            HANDSHAKE_BYTE => HandshakeInfo::parse(raw).map(Self::Handshake),
            KEEPALIVE_BYTE => Ok(Self::Keepalive),
            other => {
                let group = RegisterGroup::from_byte(other).ok_or(DecodeError::UnknownHeader(a, b))?;
                DataPage::parse(group, raw).map(Self::Data)
            }
        }
    }
}

/// Reassembles notification chunks into pages.
///
/// # Examples
///
/// ```
/// use culligan_ble::protocol::{FrameAssembler, Page};
///
/// let mut assembler = FrameAssembler::new();
/// let keepalive = [b'x'; 20];
///
/// assert!(assembler.push(&keepalive[..7]).is_empty());
/// let pages = assembler.push(&keepalive[7..]);
/// assert_eq!(pages, vec![Ok(Page::Keepalive)]);
/// ```
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: BytesMut,
}

impl FrameAssembler {
    /// Creates an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every page it completes.
    ///
    /// An unknown header discards everything buffered so far, since there
    /// is no way to find the next page boundary.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Page, DecodeError>> {
        self.buffer.extend_from_slice(chunk);
        let mut pages = Vec::new();

        while let [a, b, ..] = self.buffer[..] {
            // Every page is a full frame on the wire, the handshake included
            let known = matches!((a, b), (HANDSHAKE_BYTE, HANDSHAKE_BYTE) | (KEEPALIVE_BYTE, KEEPALIVE_BYTE))
                || (a == b && RegisterGroup::from_byte(a).is_some());
            if !known {
                tracing::warn!(
                    header = %hex(&[a, b]),
                    discarded = self.buffer.len(),
                    "Unknown page header, flushing buffer"
                );
                self.buffer.clear();
                pages.push(Err(DecodeError::UnknownHeader(a, b)));
                break;
            }
            if self.buffer.len() < FRAME_LEN {
                break;
            }
            let raw = self.buffer.split_to(FRAME_LEN);
            tracing::trace!(bytes = %hex(&raw), "Assembled page");
            pages.push(Page::parse(&raw));
        }

        pages
    }

    /// Number of buffered bytes not yet forming a page.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drops any partial page.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status0() -> [u8; FRAME_LEN] {
        let mut raw = [0u8; FRAME_LEN];
        raw[0] = b'u';
        raw[1] = b'u';
        raw[2] = 0;
        raw[19] = b'9';
        raw
    }

    fn handshake(major: u8, flag: u8) -> [u8; FRAME_LEN] {
        let mut raw = [b't'; FRAME_LEN];
        raw[5] = major;
        raw[6] = 12;
        raw[7] = flag;
        raw[11] = 0x2A;
        raw
    }

    #[test]
    fn frame_payload_lands_at_offset() {
        let frame = Frame::filled(b'u').with_payload(13, b"RN");
        assert_eq!(frame.as_bytes()[12], b'u');
        assert_eq!(&frame.as_bytes()[13..15], b"RN");
        assert_eq!(frame.as_bytes()[15], b'u');
    }

    #[test]
    fn frame_payload_is_clipped() {
        let frame = Frame::filled(0).with_payload(18, &[1, 2, 3, 4]);
        assert_eq!(&frame.as_bytes()[18..], &[1, 2]);
    }

    #[test]
    fn handshake_fields() {
        let Page::Handshake(info) = Page::parse(&handshake(5, 0)).unwrap() else {
            panic!("expected handshake");
        };
        assert_eq!(info.firmware_version(), "C5.12");
        assert_eq!(info.connection_counter, 0x2A);
        assert!(info.requires_auth());
    }

    #[test]
    fn handshake_auth_rules() {
        let info = |major, flag| match Page::parse(&handshake(major, flag)).unwrap() {
            Page::Handshake(info) => info,
            other => panic!("unexpected {other:?}"),
        };
        assert!(!info(6, 0x00).requires_auth());
        assert!(info(6, 0x80).requires_auth());
        assert!(info(5, 0x00).requires_auth());
    }

    #[test]
    fn data_page_is_validated() {
        let Page::Data(page) = Page::parse(&status0()).unwrap() else {
            panic!("expected data page");
        };
        assert_eq!(page.id(), PageId::STATUS_0);

        let mut bad = status0();
        bad[19] = b'X';
        assert!(matches!(
            Page::parse(&bad),
            Err(DecodeError::BadTerminator { expected: b'9', actual: b'X', .. })
        ));

        let mut unknown = status0();
        unknown[2] = 4;
        assert!(matches!(
            Page::parse(&unknown),
            Err(DecodeError::UnknownPage { number: 4, .. })
        ));
    }

    #[test]
    fn assembler_joins_split_notifications() {
        let raw = status0();
        let mut asm = FrameAssembler::new();
        assert!(asm.push(&raw[..11]).is_empty());
        assert_eq!(asm.pending(), 11);
        let pages = asm.push(&raw[11..]);
        assert_eq!(pages.len(), 1);
        assert!(matches!(pages[0], Ok(Page::Data(_))));
        assert_eq!(asm.pending(), 0);
    }

    #[test]
    fn assembler_splits_merged_notifications() {
        let mut merged = status0().to_vec();
        merged.extend_from_slice(&[b'x'; FRAME_LEN]);
        let pages = FrameAssembler::new().push(&merged);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1], Ok(Page::Keepalive));
    }

    #[test]
    fn handshake_waits_for_the_full_frame() {
        let raw = handshake(6, 0);
        let mut asm = FrameAssembler::new();
        assert!(asm.push(&raw[..FRAME_LEN - 1]).is_empty());

        let mut rest = raw[FRAME_LEN - 1..].to_vec();
        rest.extend_from_slice(&status0());
        let pages = asm.push(&rest);
        assert!(matches!(pages[..], [Ok(Page::Handshake(_)), Ok(Page::Data(_))]));
        assert_eq!(pages[1], Page::parse(&status0()));
        assert_eq!(asm.pending(), 0);
    }

    #[test]
    fn unknown_header_flushes() {
        let mut asm = FrameAssembler::new();
        let pages = asm.push(&[0x01, 0x02, 0x03]);
        assert_eq!(pages, vec![Err(DecodeError::UnknownHeader(0x01, 0x02))]);
        assert_eq!(asm.pending(), 0);
    }
}
