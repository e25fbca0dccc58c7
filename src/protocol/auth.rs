// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Password exchange.
//!
//! After the handshake the client sends one `ttPA` packet. The four PIN
//! digits are XOR-chained through a seeded CRC8 whose polynomial and seed
//! are chosen at random and sent along in the clear. The connection
//! counter from the handshake is mixed in so the packet cannot be replayed
//! on a later connection.
//!
//! | Offset | Content |
//! |--------|---------|
//! | 0-1 | `tt` |
//! | 2-3 | `PA` |
//! | 4 | CRC8 polynomial |
//! | 5 | CRC8 seed |
//! | 6 | random XOR seed |
//! | 7-10 | chained PIN digits, thousands first |
//! | 11-19 | random filler |

use rand::Rng;

use crate::types::Password;

use super::frame::{FRAME_LEN, Frame, HANDSHAKE_BYTE};

/// Polynomials the device accepts for the password CRC.
pub const ALLOWED_POLYNOMIALS: [u8; 64] = [
    0x1E, 0x1D, 0x2D, 0x2E, 0x35, 0x36, 0x39, 0x3A, 0x3C, 0x47, 0x4B, 0x4D, 0x4E, 0x53, 0x55, 0x56,
    0x59, 0x5A, 0x5C, 0x63, 0x65, 0x66, 0x69, 0x6A, 0x6C, 0x71, 0x72, 0x74, 0x78, 0x87, 0x8B, 0x8D,
    0x8E, 0x93, 0x95, 0x96, 0x99, 0x9A, 0x9C, 0xA3, 0xA5, 0xA6, 0xA9, 0xAA, 0xAC, 0xB1, 0xB2, 0xB4,
    0xB8, 0xC3, 0xC5, 0xC6, 0xC9, 0xCA, 0xCC, 0xD1, 0xD2, 0xD4, 0xD8, 0xE1, 0xE2, 0xE4, 0xE8, 0xF0,
];

const MARKER: [u8; 2] = [b'P', b'A'];
const POLYNOMIAL_OFFSET: usize = 4;
const SEED_OFFSET: usize = 5;
const XOR_OFFSET: usize = 6;
const DIGITS_OFFSET: usize = 7;
const FILLER_OFFSET: usize = 11;

/// Stateful CRC8 used by the vendor's password scheme.
///
/// Each call feeds one byte and leaves the result as the seed for the next
/// call, which is what chains the PIN digits together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsCrc8 {
    polynomial: u8,
    seed: u8,
}

impl CsCrc8 {
    /// Creates a CRC with the given polynomial and seed.
    #[must_use]
    pub const fn new(polynomial: u8, seed: u8) -> Self {
        Self { polynomial, seed }
    }

    /// Shifts one byte through the register, legacy bit order.
    pub fn compute_legacy(&mut self, value: u8) -> u8 {
        let mut input = value;
        let mut reg = self.seed;
        for _ in 0..8 {
            let carry = reg & 0x80 != 0;
            reg <<= 1;
            if input & 0x80 != 0 {
                reg |= 1;
            }
            input <<= 1;
            if carry {
                reg ^= self.polynomial;
            }
        }
        self.seed = reg;
        reg
    }
}

impl Default for CsCrc8 {
    fn default() -> Self {
        Self::new(213, 0)
    }
}

/// Builds the password packet for one connection.
///
/// # Examples
///
/// ```
/// use culligan_ble::protocol::auth;
/// use culligan_ble::types::Password;
/// use rand::SeedableRng;
/// use rand::rngs::StdRng;
///
/// let mut rng = StdRng::seed_from_u64(7);
/// let pin = Password::new(4821).unwrap();
/// let frame = auth::build_packet(pin, 0x2A, &mut rng);
///
/// assert_eq!(&frame.as_bytes()[..4], b"ttPA");
/// assert_eq!(auth::recover_password(&frame, 0x2A), Some(pin));
/// ```
pub fn build_packet<R: Rng + ?Sized>(password: Password, counter: u8, rng: &mut R) -> Frame {
    let polynomial = ALLOWED_POLYNOMIALS[rng.gen_range(0..ALLOWED_POLYNOMIALS.len())];
    let seed = nonzero_byte(rng);
    let xored = nonzero_byte(rng) ^ seed;

    let mut crc = CsCrc8::new(polynomial, seed);
    let mask = crc.compute_legacy(xored);
    let mut chained = crc.compute_legacy(counter ^ mask);

    let mut buf = [HANDSHAKE_BYTE; FRAME_LEN];
    buf[2..4].copy_from_slice(&MARKER);
    buf[POLYNOMIAL_OFFSET] = polynomial;
    buf[SEED_OFFSET] = seed;
    buf[XOR_OFFSET] = xored;

    for (i, digit) in password.digits().into_iter().enumerate() {
        let encoded = chained ^ digit;
        buf[DIGITS_OFFSET + i] = encoded;
        chained = crc.compute_legacy(encoded);
    }

    for slot in &mut buf[FILLER_OFFSET..] {
        *slot = nonzero_byte(rng);
    }

    Frame::from(buf)
}

/// Recovers the PIN from a password packet.
///
/// Returns `None` if the frame is not a password packet or the digits do
/// not decode to a valid PIN.
#[must_use]
pub fn recover_password(frame: &Frame, counter: u8) -> Option<Password> {
    let buf = frame.as_bytes();
    if buf[..2] != [HANDSHAKE_BYTE; 2] || buf[2..4] != MARKER {
        return None;
    }

    let mut crc = CsCrc8::new(buf[POLYNOMIAL_OFFSET], buf[SEED_OFFSET]);
    let mask = crc.compute_legacy(buf[XOR_OFFSET]);
    let mut chained = crc.compute_legacy(counter ^ mask);

    let mut digits = [0u8; 4];
    for (i, digit) in digits.iter_mut().enumerate() {
        let encoded = buf[DIGITS_OFFSET + i];
        *digit = encoded ^ chained;
        chained = crc.compute_legacy(encoded);
    }
    Password::from_digits(digits).ok()
}

fn nonzero_byte<R: Rng + ?Sized>(rng: &mut R) -> u8 {
    rng.gen_range(1..=254)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn crc_chains_through_seed() {
        let mut crc = CsCrc8::new(0x1D, 0);
        // Zero seed and zero input shift nothing in
        assert_eq!(crc.compute_legacy(0x00), 0x00);

        // 0x80 carries once on the first shift: seed 0x01 then seven more
        // shifts without carry gives 0x80
        let mut crc = CsCrc8::new(0x1D, 0);
        assert_eq!(crc.compute_legacy(0x80), 0x80);
        // The next call starts from 0x80, so the polynomial kicks in
        assert_eq!(crc.compute_legacy(0x00), 0x26);
    }

    #[test]
    fn default_options() {
        assert_eq!(CsCrc8::default(), CsCrc8::new(213, 0));
    }

    #[test]
    fn packet_layout() {
        let mut rng = StdRng::seed_from_u64(1);
        let frame = build_packet(Password::DEFAULT, 3, &mut rng);
        let buf = frame.as_bytes();

        assert_eq!(&buf[..4], b"ttPA");
        assert!(ALLOWED_POLYNOMIALS.contains(&buf[POLYNOMIAL_OFFSET]));
        assert_ne!(buf[SEED_OFFSET], 0);
        assert_ne!(buf[SEED_OFFSET], 0xFF);
        assert!(buf[FILLER_OFFSET..].iter().all(|b| *b != 0 && *b != 0xFF));
    }

    #[test]
    fn every_pin_decodes_back() {
        let mut rng = StdRng::seed_from_u64(99);
        for value in [0, 7, 42, 1234, 5000, 9999] {
            let pin = Password::new(value).unwrap();
            for counter in [0u8, 1, 0x7F, 0xFF] {
                let frame = build_packet(pin, counter, &mut rng);
                assert_eq!(recover_password(&frame, counter), Some(pin));
            }
        }
    }

    #[test]
    fn packets_differ_between_connections() {
        let mut rng = StdRng::seed_from_u64(5);
        let a = build_packet(Password::DEFAULT, 9, &mut rng);
        let b = build_packet(Password::DEFAULT, 9, &mut rng);
        assert_ne!(a, b);
    }

    #[test]
    fn non_auth_frames_are_ignored() {
        assert_eq!(recover_password(&Frame::filled(b't'), 0), None);
    }
}
