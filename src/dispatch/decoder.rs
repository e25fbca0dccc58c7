// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Page decoding.

use crate::error::DecodeError;
use crate::protocol::DataPage;
use crate::register::{Catalog, PageId, RegisterId, RegisterValue};
use crate::types::brine::{self, TankType};

/// Offsets of the brine fields on `uu-1`.
const REGENS_OFFSET: usize = 13;
const TANK_TYPE_OFFSET: usize = 15;
const FILL_HEIGHT_OFFSET: usize = 16;
const REFILL_TIME_OFFSET: usize = 17;

/// Values and errors decoded from one page.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPage {
    /// The page the values came from.
    pub page: PageId,
    /// Values that passed their bounds check, in layout order.
    pub values: Vec<(RegisterId, RegisterValue)>,
    /// Fields that failed to decode or fell outside their bounds.
    pub errors: Vec<DecodeError>,
}

impl DecodedPage {
    /// Returns the decoded value of a register, if the page carried one.
    #[must_use]
    pub fn value(&self, register: RegisterId) -> Option<&RegisterValue> {
        self.values
            .iter()
            .find(|(id, _)| *id == register)
            .map(|(_, value)| value)
    }

    fn push(&mut self, register: RegisterId, value: RegisterValue) {
        match Catalog::get(register).check_decoded(&value) {
            Ok(()) => self.values.push((register, value)),
            Err(error) => self.errors.push(error),
        }
    }
}

/// Decodes every field of a validated page.
///
/// A field that fails its bounds check is reported and skipped; the rest
/// of the page still decodes. The brine page also yields the derived salt
/// values.
///
/// # Examples
///
/// ```
/// use culligan_ble::dispatch::decode_page;
/// use culligan_ble::protocol::Page;
/// use culligan_ble::register::{RegisterId, RegisterValue};
///
/// let mut raw = [0u8; 20];
/// raw[..3].copy_from_slice(b"ww\x00");
/// raw[5..8].copy_from_slice(&[0x01, 0x86, 0xA0]);
/// raw[19] = b'F';
///
/// let Ok(Page::Data(page)) = Page::parse(&raw) else { panic!() };
/// let decoded = decode_page(&page);
/// assert_eq!(decoded.value(RegisterId::TotalGallons), Some(&RegisterValue::Integer(100_000)));
/// ```
#[must_use]
pub fn decode_page(page: &DataPage) -> DecodedPage {
    let bytes = page.bytes();
    let mut decoded = DecodedPage {
        page: page.id(),
        values: Vec::with_capacity(page.layout().fields.len() + 3),
        errors: Vec::new(),
    };

    for field in page.layout().fields {
        match bytes.get(field.offset..).and_then(|raw| field.codec.decode(raw)) {
            Some(value) => decoded.push(field.register, value),
            None => decoded.errors.push(DecodeError::Truncated {
                expected: field.offset + field.codec.width(),
                actual: bytes.len(),
            }),
        }
    }

    if page.id() == PageId::STATUS_1 {
        derive_brine(bytes, &mut decoded);
    }

    decoded
}

/// Salt level, tank capacity and fill percentage from the raw `uu-1` bytes.
fn derive_brine(bytes: &[u8], decoded: &mut DecodedPage) {
    let regens = bytes[REGENS_OFFSET];
    let tank = TankType::from_raw(bytes[TANK_TYPE_OFFSET]);
    let fill_height = bytes[FILL_HEIGHT_OFFSET];
    let refill = bytes[REFILL_TIME_OFFSET];

    let capacity = tank.capacity(fill_height);
    decoded.push(RegisterId::BrineTankCapacity, RegisterValue::Decimal(capacity));

    let Some(salt) = brine::salt_remaining(refill, regens) else {
        tracing::debug!("Brine tank not configured");
        return;
    };
    decoded.push(RegisterId::SaltLevel, RegisterValue::Decimal(salt));

    if capacity > 0.0 {
        let percent = (salt / capacity * 100.0).clamp(0.0, 100.0);
        decoded.push(RegisterId::BrineSaltPercent, RegisterValue::Decimal(percent));
    }
}
