// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Twelve hour wall clock used by the control head.
//!
//! The device keeps its clock and its regeneration schedule as an hour in
//! 1-12 plus an AM/PM byte. This module converts between that layout and
//! chrono's 24 hour time.

use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveTime, Timelike};

use crate::error::ValueError;

/// Time of day as shown on the control head.
///
/// # Examples
///
/// ```
/// use chrono::NaiveTime;
/// use culligan_ble::types::ClockTime;
///
/// let t = ClockTime::from_time(&NaiveTime::from_hms_opt(0, 5, 9).unwrap());
/// assert_eq!(t.hour(), 12);
/// assert!(!t.is_pm());
/// assert_eq!(t.to_string(), "12:05 AM");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClockTime {
    hour: u8,
    minute: u8,
    second: u8,
    pm: bool,
}

impl ClockTime {
    /// Creates a clock time from its twelve hour parts.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if the hour is outside 1-12 or the
    /// minute or second is above 59.
    pub fn new(hour: u8, minute: u8, second: u8, pm: bool) -> Result<Self, ValueError> {
        check_range(hour, 1, 12)?;
        check_range(minute, 0, 59)?;
        check_range(second, 0, 59)?;
        Ok(Self {
            hour,
            minute,
            second,
            pm,
        })
    }

    /// Converts any chrono time to the twelve hour layout.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_time<T: Timelike>(time: &T) -> Self {
        let (pm, hour) = time.hour12();
        // hour12 is 1-12, minute and second are 0-59
        Self {
            hour: hour as u8,
            minute: time.minute() as u8,
            second: time.second().min(59) as u8,
            pm,
        }
    }

    /// Reads the host's local wall clock.
    #[must_use]
    pub fn now() -> Self {
        Self::from_time(&Local::now())
    }

    /// Hour on the twelve hour dial (1-12).
    #[must_use]
    pub const fn hour(&self) -> u8 {
        self.hour
    }

    /// Minute (0-59).
    #[must_use]
    pub const fn minute(&self) -> u8 {
        self.minute
    }

    /// Second (0-59).
    #[must_use]
    pub const fn second(&self) -> u8 {
        self.second
    }

    /// Returns true for afternoon times.
    #[must_use]
    pub const fn is_pm(&self) -> bool {
        self.pm
    }

    /// Converts back to a 24 hour time.
    #[must_use]
    pub fn to_naive(&self) -> Option<NaiveTime> {
        let hour24 = match (self.hour, self.pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, false) => h,
            (h, true) => h + 12,
        };
        NaiveTime::from_hms_opt(
            u32::from(hour24),
            u32::from(self.minute),
            u32::from(self.second),
        )
    }
}

/// Formats an hour/minute pair the way the device display does.
#[must_use]
pub fn format_12h(hour: u8, minute: u8, pm: bool) -> String {
    format!("{hour}:{minute:02} {}", if pm { "PM" } else { "AM" })
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_12h(self.hour, self.minute, self.pm))
    }
}

impl FromStr for ClockTime {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValueError::InvalidConfiguration(format!("invalid clock time: {s}"));

        let (time, meridiem) = s.trim().split_once(' ').ok_or_else(invalid)?;
        let pm = match meridiem {
            "AM" => false,
            "PM" => true,
            _ => return Err(invalid()),
        };
        let (hour, minute) = time.split_once(':').ok_or_else(invalid)?;
        let hour = hour.parse::<u8>().map_err(|_| invalid())?;
        let minute = minute.parse::<u8>().map_err(|_| invalid())?;
        Self::new(hour, minute, 0, pm)
    }
}

fn check_range(value: u8, min: u8, max: u8) -> Result<(), ValueError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValueError::OutOfRange {
            min: u32::from(min),
            max: u32::from(max),
            actual: u32::from(value),
        })
    }
}
