// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
 * Conversions between fractional days and the day/hour/minute/second
 * quadruple the reduction environment expects in its time ranges.
 */

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::SECONDS_PER_DAY;

#[derive(Error, Debug)]
pub enum TimeError {
    #[error("Expected 4 space-separated fields (day hour min sec), got {0}")]
    WrongFieldCount(usize),

    #[error("Couldn't parse '{0}' as a number")]
    BadNumber(String),
}

/// A point in time relative to the observation's reference day: whole days,
/// hours and minutes, plus fractional seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AipsTime {
    pub day: i32,
    pub hour: i32,
    pub minute: i32,
    pub second: f64,
}

impl AipsTime {
    /// Decompose a fractional-day count. The seconds field is rounded to 10
    /// decimal places.
    pub fn from_days(days: f64) -> Self {
        let day = days.trunc();
        let rem = days - day;
        let hour = (rem * 24.0).trunc();
        let minute = ((rem - hour / 24.0) * 1440.0).trunc();
        let second = (rem - hour / 24.0 - minute / 1440.0) * SECONDS_PER_DAY;
        Self {
            day: day as i32,
            hour: hour as i32,
            minute: minute as i32,
            second: round10(second),
        }
    }

    /// Reconstruct the fractional-day count.
    pub fn as_days(self) -> f64 {
        self.day as f64
            + self.hour as f64 / 24.0
            + self.minute as f64 / 1440.0
            + self.second / SECONDS_PER_DAY
    }

    /// The four components in the order the environment's time ranges use
    /// them.
    pub fn fields(self) -> [f64; 4] {
        [
            self.day as f64,
            self.hour as f64,
            self.minute as f64,
            self.second,
        ]
    }
}

impl FromStr for AipsTime {
    type Err = TimeError;

    /// Parse the input file's space-separated `day hour min sec` form.
    /// Fractional values are tolerated in any field.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        if fields.len() != 4 {
            return Err(TimeError::WrongFieldCount(fields.len()));
        }
        let mut parsed = [0.0; 4];
        for (p, f) in parsed.iter_mut().zip(fields.iter()) {
            *p = f
                .parse()
                .map_err(|_| TimeError::BadNumber(f.to_string()))?;
        }
        let days =
            parsed[0] + parsed[1] / 24.0 + parsed[2] / 1440.0 + parsed[3] / SECONDS_PER_DAY;
        Ok(Self::from_days(days))
    }
}

impl fmt::Display for AipsTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.day, self.hour, self.minute, self.second)
    }
}

/// Round to 10 decimal places; the precision the environment's parameter
/// fields keep.
pub(crate) fn round10(v: f64) -> f64 {
    (v * 1e10).round() / 1e10
}
