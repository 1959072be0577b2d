// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

pub mod config;
pub mod driver;
pub mod plan;
pub mod tasks;
pub mod time;

/// The number of seconds in a day.
pub const SECONDS_PER_DAY: f64 = 86400.0;
