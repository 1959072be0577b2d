// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
 * Time-bin planning. An observation of a moving source is carved into bins
 * short enough that the source crosses at most one image pixel per bin, and
 * each bin is assigned the phase-center shift that holds the source at the
 * position it had in the first bin.
 */

use thiserror::Error;

use crate::time::round10;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Observation duration must be positive; got {0} days")]
    NonPositiveDuration(f64),

    #[error("Pixel scale must be positive; got {0} mas")]
    NonPositivePixelScale(f64),

    #[error("Proper motion must be non-negative; got {0} mas/day (direction is set by the position angle)")]
    NegativeProperMotion(f64),
}

#[derive(Clone, Debug)]
pub struct BinPlan {
    /// Observation start [days].
    pub start: f64,
    /// The length of each bin [days].
    pub bin_time: f64,
    /// The number of contiguous bins covering the observation.
    pub num_bins: usize,
    /// Source proper motion [mas/day].
    proper_motion: f64,
    /// Direction of motion, east of north [radians].
    pos_angle_rad: f64,
}

impl BinPlan {
    /// Plan bins over `[start, end]` (fractional days) such that the source
    /// moves no more than `pixel_scale` mas within any bin.
    ///
    /// A proper motion of zero yields a single bin: a stationary source
    /// needs no tracking.
    pub fn new(
        start: f64,
        end: f64,
        proper_motion: f64,
        pixel_scale: f64,
        position_angle_deg: f64,
    ) -> Result<Self, PlanError> {
        let duration = end - start;
        if duration <= 0.0 {
            return Err(PlanError::NonPositiveDuration(duration));
        }
        if pixel_scale <= 0.0 {
            return Err(PlanError::NonPositivePixelScale(pixel_scale));
        }
        if proper_motion < 0.0 {
            return Err(PlanError::NegativeProperMotion(proper_motion));
        }

        let num_bins = ((proper_motion * duration / pixel_scale).ceil() as usize).max(1);
        Ok(Self {
            start,
            bin_time: duration / num_bins as f64,
            num_bins,
            proper_motion,
            pos_angle_rad: position_angle_deg.to_radians(),
        })
    }

    /// The half-open time range `[start, end)` of bin `i`, in fractional
    /// days.
    pub fn interval(&self, i: usize) -> (f64, f64) {
        (
            self.start + i as f64 * self.bin_time,
            self.start + (i + 1) as f64 * self.bin_time,
        )
    }

    /// All bin intervals, in order.
    pub fn intervals(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        (0..self.num_bins).map(move |i| self.interval(i))
    }

    /// The (RA, Dec) phase-center shift for bin `i` in mas, rounded to 10
    /// decimal places. Bin 0 always has zero shift.
    pub fn shift(&self, i: usize) -> (f64, f64) {
        let ang_sep = i as f64 * self.bin_time * self.proper_motion;
        (
            round10(-ang_sep * self.pos_angle_rad.sin()),
            round10(-ang_sep * self.pos_angle_rad.cos()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_two_day_scenario() {
        // 2 days at 5 mas/day with 0.2 mas pixels: 50 bins of 0.04 days.
        let plan = BinPlan::new(0.0, 2.0, 5.0, 0.2, 0.0).unwrap();
        assert_eq!(plan.num_bins, 50);
        assert_abs_diff_eq!(plan.bin_time, 0.04, epsilon = 1e-12);
    }

    #[test]
    fn test_motion_per_bin_never_exceeds_one_pixel() {
        for &(duration, pm, cell) in &[
            (2.0, 5.0, 0.2),
            (0.5, 1.3, 0.07),
            (10.0, 0.001, 0.5),
            (1.0, 100.0, 0.1),
            (3.7, 2.5, 1.0),
        ] {
            let plan = BinPlan::new(0.0, duration, pm, cell, 45.0).unwrap();
            assert!(plan.num_bins >= 1);
            assert!(
                pm * plan.bin_time <= cell + 1e-12,
                "pm={} bin_time={} cell={}",
                pm,
                plan.bin_time,
                cell
            );
        }
    }

    #[test]
    fn test_zero_proper_motion_clamps_to_one_bin() {
        let plan = BinPlan::new(1.0, 3.0, 0.0, 0.2, 30.0).unwrap();
        assert_eq!(plan.num_bins, 1);
        assert_abs_diff_eq!(plan.bin_time, 2.0);
        let (ra, dec) = plan.shift(0);
        assert_abs_diff_eq!(ra, 0.0);
        assert_abs_diff_eq!(dec, 0.0);
    }

    #[test]
    fn test_degenerate_inputs_are_errors() {
        assert!(matches!(
            BinPlan::new(1.0, 1.0, 5.0, 0.2, 0.0),
            Err(PlanError::NonPositiveDuration(_))
        ));
        assert!(matches!(
            BinPlan::new(2.0, 1.0, 5.0, 0.2, 0.0),
            Err(PlanError::NonPositiveDuration(_))
        ));
        assert!(matches!(
            BinPlan::new(0.0, 1.0, 5.0, 0.0, 0.0),
            Err(PlanError::NonPositivePixelScale(_))
        ));
        assert!(matches!(
            BinPlan::new(0.0, 1.0, -5.0, 0.2, 0.0),
            Err(PlanError::NegativeProperMotion(_))
        ));
    }

    #[test]
    fn test_intervals_cover_observation() {
        let plan = BinPlan::new(0.25, 2.25, 5.0, 0.2, 0.0).unwrap();
        let intervals: Vec<_> = plan.intervals().collect();
        assert_eq!(intervals.len(), plan.num_bins);
        assert_abs_diff_eq!(intervals[0].0, 0.25);
        assert_abs_diff_eq!(intervals.last().unwrap().1, 2.25, epsilon = 1e-12);
        for w in intervals.windows(2) {
            assert_abs_diff_eq!(w[0].1, w[1].0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_shift_at_position_angle_90() {
        // Motion due east: all of the shift lands in RA, none in Dec.
        let plan = BinPlan::new(0.0, 3.0, 1.0, 1.0, 90.0).unwrap();
        assert_eq!(plan.num_bins, 3);
        assert_abs_diff_eq!(plan.bin_time, 1.0);
        let (ra, dec) = plan.shift(2);
        assert_abs_diff_eq!(ra, -2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(dec, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_shift_at_position_angle_0() {
        // Motion due north: all of the shift lands in Dec.
        let plan = BinPlan::new(0.0, 2.0, 2.0, 1.0, 0.0).unwrap();
        let (ra, dec) = plan.shift(1);
        assert_abs_diff_eq!(ra, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(dec, -1.0, epsilon = 1e-9);
    }
}
