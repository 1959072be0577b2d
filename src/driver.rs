// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
 * The proper-motion correction workflow: load the calibrated dataset, image
 * it whole for reference, split it into time bins, shift each bin's phase
 * center to track the source, recombine the surviving bins and image the
 * result. Bins whose split or shift finds no data are skipped, not fatal.
 */

use thiserror::Error;

use crate::config::Config;
use crate::plan::{BinPlan, PlanError};
use crate::tasks::{CatEntry, TaskEnvironment, TaskError, TaskStatus};
use crate::time::AipsTime;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("{0}")]
    Plan(#[from] PlanError),

    #[error("{0}")]
    Task(#[from] TaskError),

    #[error("Task {0} reported an empty selection; cannot continue")]
    UnexpectedNoData(&'static str),

    #[error("Every time bin was empty; nothing to concatenate or image")]
    AllBinsEmpty,
}

/// Where a bin is in its life. The failed states are terminal; only
/// `Included` bins make it into the combined dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinState {
    Pending,
    SplitOk,
    SplitFailed,
    ShiftOk,
    ShiftFailed,
    Included,
}

/// What a completed run produced.
#[derive(Debug)]
pub struct RunReport {
    pub num_bins: usize,
    /// Bins skipped because their split or shift found no data.
    pub empty_bins: usize,
    /// The terminal state of every bin, in bin order.
    pub bin_states: Vec<BinState>,
    /// The dataset the final image was made from.
    pub combined: CatEntry,
}

/// Run the whole workflow against `env`.
pub fn run<E: TaskEnvironment>(env: &mut E, config: &Config) -> Result<RunReport, DriverError> {
    // Load the calibrated dataset into the workspace.
    let uvdata = CatEntry::new("calData", "UVDATA", 1);
    expect_done("fitld", env.fitld(&config.fitld, &uvdata)?)?;

    // Reference image of the full, unshifted dataset. The full split
    // calibrates with the same gain table splat applies per bin.
    let mut full_split = config.split.clone();
    full_split.gainuse = config.splat.gainuse;
    expect_done(
        "split",
        env.split(&full_split, &config.source_name, &uvdata)?,
    )?;
    let fulldata = CatEntry::new(&config.source_name, "SPLIT", 1);
    expect_done(
        "imagr",
        env.imagr(
            &config.imagr,
            &fulldata,
            &format!("{}_F", config.source_name),
        )?,
    )?;

    let start = config.obs_start.as_days();
    let end = config.obs_end.as_days();
    let plan = BinPlan::new(
        start,
        end,
        config.proper_motion,
        config.imagr.cellsi,
        config.position_angle,
    )?;
    println!("Observation time is {} days", end - start);
    println!("Each time bin is {} days long", plan.bin_time);
    println!("There are {} time bins", plan.num_bins);

    let mut states = vec![BinState::Pending; plan.num_bins];
    let mut empty_bins = 0;
    let mut splats: Vec<CatEntry> = Vec::new();
    let mut included: Vec<CatEntry> = Vec::new();

    for i in 0..plan.num_bins {
        let (tb_start, tb_end) = plan.interval(i);
        let range = (AipsTime::from_days(tb_start), AipsTime::from_days(tb_end));
        let splatdata = CatEntry::new(&config.source_name, "SPLAT", (i + 1) as u32);

        match env.splat(&config.splat, &uvdata, &splatdata, range)? {
            TaskStatus::NoData => {
                bin_error_banner(i, "has no data");
                states[i] = BinState::SplitFailed;
                empty_bins += 1;
                continue;
            }
            TaskStatus::Done => states[i] = BinState::SplitOk,
        }
        splats.push(splatdata.clone());

        let (ra_shift, dec_shift) = plan.shift(i);
        match env.clcor(&config.source_name, &splatdata, ra_shift, dec_shift)? {
            TaskStatus::NoData => {
                bin_error_banner(i, "has no on-source data");
                states[i] = BinState::ShiftFailed;
                empty_bins += 1;
                continue;
            }
            TaskStatus::Done => states[i] = BinState::ShiftOk,
        }

        expect_done(
            "split",
            env.split(&config.split, &config.source_name, &splatdata)?,
        )?;
        // The full-dataset split holds catalog sequence 1, so the nth
        // surviving bin lands at sequence n + 2.
        included.push(CatEntry::new(
            &config.source_name,
            "SPLIT",
            (included.len() + 2) as u32,
        ));
        states[i] = BinState::Included;
    }

    if included.is_empty() {
        return Err(DriverError::AllBinsEmpty);
    }

    // Concatenate the surviving bins pairwise, in bin order.
    let mut combined = included[0].clone();
    let mut intermediates: Vec<CatEntry> = Vec::new();
    for (n, next) in included.iter().enumerate().skip(1) {
        let out = CatEntry::new(&config.source_name, "DBCON", (n + 1) as u32);
        expect_done("dbcon", env.dbcon(&combined, next, &out)?)?;
        if n + 1 < included.len() {
            intermediates.push(out.clone());
        }
        combined = out;
    }

    expect_done(
        "imagr",
        env.imagr(
            &config.imagr,
            &combined,
            &format!("{}_S", config.source_name),
        )?,
    )?;

    if config.cleanup {
        // Delete every intermediate artifact, keeping the combined dataset
        // the final image was made from.
        for entry in splats
            .iter()
            .chain(included.iter())
            .chain(intermediates.iter())
            .filter(|e| **e != combined)
        {
            expect_done("zap", env.zap(entry)?)?;
        }
        expect_done("zap", env.zap(&uvdata)?)?;
    }

    Ok(RunReport {
        num_bins: plan.num_bins,
        empty_bins,
        bin_states: states,
        combined,
    })
}

fn expect_done(task: &'static str, status: TaskStatus) -> Result<(), DriverError> {
    match status {
        TaskStatus::Done => Ok(()),
        TaskStatus::NoData => Err(DriverError::UnexpectedNoData(task)),
    }
}

fn bin_error_banner(bin: usize, what: &str) {
    let msg = format!("ERROR!: Timebin {} {}", bin, what);
    let bar = "-".repeat(msg.len());
    println!("{}", bar);
    println!("{}", msg);
    println!("{}", bar);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FitldParams, ImagrParams, SplatParams, SplitParams};

    /// Records every invocation, reporting NoData for configured SPLAT
    /// sequence numbers.
    #[derive(Default)]
    struct MockEnv {
        /// SPLAT seqs (1-based, bin + 1) whose splat call reports NoData.
        empty_splats: Vec<u32>,
        /// SPLAT seqs whose clcor call reports NoData.
        empty_clcors: Vec<u32>,
        calls: Vec<String>,
        zaps: Vec<CatEntry>,
    }

    impl TaskEnvironment for MockEnv {
        fn fitld(
            &mut self,
            _params: &FitldParams,
            out: &CatEntry,
        ) -> Result<TaskStatus, TaskError> {
            self.calls.push(format!("fitld -> {}", out));
            Ok(TaskStatus::Done)
        }

        fn splat(
            &mut self,
            _params: &SplatParams,
            indata: &CatEntry,
            out: &CatEntry,
            _range: (AipsTime, AipsTime),
        ) -> Result<TaskStatus, TaskError> {
            self.calls.push(format!("splat {} -> {}", indata, out));
            if self.empty_splats.contains(&out.seq) {
                Ok(TaskStatus::NoData)
            } else {
                Ok(TaskStatus::Done)
            }
        }

        fn clcor(
            &mut self,
            _source: &str,
            indata: &CatEntry,
            ra_shift: f64,
            dec_shift: f64,
        ) -> Result<TaskStatus, TaskError> {
            self.calls
                .push(format!("clcor {} by ({}, {})", indata, ra_shift, dec_shift));
            if self.empty_clcors.contains(&indata.seq) {
                Ok(TaskStatus::NoData)
            } else {
                Ok(TaskStatus::Done)
            }
        }

        fn split(
            &mut self,
            _params: &SplitParams,
            _source: &str,
            indata: &CatEntry,
        ) -> Result<TaskStatus, TaskError> {
            self.calls.push(format!("split {}", indata));
            Ok(TaskStatus::Done)
        }

        fn dbcon(
            &mut self,
            indata: &CatEntry,
            in2data: &CatEntry,
            out: &CatEntry,
        ) -> Result<TaskStatus, TaskError> {
            self.calls
                .push(format!("dbcon {} + {} -> {}", indata, in2data, out));
            Ok(TaskStatus::Done)
        }

        fn imagr(
            &mut self,
            _params: &ImagrParams,
            indata: &CatEntry,
            outname: &str,
        ) -> Result<TaskStatus, TaskError> {
            self.calls.push(format!("imagr {} -> {}", indata, outname));
            Ok(TaskStatus::Done)
        }

        fn zap(&mut self, entry: &CatEntry) -> Result<TaskStatus, TaskError> {
            self.calls.push(format!("zap {}", entry));
            self.zaps.push(entry.clone());
            Ok(TaskStatus::Done)
        }
    }

    /// 4 bins: 2 days at 2 mas/day with 1 mas pixels.
    fn test_config() -> Config {
        Config {
            user_no: 42,
            fitld: FitldParams::default(),
            imagr: ImagrParams {
                cellsi: 1.0,
                ..Default::default()
            },
            splat: SplatParams {
                gainuse: 9,
                ..Default::default()
            },
            split: SplitParams {
                gainuse: 10,
                ..Default::default()
            },
            proper_motion: 2.0,
            position_angle: 90.0,
            source_name: "J1023".to_string(),
            obs_start: "0 0 0 0".parse().unwrap(),
            obs_end: "2 0 0 0".parse().unwrap(),
            cleanup: false,
        }
    }

    #[test]
    fn test_happy_path() {
        let mut env = MockEnv::default();
        let report = run(&mut env, &test_config()).unwrap();

        assert_eq!(report.num_bins, 4);
        assert_eq!(report.empty_bins, 0);
        assert!(report.bin_states.iter().all(|s| *s == BinState::Included));
        assert_eq!(report.combined, CatEntry::new("J1023", "DBCON", 4));

        // Pairwise concatenation in bin order, starting from the first
        // surviving SPLIT file (sequence 2).
        let dbcons: Vec<&str> = env
            .calls
            .iter()
            .filter(|c| c.starts_with("dbcon"))
            .map(String::as_str)
            .collect();
        assert_eq!(
            dbcons,
            vec![
                "dbcon J1023.SPLIT.2 + J1023.SPLIT.3 -> J1023.DBCON.2",
                "dbcon J1023.DBCON.2 + J1023.SPLIT.4 -> J1023.DBCON.3",
                "dbcon J1023.DBCON.3 + J1023.SPLIT.5 -> J1023.DBCON.4",
            ]
        );

        // Reference image first, shifted image last.
        assert!(env.calls.contains(&"imagr J1023.SPLIT.1 -> J1023_F".to_string()));
        assert_eq!(
            env.calls.last().map(String::as_str),
            Some("imagr J1023.DBCON.4 -> J1023_S")
        );

        // cleanup = false: nothing deleted.
        assert!(env.zaps.is_empty());
    }

    #[test]
    fn test_empty_splat_bin_is_skipped() {
        let mut env = MockEnv {
            empty_splats: vec![2], // bin 1
            ..Default::default()
        };
        let report = run(&mut env, &test_config()).unwrap();

        assert_eq!(report.empty_bins, 1);
        assert_eq!(report.bin_states[1], BinState::SplitFailed);
        assert_eq!(report.bin_states[0], BinState::Included);

        // The skipped bin must not be shifted or split.
        assert!(!env.calls.iter().any(|c| c.contains("clcor J1023.SPLAT.2")));
        assert!(!env.calls.iter().any(|c| c.contains("split J1023.SPLAT.2")));

        // Three survivors: SPLIT sequences stay contiguous (2, 3, 4) and the
        // combined dataset is DBCON 3.
        assert_eq!(report.combined, CatEntry::new("J1023", "DBCON", 3));
        assert!(env
            .calls
            .contains(&"dbcon J1023.SPLIT.2 + J1023.SPLIT.3 -> J1023.DBCON.2".to_string()));
        assert!(env
            .calls
            .contains(&"dbcon J1023.DBCON.2 + J1023.SPLIT.4 -> J1023.DBCON.3".to_string()));
    }

    #[test]
    fn test_empty_clcor_bin_is_skipped() {
        let mut env = MockEnv {
            empty_clcors: vec![3], // bin 2
            ..Default::default()
        };
        let report = run(&mut env, &test_config()).unwrap();

        assert_eq!(report.empty_bins, 1);
        assert_eq!(report.bin_states[2], BinState::ShiftFailed);
        assert!(!env.calls.iter().any(|c| c.contains("split J1023.SPLAT.3")));
        assert_eq!(report.combined, CatEntry::new("J1023", "DBCON", 3));
    }

    #[test]
    fn test_all_bins_empty_is_fatal() {
        let mut env = MockEnv {
            empty_splats: vec![1, 2, 3, 4],
            ..Default::default()
        };
        let result = run(&mut env, &test_config());
        assert!(matches!(result, Err(DriverError::AllBinsEmpty)));
    }

    #[test]
    fn test_single_bin_skips_concatenation() {
        let mut config = test_config();
        config.proper_motion = 0.0; // one bin
        let mut env = MockEnv::default();
        let report = run(&mut env, &config).unwrap();

        assert_eq!(report.num_bins, 1);
        assert!(!env.calls.iter().any(|c| c.starts_with("dbcon")));
        // The final image comes straight from the lone SPLIT file.
        assert_eq!(report.combined, CatEntry::new("J1023", "SPLIT", 2));
        assert_eq!(
            env.calls.last().map(String::as_str),
            Some("imagr J1023.SPLIT.2 -> J1023_S")
        );
    }

    #[test]
    fn test_cleanup_zaps_intermediates_but_not_combined() {
        let mut config = test_config();
        config.cleanup = true;
        let mut env = MockEnv {
            empty_splats: vec![2],
            ..Default::default()
        };
        let report = run(&mut env, &config).unwrap();

        // SPLAT files exist for bins 0, 2, 3; per-bin SPLITs at 2, 3, 4; one
        // intermediate DBCON (2); plus the loaded dataset.
        assert!(env.zaps.contains(&CatEntry::new("J1023", "SPLAT", 1)));
        assert!(env.zaps.contains(&CatEntry::new("J1023", "SPLAT", 3)));
        assert!(env.zaps.contains(&CatEntry::new("J1023", "SPLAT", 4)));
        assert!(!env.zaps.contains(&CatEntry::new("J1023", "SPLAT", 2)));
        assert!(env.zaps.contains(&CatEntry::new("J1023", "SPLIT", 2)));
        assert!(env.zaps.contains(&CatEntry::new("J1023", "SPLIT", 3)));
        assert!(env.zaps.contains(&CatEntry::new("J1023", "SPLIT", 4)));
        assert!(env.zaps.contains(&CatEntry::new("J1023", "DBCON", 2)));
        assert!(env.zaps.contains(&CatEntry::new("calData", "UVDATA", 1)));
        assert!(!env.zaps.contains(&report.combined));
    }
}
