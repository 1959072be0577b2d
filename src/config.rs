// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
 * Parsing of the input parameter file.
 *
 * The format is line oriented: `#` starts a comment, blank lines are
 * skipped, `task;key=value` sets a task-scoped parameter and `key=value`
 * sets a global one. Unrecognized keys and task names are silently ignored;
 * malformed numeric values are fatal. Every recognized assignment is echoed
 * to stdout for audit.
 */

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::time::{AipsTime, TimeError};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: couldn't parse '{value}' as {wanted} for {key}")]
    BadValue {
        line: usize,
        key: String,
        value: String,
        wanted: &'static str,
    },

    #[error("Line {line}: bad time '{value}' for {key}: {source}")]
    BadTime {
        line: usize,
        key: String,
        value: String,
        source: TimeError,
    },

    #[error("Missing required parameter {0}")]
    Missing(&'static str),
}

/// Parameters for loading the calibrated dataset into the workspace.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FitldParams {
    /// Path to the calibrated dataset on disk.
    pub datain: PathBuf,
}

/// Parameters for the imaging task.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImagrParams {
    /// Imaging robustness (weighting).
    pub robust: i32,
    /// Maximum number of clean iterations.
    pub niter: i32,
    /// Pixel scale [mas/pixel]. Also sets the per-bin motion limit.
    pub cellsi: f64,
    /// Output image size [pixels].
    pub imsi: i32,
    /// Path to a clean-box file, if any.
    pub boxfile: PathBuf,
    /// RA shift applied at imaging time [mas].
    pub rashift: f64,
    /// Dec shift applied at imaging time [mas].
    pub decshift: f64,
    /// Stop cleaning at this flux limit [Jy].
    pub flux: f64,
}

/// Parameters for the calibrated time-range split.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SplatParams {
    pub docal: i32,
    pub gainuse: i32,
    pub flagver: i32,
    pub doband: i32,
    pub bpver: i32,
}

/// Parameters for the single-source split.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SplitParams {
    pub docal: i32,
    pub gainuse: i32,
    pub flagver: i32,
    pub doband: i32,
    /// Averaging control (pair).
    pub aparm: [i32; 2],
    /// Number of channels to average.
    pub nchav: i32,
    /// Channel increment.
    pub chinc: i32,
}

/// Everything the workflow needs, parsed from the input parameter file.
#[derive(Clone, Debug)]
pub struct Config {
    /// Workspace user number in the reduction environment.
    pub user_no: i32,
    pub fitld: FitldParams,
    pub imagr: ImagrParams,
    pub splat: SplatParams,
    pub split: SplitParams,
    /// Source proper motion [mas/day].
    pub proper_motion: f64,
    /// Direction of the source's motion, east of north [degrees].
    pub position_angle: f64,
    /// The source to split out and image.
    pub source_name: String,
    pub obs_start: AipsTime,
    pub obs_end: AipsTime,
    /// Delete intermediate per-bin artifacts after the final image.
    pub cleanup: bool,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        contents.parse()
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(contents: &str) -> Result<Self, Self::Err> {
        let mut b = Builder::default();
        for (n, raw) in contents.lines().enumerate() {
            let line_no = n + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut segments = line.splitn(2, ';');
            let first = segments.next().unwrap();
            match segments.next() {
                // `task;key=value`
                Some(rest) => {
                    if let Some((key, value)) = split_assignment(rest) {
                        b.apply_task(line_no, first.trim(), key, value)?;
                    }
                }
                // `key=value`
                None => {
                    if let Some((key, value)) = split_assignment(first) {
                        b.apply_global(line_no, key, value)?;
                    }
                }
            }
        }
        b.finish()
    }
}

/// Split a `key=value` segment. Segments without a `=` carry no assignment
/// and are ignored.
fn split_assignment(segment: &str) -> Option<(&str, &str)> {
    let mut parts = segment.splitn(2, '=');
    let key = parts.next().unwrap().trim();
    let value = parts.next()?.trim();
    Some((key, value))
}

fn parse_num<T: FromStr>(
    line: usize,
    key: &str,
    value: &str,
    wanted: &'static str,
) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::BadValue {
        line,
        key: key.to_string(),
        value: value.to_string(),
        wanted,
    })
}

fn parse_int_pair(line: usize, key: &str, value: &str) -> Result<[i32; 2], ConfigError> {
    let bad = || ConfigError::BadValue {
        line,
        key: key.to_string(),
        value: value.to_string(),
        wanted: "a comma-separated integer pair",
    };
    let mut parts = value.split(',');
    let a = parts.next().ok_or_else(bad)?.trim();
    let b = parts.next().ok_or_else(bad)?.trim();
    if parts.next().is_some() {
        return Err(bad());
    }
    Ok([
        a.parse().map_err(|_| bad())?,
        b.parse().map_err(|_| bad())?,
    ])
}

#[derive(Default)]
struct Builder {
    user_no: i32,
    fitld: FitldParams,
    imagr: ImagrParams,
    splat: SplatParams,
    split: SplitParams,
    proper_motion: Option<f64>,
    position_angle: Option<f64>,
    source_name: Option<String>,
    obs_start: Option<AipsTime>,
    obs_end: Option<AipsTime>,
    cleanup: bool,
}

impl Builder {
    fn apply_task(
        &mut self,
        line: usize,
        task: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        match (task, key) {
            ("fitld", "datain") => self.fitld.datain = PathBuf::from(value),

            ("imagr", "robust") => self.imagr.robust = parse_num(line, key, value, "an integer")?,
            ("imagr", "niter") => self.imagr.niter = parse_num(line, key, value, "an integer")?,
            ("imagr", "cellsi") => self.imagr.cellsi = parse_num(line, key, value, "a float")?,
            ("imagr", "imsi") => self.imagr.imsi = parse_num(line, key, value, "an integer")?,
            ("imagr", "boxfile") => self.imagr.boxfile = PathBuf::from(value),
            ("imagr", "rashift") => self.imagr.rashift = parse_num(line, key, value, "a float")?,
            ("imagr", "decshift") => self.imagr.decshift = parse_num(line, key, value, "a float")?,
            ("imagr", "flux") => self.imagr.flux = parse_num(line, key, value, "a float")?,

            ("splat", "docal") => self.splat.docal = parse_num(line, key, value, "an integer")?,
            ("splat", "gainuse") => self.splat.gainuse = parse_num(line, key, value, "an integer")?,
            ("splat", "flagver") => self.splat.flagver = parse_num(line, key, value, "an integer")?,
            ("splat", "doband") => self.splat.doband = parse_num(line, key, value, "an integer")?,
            ("splat", "bpver") => self.splat.bpver = parse_num(line, key, value, "an integer")?,

            ("split", "docal") => self.split.docal = parse_num(line, key, value, "an integer")?,
            ("split", "gainuse") => self.split.gainuse = parse_num(line, key, value, "an integer")?,
            ("split", "flagver") => self.split.flagver = parse_num(line, key, value, "an integer")?,
            ("split", "doband") => self.split.doband = parse_num(line, key, value, "an integer")?,
            ("split", "aparm") => self.split.aparm = parse_int_pair(line, key, value)?,
            ("split", "nchav") => self.split.nchav = parse_num(line, key, value, "an integer")?,
            ("split", "chinc") => self.split.chinc = parse_num(line, key, value, "an integer")?,

            // Unrecognized task names and keys are ignored.
            _ => return Ok(()),
        }
        println!("{}.{} = {}", task, key, value);
        Ok(())
    }

    fn apply_global(&mut self, line: usize, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "AIPSuserno" => self.user_no = parse_num(line, key, value, "an integer")?,
            "properMotion" => {
                self.proper_motion = Some(parse_num(line, key, value, "a float")?)
            }
            "positionAngle" => {
                self.position_angle = Some(parse_num(line, key, value, "a float")?)
            }
            "sourceName" => self.source_name = Some(value.to_string()),
            "obsStartTime" => self.obs_start = Some(parse_time(line, key, value)?),
            "obsEndTime" => self.obs_end = Some(parse_time(line, key, value)?),
            "cleanup" => self.cleanup = value == "True",
            _ => return Ok(()),
        }
        println!("{} = {}", key, value);
        Ok(())
    }

    fn finish(self) -> Result<Config, ConfigError> {
        Ok(Config {
            user_no: self.user_no,
            fitld: self.fitld,
            imagr: self.imagr,
            splat: self.splat,
            split: self.split,
            proper_motion: self.proper_motion.ok_or(ConfigError::Missing("properMotion"))?,
            position_angle: self
                .position_angle
                .ok_or(ConfigError::Missing("positionAngle"))?,
            source_name: self.source_name.ok_or(ConfigError::Missing("sourceName"))?,
            obs_start: self.obs_start.ok_or(ConfigError::Missing("obsStartTime"))?,
            obs_end: self.obs_end.ok_or(ConfigError::Missing("obsEndTime"))?,
            cleanup: self.cleanup,
        })
    }
}

fn parse_time(line: usize, key: &str, value: &str) -> Result<AipsTime, ConfigError> {
    value.parse().map_err(|source| ConfigError::BadTime {
        line,
        key: key.to_string(),
        value: value.to_string(),
        source,
    })
}
