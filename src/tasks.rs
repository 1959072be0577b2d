// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
 * The contract with the external reduction environment.
 *
 * All heavy computation (loading, calibration, splitting, phase shifting,
 * concatenation, imaging) happens out there; this crate only names the
 * tasks, hands them parameters and interprets their outcomes. Each
 * invocation blocks until the environment finishes, since later tasks read
 * artifacts written by earlier ones.
 */

use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use itertools::Itertools;
use thiserror::Error;

use crate::config::{FitldParams, ImagrParams, SplatParams, SplitParams};
use crate::time::AipsTime;

/// An artifact in the environment's catalog, identified by source name,
/// type tag and sequence number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatEntry {
    pub name: String,
    pub class: String,
    pub seq: u32,
}

impl CatEntry {
    pub fn new<N: Into<String>, C: Into<String>>(name: N, class: C, seq: u32) -> Self {
        Self {
            name: name.into(),
            class: class.into(),
            seq,
        }
    }
}

impl fmt::Display for CatEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.name, self.class, self.seq)
    }
}

/// The outcome of a single task invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    /// The task completed and produced its output artifact.
    Done,
    /// The environment found no usable data for this invocation (an empty
    /// time range, or no on-source data). Recoverable during per-bin work.
    NoData,
}

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Couldn't start task runner '{runner}': {source}")]
    Spawn {
        runner: String,
        source: std::io::Error,
    },

    #[error("Task {task} failed ({status})")]
    Failed {
        task: &'static str,
        status: std::process::ExitStatus,
    },
}

/// One method per task in the reduction environment.
pub trait TaskEnvironment {
    /// Load the calibrated dataset from disk into the workspace.
    fn fitld(&mut self, params: &FitldParams, out: &CatEntry) -> Result<TaskStatus, TaskError>;

    /// Apply calibration and split the given time range out of `indata` as
    /// a multi-source file.
    fn splat(
        &mut self,
        params: &SplatParams,
        indata: &CatEntry,
        out: &CatEntry,
        range: (AipsTime, AipsTime),
    ) -> Result<TaskStatus, TaskError>;

    /// Shift `indata`'s phase center by `(ra_shift, dec_shift)` mas for the
    /// named source.
    fn clcor(
        &mut self,
        source: &str,
        indata: &CatEntry,
        ra_shift: f64,
        dec_shift: f64,
    ) -> Result<TaskStatus, TaskError>;

    /// Split a calibrated single-source file for `source` out of `indata`.
    fn split(
        &mut self,
        params: &SplitParams,
        source: &str,
        indata: &CatEntry,
    ) -> Result<TaskStatus, TaskError>;

    /// Concatenate `indata` and `in2data` into `out`.
    fn dbcon(
        &mut self,
        indata: &CatEntry,
        in2data: &CatEntry,
        out: &CatEntry,
    ) -> Result<TaskStatus, TaskError>;

    /// Image `indata`, writing image artifacts under `outname`.
    fn imagr(
        &mut self,
        params: &ImagrParams,
        indata: &CatEntry,
        outname: &str,
    ) -> Result<TaskStatus, TaskError>;

    /// Delete an artifact from the workspace.
    fn zap(&mut self, entry: &CatEntry) -> Result<TaskStatus, TaskError>;
}

/// The exit code the runner uses to report an empty selection rather than a
/// failure.
pub const NO_DATA_EXIT_CODE: i32 = 10;

/// Runs each task through an external runner executable, typically a thin
/// wrapper around the reduction environment. The runner is invoked as
/// `runner <task> userno=<n> key=value...`; exit code 0 means done,
/// [NO_DATA_EXIT_CODE] means the invocation found no usable data and
/// anything else is a failure.
pub struct SubprocessEnv {
    runner: PathBuf,
    user_no: i32,
}

impl SubprocessEnv {
    pub fn new(runner: PathBuf, user_no: i32) -> Self {
        Self { runner, user_no }
    }

    fn run(&mut self, task: &'static str, args: &[String]) -> Result<TaskStatus, TaskError> {
        let status = Command::new(&self.runner)
            .arg(task)
            .arg(format!("userno={}", self.user_no))
            .args(args)
            .status()
            .map_err(|source| TaskError::Spawn {
                runner: self.runner.display().to_string(),
                source,
            })?;
        match status.code() {
            Some(0) => Ok(TaskStatus::Done),
            Some(NO_DATA_EXIT_CODE) => Ok(TaskStatus::NoData),
            _ => Err(TaskError::Failed { task, status }),
        }
    }
}

impl TaskEnvironment for SubprocessEnv {
    fn fitld(&mut self, params: &FitldParams, out: &CatEntry) -> Result<TaskStatus, TaskError> {
        self.run("fitld", &fitld_args(params, out))
    }

    fn splat(
        &mut self,
        params: &SplatParams,
        indata: &CatEntry,
        out: &CatEntry,
        range: (AipsTime, AipsTime),
    ) -> Result<TaskStatus, TaskError> {
        self.run("splat", &splat_args(params, indata, out, range))
    }

    fn clcor(
        &mut self,
        source: &str,
        indata: &CatEntry,
        ra_shift: f64,
        dec_shift: f64,
    ) -> Result<TaskStatus, TaskError> {
        self.run("clcor", &clcor_args(source, indata, ra_shift, dec_shift))
    }

    fn split(
        &mut self,
        params: &SplitParams,
        source: &str,
        indata: &CatEntry,
    ) -> Result<TaskStatus, TaskError> {
        self.run("split", &split_args(params, source, indata))
    }

    fn dbcon(
        &mut self,
        indata: &CatEntry,
        in2data: &CatEntry,
        out: &CatEntry,
    ) -> Result<TaskStatus, TaskError> {
        self.run("dbcon", &dbcon_args(indata, in2data, out))
    }

    fn imagr(
        &mut self,
        params: &ImagrParams,
        indata: &CatEntry,
        outname: &str,
    ) -> Result<TaskStatus, TaskError> {
        self.run("imagr", &imagr_args(params, indata, outname))
    }

    fn zap(&mut self, entry: &CatEntry) -> Result<TaskStatus, TaskError> {
        self.run("zap", &zap_args(entry))
    }
}

/// Prints every invocation to stdout instead of running it; every task
/// reports [TaskStatus::Done]. Used by `--dry-run` to inspect the planned
/// sequence.
#[derive(Debug, Default)]
pub struct DryRunEnv;

fn announce(task: &str, args: &[String]) -> Result<TaskStatus, TaskError> {
    println!("[dry-run] {} {}", task, args.join(" "));
    Ok(TaskStatus::Done)
}

impl TaskEnvironment for DryRunEnv {
    fn fitld(&mut self, params: &FitldParams, out: &CatEntry) -> Result<TaskStatus, TaskError> {
        announce("fitld", &fitld_args(params, out))
    }

    fn splat(
        &mut self,
        params: &SplatParams,
        indata: &CatEntry,
        out: &CatEntry,
        range: (AipsTime, AipsTime),
    ) -> Result<TaskStatus, TaskError> {
        announce("splat", &splat_args(params, indata, out, range))
    }

    fn clcor(
        &mut self,
        source: &str,
        indata: &CatEntry,
        ra_shift: f64,
        dec_shift: f64,
    ) -> Result<TaskStatus, TaskError> {
        announce("clcor", &clcor_args(source, indata, ra_shift, dec_shift))
    }

    fn split(
        &mut self,
        params: &SplitParams,
        source: &str,
        indata: &CatEntry,
    ) -> Result<TaskStatus, TaskError> {
        announce("split", &split_args(params, source, indata))
    }

    fn dbcon(
        &mut self,
        indata: &CatEntry,
        in2data: &CatEntry,
        out: &CatEntry,
    ) -> Result<TaskStatus, TaskError> {
        announce("dbcon", &dbcon_args(indata, in2data, out))
    }

    fn imagr(
        &mut self,
        params: &ImagrParams,
        indata: &CatEntry,
        outname: &str,
    ) -> Result<TaskStatus, TaskError> {
        announce("imagr", &imagr_args(params, indata, outname))
    }

    fn zap(&mut self, entry: &CatEntry) -> Result<TaskStatus, TaskError> {
        announce("zap", &zap_args(entry))
    }
}

fn fitld_args(params: &FitldParams, out: &CatEntry) -> Vec<String> {
    vec![
        format!("datain={}", params.datain.display()),
        format!("outdata={}", out),
    ]
}

fn splat_args(
    params: &SplatParams,
    indata: &CatEntry,
    out: &CatEntry,
    range: (AipsTime, AipsTime),
) -> Vec<String> {
    let (start, end) = range;
    let timerang = start
        .fields()
        .iter()
        .chain(end.fields().iter())
        .join(",");
    vec![
        format!("indata={}", indata),
        format!("outdata={}", out),
        format!("docal={}", params.docal),
        format!("gainuse={}", params.gainuse),
        format!("flagver={}", params.flagver),
        format!("doband={}", params.doband),
        format!("bpver={}", params.bpver),
        format!("timerang={}", timerang),
    ]
}

fn clcor_args(source: &str, indata: &CatEntry, ra_shift: f64, dec_shift: f64) -> Vec<String> {
    vec![
        format!("indata={}", indata),
        format!("sour={}", source),
        "opcode=ANTP".to_string(),
        format!("rashift={}", ra_shift),
        format!("decshift={}", dec_shift),
    ]
}

fn split_args(params: &SplitParams, source: &str, indata: &CatEntry) -> Vec<String> {
    vec![
        format!("indata={}", indata),
        format!("sour={}", source),
        format!("docal={}", params.docal),
        format!("gainuse={}", params.gainuse),
        format!("flagver={}", params.flagver),
        format!("doband={}", params.doband),
        format!("aparm={}", params.aparm.iter().join(",")),
        format!("nchav={}", params.nchav),
        format!("chinc={}", params.chinc),
    ]
}

fn dbcon_args(indata: &CatEntry, in2data: &CatEntry, out: &CatEntry) -> Vec<String> {
    vec![
        format!("indata={}", indata),
        format!("in2data={}", in2data),
        format!("outdata={}", out),
    ]
}

fn imagr_args(params: &ImagrParams, indata: &CatEntry, outname: &str) -> Vec<String> {
    let mut args = vec![
        format!("indata={}", indata),
        format!("outname={}", outname),
        format!("robust={}", params.robust),
        format!("niter={}", params.niter),
        format!("cellsi={},{}", params.cellsi, params.cellsi),
        format!("imsi={},{}", params.imsi, params.imsi),
        format!("rashift={}", params.rashift),
        format!("decshift={}", params.decshift),
        format!("flux={}", params.flux),
    ];
    if !params.boxfile.as_os_str().is_empty() {
        args.push(format!("boxfile={}", params.boxfile.display()));
    }
    args
}

fn zap_args(entry: &CatEntry) -> Vec<String> {
    vec![format!("indata={}", entry)]
}
