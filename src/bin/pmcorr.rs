// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use anyhow::{bail, ensure};
use chrono::Utc;
use structopt::StructOpt;

use pmcorr::config::Config;
use pmcorr::driver;
use pmcorr::tasks::{DryRunEnv, SubprocessEnv, NO_DATA_EXIT_CODE};

/// Correct VLBI imaging for a source's proper motion: split a calibrated
/// dataset into time bins short enough that the source moves at most one
/// pixel per bin, shift each bin's phase center to track the source, and
/// recombine the bins for final imaging. The heavy lifting happens in an
/// external reduction environment reached through a runner executable.
#[derive(StructOpt, Debug)]
#[structopt(name = "pmcorr")]
struct Args {
    /// The input parameter file.
    #[structopt(short, long, default_value = "PMCorr.in", parse(from_str))]
    input: PathBuf,

    /// The task-runner executable bridging to the reduction environment. It
    /// is invoked as `runner <task> userno=<n> key=value...` and reports an
    /// empty selection with exit code 10.
    #[structopt(short, long, parse(from_str))]
    runner: Option<PathBuf>,

    /// Print the task invocations without running anything.
    #[structopt(long)]
    dry_run: bool,
}

fn main() -> Result<(), anyhow::Error> {
    let args = Args::from_args();

    ensure!(
        args.input.exists(),
        "Input file ({}) does not exist!",
        args.input.display()
    );

    println!(
        "pmcorr v{} at {} UTC",
        env!("CARGO_PKG_VERSION"),
        Utc::now().format("%Y-%m-%d %H:%M:%S")
    );
    println!("####################################");
    println!("#        Reading Parameters        #");
    println!("####################################");
    let config = Config::from_file(&args.input)?;
    println!("####################################\n");

    let report = if args.dry_run {
        driver::run(&mut DryRunEnv::default(), &config)?
    } else {
        let runner = match &args.runner {
            Some(r) => r.clone(),
            None => bail!(
                "No --runner given; point one at the reduction environment (its no-data exit code is {}) or pass --dry-run.",
                NO_DATA_EXIT_CODE
            ),
        };
        driver::run(&mut SubprocessEnv::new(runner, config.user_no), &config)?
    };

    println!();
    println!(
        "{} of {} time bins were empty",
        report.empty_bins, report.num_bins
    );
    println!("Final image made from {}", report.combined);

    Ok(())
}
