use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use beacon_core::Manifest;
use beacon_monitor::{Monitor, MonitorOptions};
use clap::{Arg, Command, value_parser};

use crate::config::BeaconConfig;

pub fn make_subcommand() -> Command {
    Command::new("monitor")
        .about("Check every endpoint of a manifest against the live sites")
        .arg(
            Arg::new("manifest")
                .short('m')
                .long("manifest")
                .value_name("FILE")
                .help("Monitor manifest to check [default: ./mon.json]"),
        )
        .arg(
            Arg::new("parallel")
                .short('p')
                .long("parallel")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .help("Number of concurrent checks [default: 16]"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("MS")
                .value_parser(value_parser!(u64))
                .help("Per request timeout in milliseconds [default: 750]"),
        )
}

/// Runs the checks and prints the report; the result is the exit code.
pub async fn execute(settings: &BeaconConfig) -> Result<u8> {
    let options = &settings.monitor;
    let manifest = Manifest::read(&options.manifest)?;

    let monitor = Monitor::new(MonitorOptions {
        parallel: options.parallel,
        timeout: Duration::from_millis(options.timeout),
    })?;
    let report = monitor.run(&manifest).await?;

    report
        .render(&mut io::stdout().lock())
        .context("cannot write report")?;
    Ok(report.exit_code())
}
