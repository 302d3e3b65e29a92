use anyhow::{Context, Result};
use beacon_core::{Config, ManifestBuilder};
use clap::{Arg, Command};
use tracing::info;

use crate::config::BeaconConfig;

pub fn make_subcommand() -> Command {
    Command::new("build")
        .about("Render every site and write the monitor manifest")
        .arg(
            Arg::new("sites")
                .short('s')
                .long("sites")
                .value_name("FILE")
                .help("Site definition file [default: ./sites.json]"),
        )
        .arg(
            Arg::new("content")
                .long("content")
                .value_name("DIR")
                .help("Static content root [default: ./content]"),
        )
        .arg(
            Arg::new("templates")
                .short('t')
                .long("templates")
                .value_name("DIR")
                .help("Template directory [default: ./templates]"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Root of the per-domain output directories [default: ./www]"),
        )
        .arg(
            Arg::new("manifest")
                .short('m')
                .long("manifest")
                .value_name("FILE")
                .help("Monitor manifest to write [default: ./mon.json]"),
        )
        .arg(
            Arg::new("scheme")
                .long("scheme")
                .value_name("SCHEME")
                .value_parser(["https", "http"])
                .help("URL scheme recorded in the manifest [default: https]"),
        )
}

pub fn execute(settings: &BeaconConfig) -> Result<()> {
    let build = &settings.build;
    let config = Config::read(&build.sites)?;

    let manifest = ManifestBuilder::new()
        .content_dir(&build.content)
        .templates_dir(&build.templates)
        .sites_dir(&build.output)
        .scheme(build.scheme.as_str())
        .echo(settings.debug)
        .build(&config)
        .with_context(|| format!("build of {} failed", build.sites))?;

    manifest.write(&build.manifest)?;
    info!(endpoints = manifest.len(), manifest = %build.manifest, "manifest written");

    Ok(())
}
