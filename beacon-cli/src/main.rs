use std::process::ExitCode;

use anyhow::{Result, bail};
use clap::{Arg, ArgAction, Command};
use tracing::error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use crate::config::BeaconConfig;

mod cmd;
mod config;

fn cli() -> Command {
    Command::new("beacon")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Publish static sites and verify they stay published")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Settings file [default: ./beacon.toml]")
                .global(true),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .help("Enable debug logging and echo rendered pages")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(cmd::build::make_subcommand())
        .subcommand(cmd::monitor::make_subcommand())
}

/// `RUST_LOG` when set, INFO otherwise. `--debug` raises it to at least DEBUG.
fn env_filter(debug: bool, rust_log: Option<&str>) -> EnvFilter {
    let filter = rust_log
        .filter(|spec| !spec.trim().is_empty())
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let below_debug = filter
        .max_level_hint()
        .is_none_or(|max| max < LevelFilter::DEBUG);
    if debug && below_debug {
        filter.add_directive(tracing::Level::DEBUG.into())
    } else {
        filter
    }
}

/// Logs go to stderr so they never mix with the report on stdout
fn init_tracing(debug: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter(debug, rust_log.as_deref()))
        .init();
}

async fn run(command: &str, settings: &BeaconConfig) -> Result<u8> {
    match command {
        "build" => cmd::build::execute(settings).map(|()| 0),
        "monitor" => cmd::monitor::execute(settings).await,
        other => bail!("unknown command {other}"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    let Some((command, args)) = matches.subcommand() else {
        return ExitCode::FAILURE;
    };

    let settings = match BeaconConfig::load(command, args) {
        Ok(settings) => settings,
        Err(e) => {
            init_tracing(args.get_flag("debug"));
            error!("invalid settings: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(settings.debug);

    match run(command, &settings).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
