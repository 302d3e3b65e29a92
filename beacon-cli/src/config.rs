use anyhow::Result;
use clap::ArgMatches;
use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

const DEFAULT_CONFIG_FILE: &str = "./beacon.toml";

/// Settings for every command, merged from defaults, the settings file,
/// environment variables and CLI arguments
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BeaconConfig {
    /// Build configuration
    pub build: BuildConfig,
    /// Monitor configuration
    pub monitor: MonitorConfig,
    /// Debug logging, and echo rendered pages to stdout during builds
    pub debug: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BuildConfig {
    /// Site definition file
    pub sites: String,
    /// Static content root
    pub content: String,
    /// Template directory
    pub templates: String,
    /// Root the per-domain output directories are created in
    pub output: String,
    /// Where the monitor manifest is written
    pub manifest: String,
    /// URL scheme recorded in the manifest
    pub scheme: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MonitorConfig {
    /// Manifest to check
    pub manifest: String,
    /// Number of concurrent checks
    pub parallel: usize,
    /// Per request timeout in milliseconds
    pub timeout: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            sites: "./sites.json".to_string(),
            content: "./content".to_string(),
            templates: "./templates".to_string(),
            output: "./www".to_string(),
            manifest: "./mon.json".to_string(),
            scheme: "https".to_string(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            manifest: "./mon.json".to_string(),
            parallel: 16,
            timeout: 750,
        }
    }
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            build: BuildConfig::default(),
            monitor: MonitorConfig::default(),
            debug: false,
        }
    }
}

/// `BEACON_` variables, with `__` between nested keys (`BEACON_MONITOR__PARALLEL`)
fn environment() -> Environment {
    Environment::with_prefix("BEACON")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl BeaconConfig {
    /// Load configuration with cascading precedence:
    /// 1. CLI arguments (highest priority)
    /// 2. Environment variables (BEACON_*)
    /// 3. Configuration file
    /// 4. Defaults (lowest priority)
    ///
    /// `command` is the subcommand `args` were matched for; it decides which
    /// section `--manifest` belongs to.
    pub fn load(command: &str, args: &ArgMatches) -> Result<Self> {
        Self::load_with(command, args, environment())
    }

    fn load_with(command: &str, args: &ArgMatches, environment: Environment) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        // 1. Start with defaults
        let defaults = Self::default();
        builder = builder.add_source(ConfigBuilder::try_from(&defaults)?);

        // 2. The settings file; only an explicitly named one has to exist
        let explicit = string_arg(args, "config");
        let config_file = explicit.clone().unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
        builder = builder.add_source(File::from(Path::new(&config_file)).required(explicit.is_some()));

        // 3. Environment variables
        builder = builder.add_source(environment);

        // 4. Override with CLI arguments given to this command
        let mut cli_overrides = HashMap::new();
        for (arg, key) in [
            ("sites", "build.sites"),
            ("content", "build.content"),
            ("templates", "build.templates"),
            ("output", "build.output"),
            ("scheme", "build.scheme"),
        ] {
            if let Some(value) = string_arg(args, arg) {
                cli_overrides.insert(key.to_string(), value);
            }
        }
        if let Some(manifest) = string_arg(args, "manifest") {
            cli_overrides.insert(format!("{command}.manifest"), manifest);
        }
        if let Some(parallel) = args.try_get_one::<usize>("parallel").unwrap_or(None) {
            cli_overrides.insert("monitor.parallel".to_string(), parallel.to_string());
        }
        if let Some(timeout) = args.try_get_one::<u64>("timeout").unwrap_or(None) {
            cli_overrides.insert("monitor.timeout".to_string(), timeout.to_string());
        }
        if args.try_get_one::<bool>("debug").unwrap_or(None) == Some(&true) {
            cli_overrides.insert("debug".to_string(), "true".to_string());
        }

        if !cli_overrides.is_empty() {
            builder = builder.add_source(ConfigBuilder::try_from(&cli_overrides)?);
        }

        let config = builder.build()?;
        let beacon_config: BeaconConfig = config.try_deserialize()?;

        Ok(beacon_config)
    }
}

fn string_arg(args: &ArgMatches, id: &str) -> Option<String> {
    args.try_get_one::<String>(id).unwrap_or(None).cloned()
}
