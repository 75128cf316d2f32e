use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};

pub const DEFAULT_CONFIG_PATH: &str = "conf/config.json";
/// Older deployments kept the config next to the binary.
pub const LEGACY_CONFIG_PATH: &str = "config.json";

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "twittermost",
    about = "Relays a Twitter home timeline into a Mattermost channel",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "RELAY_CONFIG",
        help = "Path to the JSON configuration file. Defaults to conf/config.json, or ./config.json when that legacy file exists."
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long = "data-path",
        help = "Override the persisted state file path (DataPath)."
    )]
    pub data_path: Option<PathBuf>,

    #[arg(
        long = "check-interval",
        value_parser = parse_positive_u64,
        help = "Override the timeline poll interval in seconds (CheckInterval)."
    )]
    pub check_interval: Option<u64>,

    #[arg(
        long = "check-config",
        action = ArgAction::SetTrue,
        help = "Load and validate the configuration, print a redacted summary, and exit."
    )]
    pub check_config: bool,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        resolve_config_path(
            self.config.as_deref(),
            Path::new(LEGACY_CONFIG_PATH).exists(),
        )
    }
}

pub fn resolve_config_path(explicit: Option<&Path>, legacy_exists: bool) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None if legacy_exists => PathBuf::from(LEGACY_CONFIG_PATH),
        None => PathBuf::from(DEFAULT_CONFIG_PATH),
    }
}
