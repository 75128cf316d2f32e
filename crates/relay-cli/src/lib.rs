//! Command line and configuration for the relay bot binary.
//!
//! Configuration is layered: defaults, the JSON config file, `RELAY_*`
//! environment overrides, Kubernetes service discovery, then command line
//! flags. The result is validated before the runtime sees it.

pub mod bot_config;
pub mod cli_args;
pub mod validation;

pub use bot_config::{kube_service_url, load_bot_config, load_bot_config_with, BotConfig};
pub use cli_args::{resolve_config_path, Cli, DEFAULT_CONFIG_PATH, LEGACY_CONFIG_PATH};
pub use validation::validate_bot_config;
