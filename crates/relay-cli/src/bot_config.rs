//! `BotConfig`: the on-disk configuration format and its layered loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use relay_core::ReconnectBackoff;
use relay_runtime::{ChatLogin, ChatTarget, RelayBotConfig, RuntimeSettings};
use relay_twitter::{OAuthCredentials, DEFAULT_TWITTER_API_BASE};
use serde::{Deserialize, Serialize};

use crate::cli_args::Cli;
use crate::validation::validate_bot_config;

const KUBE_SERVICE_ENV: &str = "MATTERMOST_PORT";

const STRING_OVERRIDES: [&str; 12] = [
    "RELAY_URL",
    "RELAY_DATA_PATH",
    "RELAY_USER",
    "RELAY_PASSWORD",
    "RELAY_TOKEN",
    "RELAY_TEAM",
    "RELAY_CHANNEL",
    "RELAY_DEBUG_CHANNEL",
    "RELAY_CONSUMER_KEY",
    "RELAY_CONSUMER_SECRET",
    "RELAY_ACCESS_TOKEN",
    "RELAY_ACCESS_SECRET",
];

/// Bot configuration. JSON keys are PascalCase (`Url`, `DataPath`, ...);
/// unknown keys are ignored so older config files still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BotConfig {
    pub url: String,
    pub data_path: String,
    pub user: String,
    pub password: String,
    pub token: String,
    pub team: String,
    pub channel: String,
    /// Empty disables the debug channel; diagnostics then go to the log.
    pub debug_channel: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_secret: String,
    pub max_tweets: usize,
    /// Seconds between timeline polls.
    pub check_interval: u64,
    pub twitter_api_base: String,
    pub reconnect_initial_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub clear_page_size: u32,
    pub request_timeout_ms: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8065".to_string(),
            data_path: "mattermost.json".to_string(),
            user: "bot".to_string(),
            password: String::new(),
            token: String::new(),
            team: "team".to_string(),
            channel: "twitter".to_string(),
            debug_channel: "twitter-debug".to_string(),
            consumer_key: String::new(),
            consumer_secret: String::new(),
            access_token: String::new(),
            access_secret: String::new(),
            max_tweets: 20,
            check_interval: 120,
            twitter_api_base: DEFAULT_TWITTER_API_BASE.to_string(),
            reconnect_initial_delay_ms: 500,
            reconnect_max_delay_ms: 60_000,
            clear_page_size: 200,
            request_timeout_ms: 30_000,
        }
    }
}

impl BotConfig {
    /// Defaults overlaid with `path`. A missing file is not an error.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "configuration file not found, ignoring");
                return Ok(Self::default());
            }
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("could not read config file {}", path.display()))
            }
        };
        let config = serde_json::from_str::<Self>(&raw)
            .with_context(|| format!("could not parse config file {}", path.display()))?;
        tracing::info!(path = %path.display(), "configuration file loaded");
        Ok(config)
    }

    fn string_field(&mut self, key: &str) -> Option<&mut String> {
        match key {
            "RELAY_URL" => Some(&mut self.url),
            "RELAY_DATA_PATH" => Some(&mut self.data_path),
            "RELAY_USER" => Some(&mut self.user),
            "RELAY_PASSWORD" => Some(&mut self.password),
            "RELAY_TOKEN" => Some(&mut self.token),
            "RELAY_TEAM" => Some(&mut self.team),
            "RELAY_CHANNEL" => Some(&mut self.channel),
            "RELAY_DEBUG_CHANNEL" => Some(&mut self.debug_channel),
            "RELAY_CONSUMER_KEY" => Some(&mut self.consumer_key),
            "RELAY_CONSUMER_SECRET" => Some(&mut self.consumer_secret),
            "RELAY_ACCESS_TOKEN" => Some(&mut self.access_token),
            "RELAY_ACCESS_SECRET" => Some(&mut self.access_secret),
            _ => None,
        }
    }

    /// Applies `RELAY_*` overrides read through `env`.
    pub fn apply_env_overrides<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut applied = 0_usize;
        for key in STRING_OVERRIDES {
            if let (Some(value), Some(field)) = (env(key), self.string_field(key)) {
                *field = value;
                applied += 1;
            }
        }
        if let Some(value) = env("RELAY_MAX_TWEETS") {
            self.max_tweets = parse_env_number("RELAY_MAX_TWEETS", &value)?;
            applied += 1;
        }
        if let Some(value) = env("RELAY_CHECK_INTERVAL") {
            self.check_interval = parse_env_number("RELAY_CHECK_INTERVAL", &value)?;
            applied += 1;
        }
        if applied > 0 {
            tracing::info!(overrides = applied, "loaded configuration from env vars");
        }
        Ok(())
    }

    pub fn debug_channel(&self) -> Option<&str> {
        Some(self.debug_channel.trim()).filter(|name| !name.is_empty())
    }

    pub fn chat_login(&self) -> ChatLogin {
        if self.token.trim().is_empty() {
            ChatLogin::Password {
                login_id: self.user.clone(),
                password: self.password.clone(),
            }
        } else {
            ChatLogin::Token(self.token.trim().to_string())
        }
    }

    pub fn to_relay_config(&self) -> RelayBotConfig {
        RelayBotConfig {
            chat_url: self.url.clone(),
            login: self.chat_login(),
            target: ChatTarget {
                team: self.team.clone(),
                channel: self.channel.clone(),
                debug_channel: self.debug_channel().map(str::to_string),
            },
            data_path: PathBuf::from(&self.data_path),
            twitter_api_base: self.twitter_api_base.clone(),
            oauth: OAuthCredentials {
                consumer_key: self.consumer_key.clone(),
                consumer_secret: self.consumer_secret.clone(),
                access_token: self.access_token.clone(),
                access_secret: self.access_secret.clone(),
            },
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            settings: RuntimeSettings {
                max_items: self.max_tweets,
                check_interval: Duration::from_secs(self.check_interval),
                clear_page_size: self.clear_page_size,
                backoff: ReconnectBackoff {
                    initial_delay: Duration::from_millis(self.reconnect_initial_delay_ms),
                    max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
                    ..ReconnectBackoff::default()
                },
            },
        }
    }

    /// One `key=value` line per setting with secrets masked.
    pub fn redacted_summary(&self) -> String {
        let secret = |value: &str| if value.is_empty() { "<empty>" } else { "<set>" };
        [
            format!("Url={}", self.url),
            format!("DataPath={}", self.data_path),
            format!("User={}", self.user),
            format!("Password={}", secret(&self.password)),
            format!("Token={}", secret(&self.token)),
            format!("Team={}", self.team),
            format!("Channel={}", self.channel),
            format!("DebugChannel={}", self.debug_channel().unwrap_or("<none>")),
            format!("ConsumerKey={}", secret(&self.consumer_key)),
            format!("ConsumerSecret={}", secret(&self.consumer_secret)),
            format!("AccessToken={}", secret(&self.access_token)),
            format!("AccessSecret={}", secret(&self.access_secret)),
            format!("MaxTweets={}", self.max_tweets),
            format!("CheckInterval={}", self.check_interval),
            format!("TwitterApiBase={}", self.twitter_api_base),
            format!("ReconnectInitialDelayMs={}", self.reconnect_initial_delay_ms),
            format!("ReconnectMaxDelayMs={}", self.reconnect_max_delay_ms),
            format!("ClearPageSize={}", self.clear_page_size),
            format!("RequestTimeoutMs={}", self.request_timeout_ms),
        ]
        .join("\n")
    }
}

fn parse_env_number<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse::<T>()
        .with_context(|| format!("invalid {key} value '{value}'"))
}

/// Maps a Kubernetes service variable such as `tcp://10.0.0.3:8065` to the
/// chat base URL (`http://10.0.0.3:8065`).
pub fn kube_service_url(raw: &str) -> Result<String> {
    let parsed = url::Url::parse(raw.trim())
        .with_context(|| format!("unable to parse {KUBE_SERVICE_ENV} url '{raw}'"))?;
    let scheme = match parsed.scheme() {
        "tcp" => "http",
        other => other,
    };
    let host = parsed
        .host_str()
        .with_context(|| format!("{KUBE_SERVICE_ENV} url '{raw}' has no host"))?;
    Ok(match parsed.port() {
        Some(port) => format!("{scheme}://{host}:{port}"),
        None => format!("{scheme}://{host}"),
    })
}

/// Loads the configuration for `cli` from the process environment.
pub fn load_bot_config(cli: &Cli) -> Result<BotConfig> {
    load_bot_config_with(cli, &cli.config_path(), |key| std::env::var(key).ok())
}

/// Layered load with an explicit config path and environment lookup.
pub fn load_bot_config_with<F>(cli: &Cli, config_path: &Path, env: F) -> Result<BotConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = BotConfig::from_file(config_path)?;
    config.apply_env_overrides(&env)?;
    if let Some(raw) = env(KUBE_SERVICE_ENV).filter(|raw| !raw.trim().is_empty()) {
        config.url = kube_service_url(&raw)?;
        tracing::info!(url = %config.url, "[k8s discovery] mattermost url set from {KUBE_SERVICE_ENV}");
    }
    if let Some(data_path) = &cli.data_path {
        config.data_path = data_path.display().to_string();
    }
    if let Some(check_interval) = cli.check_interval {
        config.check_interval = check_interval;
    }
    validate_bot_config(&config)?;
    Ok(config)
}
