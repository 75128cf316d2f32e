//! Startup validation for `BotConfig`.

use anyhow::{bail, Result};

use crate::bot_config::BotConfig;

const MAX_BATCH: usize = 200;
const MAX_CLEAR_PAGE: u32 = 200;

fn require_non_empty(key: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{key} must not be empty");
    }
    Ok(())
}

/// Rejects configurations the bot cannot start with. Fails on the first problem.
pub fn validate_bot_config(config: &BotConfig) -> Result<()> {
    require_non_empty("Url", &config.url)?;
    require_non_empty("Team", &config.team)?;
    require_non_empty("Channel", &config.channel)?;
    if config.token.trim().is_empty()
        && (config.user.trim().is_empty() || config.password.is_empty())
    {
        bail!("either Token or both User and Password must be set");
    }
    require_non_empty("ConsumerKey", &config.consumer_key)?;
    require_non_empty("ConsumerSecret", &config.consumer_secret)?;
    require_non_empty("AccessToken", &config.access_token)?;
    require_non_empty("AccessSecret", &config.access_secret)?;
    if !(1..=MAX_BATCH).contains(&config.max_tweets) {
        bail!(
            "MaxTweets must be between 1 and {MAX_BATCH}, got {}",
            config.max_tweets
        );
    }
    if config.check_interval == 0 {
        bail!("CheckInterval must be greater than 0");
    }
    if config.reconnect_initial_delay_ms == 0 {
        bail!("ReconnectInitialDelayMs must be greater than 0");
    }
    if config.reconnect_max_delay_ms < config.reconnect_initial_delay_ms {
        bail!(
            "ReconnectMaxDelayMs ({}) must be >= ReconnectInitialDelayMs ({})",
            config.reconnect_max_delay_ms,
            config.reconnect_initial_delay_ms
        );
    }
    if !(1..=MAX_CLEAR_PAGE).contains(&config.clear_page_size) {
        bail!(
            "ClearPageSize must be between 1 and {MAX_CLEAR_PAGE}, got {}",
            config.clear_page_size
        );
    }
    if config.request_timeout_ms == 0 {
        bail!("RequestTimeoutMs must be greater than 0");
    }
    Ok(())
}
