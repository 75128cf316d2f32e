mod bootstrap_helpers;

use anyhow::Result;
use clap::Parser;
use relay_cli::{load_bot_config, Cli};
use relay_runtime::run_relay_bot;

use crate::bootstrap_helpers::init_tracing;

async fn run_cli(cli: Cli) -> Result<()> {
    let config = load_bot_config(&cli)?;
    if cli.check_config {
        println!("{}", config.redacted_summary());
        return Ok(());
    }
    tracing::info!(
        url = %config.url,
        team = %config.team,
        channel = %config.channel,
        "starting relay bot"
    );
    run_relay_bot(config.to_relay_config()).await
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run_cli(cli).await
}
