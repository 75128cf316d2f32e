//! Startup sequence and top-level orchestration of the relay bot.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use relay_core::BackoffState;
use relay_mattermost::{ChatBackend, MattermostApiClient};
use relay_state::StateStore;
use relay_twitter::{FeedBackend, OAuthCredentials, TwitterApiClient};

use crate::commands::CommandDispatcher;
use crate::context::{BotChannels, BotContext, BotIdentity, RuntimeSettings};
use crate::event_stream::{EventStreamConnector, EventStreamSupervisor, MattermostEventConnector, StreamSummary};
use crate::feed_poller::spawn_feed_poller;
use crate::shutdown::wait_for_termination_signal;

/// How the bot authenticates to the chat backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatLogin {
    /// Personal access token, verified with `me`.
    Token(String),
    Password { login_id: String, password: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTarget {
    pub team: String,
    pub channel: String,
    pub debug_channel: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RelayBotConfig {
    pub chat_url: String,
    pub login: ChatLogin,
    pub target: ChatTarget,
    pub data_path: PathBuf,
    pub twitter_api_base: String,
    pub oauth: OAuthCredentials,
    pub request_timeout: Duration,
    pub settings: RuntimeSettings,
}

/// Identity and channels resolved by [`start_chat_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    pub identity: BotIdentity,
    pub channels: BotChannels,
}

/// Pings, authenticates, resolves the team and channels, and joins them.
/// Every failure is fatal.
pub async fn start_chat_session(
    chat: &dyn ChatBackend,
    login: &ChatLogin,
    target: &ChatTarget,
) -> Result<ChatSession> {
    chat.ping()
        .await
        .context("mattermost: could not connect")?;
    tracing::info!("connected to mattermost server");

    let user = match login {
        ChatLogin::Token(_) => chat.me().await,
        ChatLogin::Password { login_id, password } => chat.login(login_id, password).await,
    }
    .context("mattermost: could not login")?;
    tracing::info!(username = %user.username, "mattermost: logged in");

    let team = chat
        .team_by_name(&target.team)
        .await
        .with_context(|| format!("could not find team {}", target.team))?;

    let debug_channel = match target.debug_channel.as_deref() {
        Some(name) => Some(
            chat.channel_by_name(&team.id, name)
                .await
                .with_context(|| format!("could not find debug channel {name}"))?,
        ),
        None => {
            tracing::info!("no debug channel set, diagnostics go to the log");
            None
        }
    };
    let channel = chat
        .channel_by_name(&team.id, &target.channel)
        .await
        .with_context(|| format!("could not find channel {}", target.channel))?;

    chat.add_channel_member(&channel.id, &user.id)
        .await
        .with_context(|| format!("could not join channel {}", target.channel))?;
    if let Some(debug) = &debug_channel {
        chat.add_channel_member(&debug.id, &user.id)
            .await
            .with_context(|| format!("could not join channel {}", debug.name))?;
    }

    Ok(ChatSession {
        identity: BotIdentity {
            user_id: user.id,
            username: user.username,
        },
        channels: BotChannels {
            main_channel_id: channel.id,
            debug_channel_id: debug_channel.map(|debug| debug.id),
        },
    })
}

/// Runs the poller and the event stream until `termination` resolves or the
/// event stream fails for good, then stops the timer and flushes state.
pub async fn run_until<F>(
    ctx: Arc<BotContext>,
    connector: Arc<dyn EventStreamConnector>,
    termination: F,
) -> Result<StreamSummary>
where
    F: Future<Output = Result<()>>,
{
    let mut poller = spawn_feed_poller(ctx.clone());
    let dispatcher = Arc::new(CommandDispatcher::new(ctx.clone()));
    let supervisor = EventStreamSupervisor::new(
        connector,
        dispatcher,
        BackoffState::new(ctx.settings.backoff.clone()),
        ctx.shutdown.clone(),
    );
    let mut stream = tokio::spawn(supervisor.run());

    let finished = tokio::select! {
        signal = termination => {
            if let Err(error) = signal {
                tracing::warn!(error = %format!("{error:#}"), "signal listener failed, shutting down");
            }
            tracing::info!("shutdown requested");
            None
        }
        joined = &mut stream => Some(joined),
    };
    ctx.shutdown.trigger();
    tracing::info!("stopping feed poller");
    poller.shutdown().await;
    let outcome = match finished {
        Some(joined) => joined,
        None => stream.await,
    };

    tracing::info!("flushing bot state");
    let flushed = ctx.state.save().context("failed to flush bot state");
    let summary = outcome.context("event stream task failed")??;
    flushed?;
    tracing::info!(connections = summary.connections, "relay bot stopped");
    Ok(summary)
}

/// Full bot lifecycle: load state, verify both backends, then run until a
/// termination signal.
pub async fn run_relay_bot(config: RelayBotConfig) -> Result<()> {
    let state = Arc::new(StateStore::load(&config.data_path)?);

    let twitter = Arc::new(
        TwitterApiClient::new(
            &config.twitter_api_base,
            config.oauth.clone(),
            config.request_timeout,
        )
        .context("failed to create twitter client")?,
    );
    let account = twitter
        .verify_credentials()
        .await
        .context("twitter: failed to login")?;
    tracing::info!(screen_name = %account.screen_name, "twitter: logged in");

    let token = match &config.login {
        ChatLogin::Token(token) => Some(token.clone()),
        ChatLogin::Password { .. } => None,
    };
    let mattermost = Arc::new(
        MattermostApiClient::new(&config.chat_url, token, config.request_timeout)
            .context("failed to create mattermost client")?,
    );
    let session = start_chat_session(mattermost.as_ref(), &config.login, &config.target).await?;

    let ctx = Arc::new(BotContext::new(
        mattermost.clone(),
        twitter,
        state,
        session.identity,
        session.channels,
        config.settings,
    ));
    let connector = Arc::new(MattermostEventConnector::new(mattermost));
    run_until(ctx, connector, wait_for_termination_signal()).await?;
    Ok(())
}
