//! Timer-driven timeline polling.
//!
//! A cycle fetches items newer than the persisted cursor, raises and
//! persists the cursor, then forwards the items. Persisting first means a
//! crash mid-forward loses items rather than re-sending them.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::context::BotContext;
use crate::diagnostics;
use crate::publisher::publish_tweet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub fetched: usize,
    pub published: usize,
    pub failed: usize,
    /// Cursor after the cycle.
    pub cursor: u64,
}

/// Runs one fetch-and-forward cycle.
///
/// Fetch and persistence failures are returned; a failed forward is reported
/// to diagnostics and counted, and the remaining items are still sent.
pub async fn check_timeline(ctx: &BotContext) -> Result<PollReport> {
    let _cycle = ctx.lock_poll().await;
    let since = ctx.state.feed_cursor()?;
    let mut items = ctx
        .feed
        .home_timeline(since, ctx.settings.max_items)
        .await
        .context("timeline fetch failed")?;
    items.retain(|item| item.id > since);
    items.sort_by_key(|item| item.id);

    let cursor = ctx
        .state
        .advance_feed_cursor(items.iter().map(|item| item.id))
        .context("failed to persist feed cursor")?;
    let mut report = PollReport {
        fetched: items.len(),
        cursor,
        ..PollReport::default()
    };

    for item in &items {
        match publish_tweet(ctx.chat.as_ref(), &ctx.channels.main_channel_id, item).await {
            Ok(()) => report.published += 1,
            Err(error) => {
                report.failed += 1;
                let message = format!("feed item {} could not be posted: {error}", item.id);
                diagnostics::report(ctx, &message).await;
            }
        }
    }
    if report.fetched > 0 {
        tracing::info!(
            fetched = report.fetched,
            published = report.published,
            failed = report.failed,
            cursor = report.cursor,
            "timeline cycle complete"
        );
    }
    Ok(report)
}

async fn run_poll_cycle(ctx: &BotContext) {
    if let Err(error) = check_timeline(ctx).await {
        diagnostics::report(ctx, &format!("timeline check failed: {error:#}")).await;
    }
}

/// Handle to the background poller task.
#[derive(Debug)]
pub struct PollerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops the timer and waits for an in-flight cycle to be abandoned.
    pub async fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Spawns the poll loop. The first cycle runs one interval after start.
pub fn spawn_feed_poller(ctx: Arc<BotContext>) -> PollerHandle {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(run_feed_poll_loop(ctx, shutdown_rx));
    PollerHandle {
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    }
}

async fn run_feed_poll_loop(ctx: Arc<BotContext>, mut shutdown_rx: oneshot::Receiver<()>) {
    let period = ctx.settings.check_interval.max(std::time::Duration::from_millis(1));
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    tracing::info!(interval_secs = period.as_secs(), "feed poller started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                tokio::select! {
                    _ = run_poll_cycle(&ctx) => {}
                    _ = &mut shutdown_rx => break,
                }
            }
            _ = &mut shutdown_rx => break,
        }
    }
    tracing::info!("feed poller stopped");
}
