use std::sync::Arc;
use std::time::Duration;

use relay_core::ReconnectBackoff;
use relay_mattermost::ChatBackend;
use relay_state::StateStore;
use relay_twitter::FeedBackend;
use tokio::sync::{Mutex, MutexGuard};

use crate::shutdown::ShutdownSignal;

/// The authenticated chat account the bot acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub user_id: String,
    pub username: String,
}

impl BotIdentity {
    /// Handle that prefixes commands in shared channels.
    pub fn mention(&self) -> String {
        format!("@{}", self.username)
    }
}

/// Channels resolved during startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotChannels {
    pub main_channel_id: String,
    pub debug_channel_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    /// Timeline batch size per poll.
    pub max_items: usize,
    pub check_interval: Duration,
    /// History page size used by `clear`.
    pub clear_page_size: u32,
    pub backoff: ReconnectBackoff,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            max_items: 20,
            check_interval: Duration::from_secs(120),
            clear_page_size: 200,
            backoff: ReconnectBackoff::default(),
        }
    }
}

/// Everything the loops and handlers share, built once at startup.
pub struct BotContext {
    pub chat: Arc<dyn ChatBackend>,
    pub feed: Arc<dyn FeedBackend>,
    pub state: Arc<StateStore>,
    pub identity: BotIdentity,
    pub channels: BotChannels,
    pub settings: RuntimeSettings,
    pub shutdown: ShutdownSignal,
    poll_guard: Mutex<()>,
}

impl BotContext {
    pub fn new(
        chat: Arc<dyn ChatBackend>,
        feed: Arc<dyn FeedBackend>,
        state: Arc<StateStore>,
        identity: BotIdentity,
        channels: BotChannels,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            chat,
            feed,
            state,
            identity,
            channels,
            settings,
            shutdown: ShutdownSignal::new(),
            poll_guard: Mutex::new(()),
        }
    }

    /// Serializes timeline cycles between the timer and the `check` command.
    pub(crate) async fn lock_poll(&self) -> MutexGuard<'_, ()> {
        self.poll_guard.lock().await
    }
}

impl std::fmt::Debug for BotContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotContext")
            .field("state", &self.state.path())
            .field("identity", &self.identity)
            .field("channels", &self.channels)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
