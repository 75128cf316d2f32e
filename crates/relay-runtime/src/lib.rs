//! Event orchestration for the Mattermost/Twitter relay bot.
//!
//! The runtime wires a timer-driven feed poller and a supervised chat event
//! stream around one shared [`BotContext`]. Commands arriving on the stream
//! are dispatched inline; background failures go to the diagnostics channel.

mod bot_runtime;
mod commands;
mod context;
mod diagnostics;
mod event_stream;
mod feed_poller;
mod publisher;
mod shutdown;
#[cfg(test)]
mod test_support;

pub use bot_runtime::{
    run_relay_bot, run_until, start_chat_session, ChatLogin, ChatSession, ChatTarget,
    RelayBotConfig,
};
pub use commands::{help_text, parse_command, Command, CommandDispatcher, CommandInvocation};
pub use context::{BotChannels, BotContext, BotIdentity, RuntimeSettings};
pub use diagnostics::report as report_diagnostic;
pub use event_stream::{
    EventConnection, EventHandler, EventStreamConnector, EventStreamSupervisor,
    MattermostEventConnector, StreamSummary,
};
pub use feed_poller::{check_timeline, spawn_feed_poller, PollReport, PollerHandle};
pub use publisher::{publish_tweet, render_body, render_tweet, reply_to_post, RenderedItem};
pub use shutdown::{wait_for_termination_signal, ShutdownSignal};
