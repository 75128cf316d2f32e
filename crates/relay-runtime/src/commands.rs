//! Chat command parsing, trust enforcement and handlers.

use std::sync::Arc;

use async_trait::async_trait;
use relay_mattermost::{Post, PostedEvent};
use relay_state::TrustChange;
use relay_twitter::FIRST_PAGE_CURSOR;

use crate::context::BotContext;
use crate::event_stream::EventHandler;
use crate::feed_poller::check_timeline;
use crate::publisher::reply_to_post;

const UNTRUSTED_REPLY: &str = "Sorry, I don't trust you :/";
const MISSING_ARGUMENT_REPLY: &str = "Missing argument";
const DONE_REPLY: &str = "done!";
const OK_REPLY: &str = "Ok!";
const SELF_KEYWORD: &str = "me";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Follow,
    Unfollow,
    Followers,
    Trust,
    Distrust,
    Check,
    Clear,
}

impl Command {
    /// Registry order; the help reply lists commands in this order.
    pub const ALL: [Command; 8] = [
        Command::Ping,
        Command::Follow,
        Command::Unfollow,
        Command::Followers,
        Command::Trust,
        Command::Distrust,
        Command::Check,
        Command::Clear,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::Follow => "follow",
            Command::Unfollow => "unfollow",
            Command::Followers => "followers",
            Command::Trust => "trust",
            Command::Distrust => "distrust",
            Command::Check => "check",
            Command::Clear => "clear",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.name() == name)
    }

    pub fn requires_trust(self) -> bool {
        !matches!(self, Command::Ping)
    }
}

/// A message addressed to the bot, split into command word and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    /// `None` when the command word is not in the registry.
    pub command: Option<Command>,
    pub name: String,
    pub args: String,
}

impl CommandInvocation {
    /// First argument with surrounding whitespace and a leading `@` removed.
    pub fn handle_argument(&self) -> Option<&str> {
        self.args
            .split_whitespace()
            .next()
            .map(|handle| handle.trim_start_matches('@'))
            .filter(|handle| !handle.is_empty())
    }
}

fn is_handle_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '.' | '_' | '-')
}

/// Extracts a command from a chat message.
///
/// Direct messages are commands in full. Anything else must start with
/// `mention` or it is ignored. The prefix match is case-sensitive and also
/// requires a word boundary: the mention must not be followed by a handle
/// character, so `@botty ping` does not address `@bot` and gets no reply
/// instead of the help text a bare prefix match would produce.
pub fn parse_command(message: &str, is_direct: bool, mention: &str) -> Option<CommandInvocation> {
    let trimmed = message.trim();
    let body = match trimmed.strip_prefix(mention) {
        Some(rest) if !rest.starts_with(is_handle_char) => {
            rest.trim_start_matches([':', ',']).trim()
        }
        _ if is_direct => trimmed,
        _ => return None,
    };
    let mut parts = body.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let args = parts.next().unwrap_or_default().trim();
    Some(CommandInvocation {
        command: Command::from_name(name),
        name: name.to_string(),
        args: args.to_string(),
    })
}

pub fn help_text() -> String {
    let names = Command::ALL.map(Command::name).join(", ");
    format!("Sorry, I don't understand that command.  Available commands: {names}")
}

/// Routes posted events to command handlers and replies in thread.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    ctx: Arc<BotContext>,
}

impl CommandDispatcher {
    pub fn new(ctx: Arc<BotContext>) -> Self {
        Self { ctx }
    }

    /// Handles one posted event; returns the reply sent, if any.
    pub async fn dispatch(&self, event: &PostedEvent) -> Option<String> {
        let post = &event.post;
        if post.user_id == self.ctx.identity.user_id {
            return None;
        }
        let invocation = parse_command(&post.message, event.is_direct, &self.ctx.identity.mention())?;
        tracing::info!(
            command = %invocation.name,
            user_id = %post.user_id,
            channel_id = %post.channel_id,
            "command received"
        );
        let reply = self.execute(post, &invocation).await;
        reply_to_post(self.ctx.chat.as_ref(), post, &reply).await;
        Some(reply)
    }

    /// Runs a parsed command and returns its reply text.
    pub async fn execute(&self, post: &Post, invocation: &CommandInvocation) -> String {
        let Some(command) = invocation.command else {
            return help_text();
        };
        if command.requires_trust() {
            match self.ctx.state.is_trusted(&post.user_id) {
                Ok(true) => {}
                Ok(false) => return UNTRUSTED_REPLY.to_string(),
                Err(error) => return format!("error: {error:#}"),
            }
        }
        match command {
            Command::Ping => "pong".to_string(),
            Command::Follow | Command::Unfollow => {
                let Some(handle) = invocation.handle_argument() else {
                    return MISSING_ARGUMENT_REPLY.to_string();
                };
                self.handle_follow(command, handle).await
            }
            Command::Followers => self.handle_followers().await,
            Command::Trust | Command::Distrust => {
                let Some(handle) = invocation.handle_argument() else {
                    return MISSING_ARGUMENT_REPLY.to_string();
                };
                self.handle_trust(post, handle, command == Command::Trust)
                    .await
            }
            Command::Check => match check_timeline(&self.ctx).await {
                Ok(_) => DONE_REPLY.to_string(),
                Err(error) => format!("error: {error:#}"),
            },
            Command::Clear => self.handle_clear().await,
        }
    }

    async fn handle_follow(&self, command: Command, handle: &str) -> String {
        let result = if command == Command::Follow {
            self.ctx.feed.follow(handle).await
        } else {
            self.ctx.feed.unfollow(handle).await
        };
        match result {
            Ok(_) => OK_REPLY.to_string(),
            Err(error) => format!("Something went wrong: {error}"),
        }
    }

    async fn handle_followers(&self) -> String {
        let mut names = Vec::new();
        let mut cursor = FIRST_PAGE_CURSOR;
        loop {
            let page = match self.ctx.feed.friends_page(cursor).await {
                Ok(page) => page,
                Err(error) => return format!("error: {error}"),
            };
            if page.users.is_empty() {
                break;
            }
            names.extend(page.users.into_iter().map(|user| format!("@{}", user.screen_name)));
            // A cursor that does not move would loop forever.
            if page.next_cursor == 0 || page.next_cursor == cursor {
                break;
            }
            cursor = page.next_cursor;
        }
        if names.is_empty() {
            "I'm not following anyone yet.".to_string()
        } else {
            format!("I'm following: {}", names.join(", "))
        }
    }

    async fn handle_trust(&self, post: &Post, handle: &str, trusted: bool) -> String {
        let user_id = if handle == SELF_KEYWORD {
            post.user_id.clone()
        } else {
            match self.ctx.chat.user_by_username(handle).await {
                Ok(user) => user.id,
                Err(error) => return format!("error: {error}"),
            }
        };
        match self.ctx.state.set_trust(&user_id, trusted) {
            Ok(TrustChange::Updated) => {
                tracing::info!(%user_id, trusted, "trust updated");
                OK_REPLY.to_string()
            }
            Ok(TrustChange::Unchanged) if trusted => "already trusted".to_string(),
            Ok(TrustChange::Unchanged) => "already distrusted".to_string(),
            Err(error) => format!("error: {error:#}"),
        }
    }

    /// Deletes the bot's own top-level posts from the debug channel.
    ///
    /// Deleting shifts later history onto the current page, so a page is
    /// re-read until it yields no deletions and only then advanced.
    async fn handle_clear(&self) -> String {
        let Some(channel_id) = self.ctx.channels.debug_channel_id.as_deref() else {
            return "No DebugChannel set: there is nothing to clear!".to_string();
        };
        let per_page = self.ctx.settings.clear_page_size.max(1);
        let mut page = 0_u32;
        let mut removed = 0_usize;
        loop {
            let list = match self.ctx.chat.channel_posts(channel_id, page, per_page).await {
                Ok(list) => list,
                Err(error) => return format!("error: {error}"),
            };
            if list.is_empty() {
                break;
            }
            let mut deleted_on_page = 0_usize;
            for post in list.ordered() {
                if post.user_id != self.ctx.identity.user_id || post.is_reply() {
                    continue;
                }
                if let Err(error) = self.ctx.chat.delete_post(&post.id).await {
                    return format!("error: {error}");
                }
                deleted_on_page += 1;
            }
            removed += deleted_on_page;
            if deleted_on_page == 0 {
                page = page.saturating_add(1);
            }
        }
        tracing::info!(%channel_id, removed, "debug channel cleared");
        DONE_REPLY.to_string()
    }
}

#[async_trait]
impl EventHandler for CommandDispatcher {
    async fn handle_event(&self, event: PostedEvent) {
        self.dispatch(&event).await;
    }
}
