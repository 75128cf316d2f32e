use relay_mattermost::Post;

use crate::context::BotContext;

/// Reports a background failure to the debug channel, or to the log when no
/// debug channel is configured. Never fails.
pub async fn report(ctx: &BotContext, message: &str) {
    let Some(channel_id) = ctx.channels.debug_channel_id.as_deref() else {
        tracing::warn!(diagnostic = message, "no debug channel configured");
        return;
    };
    if let Err(error) = ctx.chat.create_post(&Post::new(channel_id, message)).await {
        tracing::warn!(%error, diagnostic = message, "failed to send debug message");
    }
}
