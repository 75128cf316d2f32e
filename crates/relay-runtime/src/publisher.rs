//! Renders feed items and command replies as chat posts.

use relay_mattermost::{
    AttachmentField, ChatBackend, MattermostApiError, Post, SlackAttachment,
};
use relay_twitter::Tweet;

/// A feed item ready to send: the main post plus one image-only post per
/// extra photo.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedItem {
    pub primary: Post,
    pub extra_images: Vec<Post>,
}

impl RenderedItem {
    pub fn posts(&self) -> impl Iterator<Item = &Post> {
        std::iter::once(&self.primary).chain(self.extra_images.iter())
    }
}

fn profile_link(screen_name: &str) -> String {
    format!("@[{screen_name}](https://twitter.com/{screen_name})")
}

/// Text shown for a feed item. Reshares show the original author and body;
/// quotes append the quoted item below the sharer's own text.
pub fn render_body(tweet: &Tweet) -> String {
    if let Some(original) = tweet.retweeted_status.as_deref() {
        return format!(
            " RT {}\n> {}",
            profile_link(&original.user.screen_name),
            original.body()
        );
    }
    let mut body = tweet.body().to_string();
    if let Some(quoted) = tweet.quoted_status.as_deref() {
        body.push_str(&format!(
            "\n> QT {}\n> {}",
            profile_link(&quoted.user.screen_name),
            quoted.body()
        ));
    }
    body
}

fn photo_urls(tweet: &Tweet) -> Vec<String> {
    let own = tweet.photo_urls();
    let photos = match tweet.retweeted_status.as_deref() {
        Some(original) if own.is_empty() => original.photo_urls(),
        _ => own,
    };
    photos.into_iter().map(str::to_string).collect()
}

pub fn render_tweet(tweet: &Tweet, channel_id: &str) -> RenderedItem {
    let mut photos = photo_urls(tweet).into_iter();
    let attachment = SlackAttachment {
        fallback: format!("{}: {}", tweet.user.name, tweet.body()),
        title: tweet.user.name.clone(),
        title_link: tweet.permalink(),
        thumb_url: tweet.user.profile_image_url_https.clone(),
        image_url: photos.next().unwrap_or_default(),
        fields: vec![AttachmentField {
            value: render_body(tweet),
            ..AttachmentField::default()
        }],
    };
    let extra_images = photos
        .map(|image_url| {
            Post::new(channel_id, "").with_attachment(SlackAttachment {
                image_url,
                ..SlackAttachment::default()
            })
        })
        .collect();
    RenderedItem {
        primary: Post::new(channel_id, "").with_attachment(attachment),
        extra_images,
    }
}

/// Sends every post of a rendered item; stops at the first failure.
pub async fn publish_tweet(
    chat: &dyn ChatBackend,
    channel_id: &str,
    tweet: &Tweet,
) -> Result<(), MattermostApiError> {
    let rendered = render_tweet(tweet, channel_id);
    for post in rendered.posts() {
        chat.create_post(post).await?;
    }
    Ok(())
}

/// Posts `message` as a threaded reply. Failures are logged only.
pub async fn reply_to_post(chat: &dyn ChatBackend, post: &Post, message: &str) {
    let reply = Post::new(post.channel_id.clone(), message).in_thread(post.thread_root());
    match chat.create_post(&reply).await {
        Ok(_) => tracing::debug!(channel_id = %post.channel_id, "reply sent"),
        Err(error) => tracing::warn!(%error, channel_id = %post.channel_id, "reply failed"),
    }
}
