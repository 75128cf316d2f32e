//! In-process chat and feed backends for runtime tests.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use relay_mattermost::{
    ChatBackend, Channel, MattermostApiError, Post, PostList, Team, User,
};
use relay_state::StateStore;
use relay_twitter::{FeedBackend, FriendsPage, Tweet, TwitterApiError, TwitterUser};
use serde_json::json;

use crate::context::{BotChannels, BotContext, BotIdentity, RuntimeSettings};

pub(crate) const BOT_ID: &str = "bot-id";

pub(crate) fn api_error(status: u16, message: &str) -> MattermostApiError {
    MattermostApiError::Api {
        operation: "test",
        status,
        id: "test.error".to_string(),
        message: message.to_string(),
    }
}

pub(crate) fn feed_error(message: &str) -> TwitterApiError {
    TwitterApiError::Api {
        operation: "test",
        status: 500,
        code: Some(131),
        message: message.to_string(),
    }
}

pub(crate) fn tweet(id: u64, text: &str) -> Tweet {
    serde_json::from_value(json!({
        "id": id,
        "full_text": text,
        "user": { "name": "Ferris", "screen_name": "ferris" }
    }))
    .expect("tweet")
}

pub(crate) fn user_post(id: &str, user_id: &str, message: &str) -> Post {
    let mut post = Post::new("town-square", message);
    post.id = id.to_string();
    post.user_id = user_id.to_string();
    post
}

#[derive(Default)]
struct FakeChatState {
    sent: Vec<Post>,
    sent_state_files: Vec<Option<String>>,
    users: BTreeMap<String, String>,
    history: Vec<Post>,
    failing_deletes: Vec<String>,
    fail_posts: bool,
    deleted: Vec<String>,
    next_post_id: u64,
}

/// Records every post; serves user lookups and one channel history.
#[derive(Default)]
pub(crate) struct FakeChat {
    inner: Mutex<FakeChatState>,
    observed_file: Mutex<Option<PathBuf>>,
}

impl FakeChat {
    pub(crate) fn with_user(self, username: &str, user_id: &str) -> Self {
        self.lock()
            .users
            .insert(username.to_string(), user_id.to_string());
        self
    }

    pub(crate) fn with_history(self, posts: Vec<Post>) -> Self {
        self.lock().history = posts;
        self
    }

    pub(crate) fn failing_delete(self, post_id: &str) -> Self {
        self.lock().failing_deletes.push(post_id.to_string());
        self
    }

    pub(crate) fn failing_posts(self) -> Self {
        self.lock().fail_posts = true;
        self
    }

    /// Captures the content of `path` every time a post is sent.
    pub(crate) fn observe_file(&self, path: &Path) {
        *self.observed_file.lock().expect("observed file") = Some(path.to_path_buf());
    }

    pub(crate) fn sent(&self) -> Vec<Post> {
        self.lock().sent.clone()
    }

    pub(crate) fn sent_messages(&self) -> Vec<String> {
        self.lock()
            .sent
            .iter()
            .map(|post| post.message.clone())
            .collect()
    }

    pub(crate) fn sent_state_files(&self) -> Vec<Option<String>> {
        self.lock().sent_state_files.clone()
    }

    pub(crate) fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    pub(crate) fn history_ids(&self) -> Vec<String> {
        self.lock()
            .history
            .iter()
            .map(|post| post.id.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeChatState> {
        self.inner.lock().expect("fake chat lock")
    }
}

#[async_trait]
impl ChatBackend for FakeChat {
    async fn ping(&self) -> Result<(), MattermostApiError> {
        Ok(())
    }

    async fn login(&self, login_id: &str, _password: &str) -> Result<User, MattermostApiError> {
        Ok(User {
            id: BOT_ID.to_string(),
            username: login_id.to_string(),
        })
    }

    async fn me(&self) -> Result<User, MattermostApiError> {
        Ok(User {
            id: BOT_ID.to_string(),
            username: "bot".to_string(),
        })
    }

    async fn team_by_name(&self, name: &str) -> Result<Team, MattermostApiError> {
        Ok(Team {
            id: format!("team-{name}"),
            name: name.to_string(),
        })
    }

    async fn channel_by_name(
        &self,
        team_id: &str,
        name: &str,
    ) -> Result<Channel, MattermostApiError> {
        if name == "missing" {
            return Err(api_error(404, "channel not found"));
        }
        Ok(Channel {
            id: format!("channel-{name}"),
            name: name.to_string(),
            team_id: team_id.to_string(),
        })
    }

    async fn add_channel_member(
        &self,
        _channel_id: &str,
        _user_id: &str,
    ) -> Result<(), MattermostApiError> {
        Ok(())
    }

    async fn create_post(&self, post: &Post) -> Result<Post, MattermostApiError> {
        let observed = self
            .observed_file
            .lock()
            .expect("observed file")
            .clone()
            .map(|path| std::fs::read_to_string(path).ok());
        let mut state = self.lock();
        if state.fail_posts {
            return Err(api_error(500, "post rejected"));
        }
        state.next_post_id += 1;
        let mut created = post.clone();
        created.id = format!("sent-{}", state.next_post_id);
        created.user_id = BOT_ID.to_string();
        state.sent.push(created.clone());
        state.sent_state_files.push(observed.flatten());
        Ok(created)
    }

    async fn delete_post(&self, post_id: &str) -> Result<(), MattermostApiError> {
        let mut state = self.lock();
        if state.failing_deletes.iter().any(|id| id == post_id) {
            return Err(api_error(403, "delete forbidden"));
        }
        state.history.retain(|post| post.id != post_id);
        state.deleted.push(post_id.to_string());
        Ok(())
    }

    async fn user_by_username(&self, username: &str) -> Result<User, MattermostApiError> {
        self.lock()
            .users
            .get(username)
            .map(|id| User {
                id: id.clone(),
                username: username.to_string(),
            })
            .ok_or_else(|| api_error(404, "user not found"))
    }

    async fn channel_posts(
        &self,
        _channel_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<PostList, MattermostApiError> {
        let state = self.lock();
        let start = (page as usize).saturating_mul(per_page as usize);
        let page_posts = state
            .history
            .iter()
            .skip(start)
            .take(per_page as usize)
            .cloned()
            .collect::<Vec<_>>();
        Ok(PostList {
            order: page_posts.iter().map(|post| post.id.clone()).collect(),
            posts: page_posts
                .into_iter()
                .map(|post| (post.id.clone(), post))
                .collect(),
        })
    }
}

#[derive(Default)]
struct FakeFeedState {
    timelines: VecDeque<Result<Vec<Tweet>, TwitterApiError>>,
    timeline_requests: Vec<(u64, usize)>,
    friends: BTreeMap<i64, FriendsPage>,
    followed: Vec<String>,
    unfollowed: Vec<String>,
    follow_error: Option<String>,
    follow_delay: Option<Duration>,
    follow_attempts: usize,
}

/// Serves scripted timeline responses and a cursored friends listing.
#[derive(Default)]
pub(crate) struct FakeFeed {
    inner: Mutex<FakeFeedState>,
}

impl FakeFeed {
    pub(crate) fn with_timeline(self, tweets: Vec<Tweet>) -> Self {
        self.lock().timelines.push_back(Ok(tweets));
        self
    }

    pub(crate) fn with_timeline_error(self, message: &str) -> Self {
        self.lock().timelines.push_back(Err(feed_error(message)));
        self
    }

    pub(crate) fn with_friends_page(self, cursor: i64, names: &[&str], next_cursor: i64) -> Self {
        let users = names
            .iter()
            .map(|name| TwitterUser {
                screen_name: name.to_string(),
                ..TwitterUser::default()
            })
            .collect();
        self.lock()
            .friends
            .insert(cursor, FriendsPage { users, next_cursor });
        self
    }

    pub(crate) fn failing_follow(self, message: &str) -> Self {
        self.lock().follow_error = Some(message.to_string());
        self
    }

    /// Follow and unfollow calls wait `delay` before answering.
    pub(crate) fn stalled_follow(self, delay: Duration) -> Self {
        self.lock().follow_delay = Some(delay);
        self
    }

    pub(crate) fn follow_attempts(&self) -> usize {
        self.lock().follow_attempts
    }

    pub(crate) fn timeline_requests(&self) -> Vec<(u64, usize)> {
        self.lock().timeline_requests.clone()
    }

    pub(crate) fn followed(&self) -> Vec<String> {
        self.lock().followed.clone()
    }

    pub(crate) fn unfollowed(&self) -> Vec<String> {
        self.lock().unfollowed.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeFeedState> {
        self.inner.lock().expect("fake feed lock")
    }

    async fn relationship(&self, screen_name: &str) -> Result<TwitterUser, TwitterApiError> {
        let delay = {
            let mut state = self.lock();
            state.follow_attempts += 1;
            state.follow_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.lock().follow_error.clone() {
            return Err(feed_error(&message));
        }
        Ok(TwitterUser {
            screen_name: screen_name.to_string(),
            ..TwitterUser::default()
        })
    }
}

#[async_trait]
impl FeedBackend for FakeFeed {
    async fn verify_credentials(&self) -> Result<TwitterUser, TwitterApiError> {
        Ok(TwitterUser {
            screen_name: "relay".to_string(),
            ..TwitterUser::default()
        })
    }

    async fn home_timeline(
        &self,
        since_id: u64,
        count: usize,
    ) -> Result<Vec<Tweet>, TwitterApiError> {
        let mut state = self.lock();
        state.timeline_requests.push((since_id, count));
        state.timelines.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn friends_page(&self, cursor: i64) -> Result<FriendsPage, TwitterApiError> {
        Ok(self
            .lock()
            .friends
            .get(&cursor)
            .cloned()
            .unwrap_or_default())
    }

    async fn follow(&self, screen_name: &str) -> Result<TwitterUser, TwitterApiError> {
        let user = self.relationship(screen_name).await?;
        self.lock().followed.push(screen_name.to_string());
        Ok(user)
    }

    async fn unfollow(&self, screen_name: &str) -> Result<TwitterUser, TwitterApiError> {
        let user = self.relationship(screen_name).await?;
        self.lock().unfollowed.push(screen_name.to_string());
        Ok(user)
    }
}

pub(crate) struct Harness {
    pub(crate) chat: Arc<FakeChat>,
    pub(crate) feed: Arc<FakeFeed>,
    pub(crate) ctx: Arc<BotContext>,
    pub(crate) state_path: PathBuf,
    _dir: tempfile::TempDir,
}

pub(crate) fn harness(chat: FakeChat, feed: FakeFeed) -> Harness {
    harness_with(chat, feed, Some("channel-twitter-debug"), |_| {})
}

pub(crate) fn harness_with(
    chat: FakeChat,
    feed: FakeFeed,
    debug_channel: Option<&str>,
    seed: impl FnOnce(&StateStore),
) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let state_path = dir.path().join("mattermost.json");
    let state = StateStore::load(&state_path).expect("load state");
    seed(&state);
    let chat = Arc::new(chat);
    let feed = Arc::new(feed);
    let ctx = Arc::new(BotContext::new(
        chat.clone(),
        feed.clone(),
        Arc::new(state),
        BotIdentity {
            user_id: BOT_ID.to_string(),
            username: "bot".to_string(),
        },
        BotChannels {
            main_channel_id: "channel-twitter".to_string(),
            debug_channel_id: debug_channel.map(str::to_string),
        },
        RuntimeSettings {
            max_items: 20,
            clear_page_size: 2,
            ..RuntimeSettings::default()
        },
    ));
    Harness {
        chat,
        feed,
        ctx,
        state_path,
        _dir: dir,
    }
}
