use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use httpmock::prelude::*;
use relay_mattermost::{MattermostApiClient, Post, PostedEvent};
use relay_runtime::{
    check_timeline, BotChannels, BotContext, BotIdentity, CommandDispatcher, RuntimeSettings,
};
use relay_state::{BotState, StateStore, TrustStore};
use relay_twitter::{OAuthCredentials, TwitterApiClient};
use serde_json::{json, Value};
use tempfile::TempDir;

const MAIN_CHANNEL: &str = "main-channel";
const DEBUG_CHANNEL: &str = "debug-channel";
const COMMAND_CHANNEL: &str = "town-square";

struct Backends {
    chat: MockServer,
    feed: MockServer,
    _dir: TempDir,
    state_path: PathBuf,
    ctx: Arc<BotContext>,
}

fn credentials() -> OAuthCredentials {
    OAuthCredentials {
        consumer_key: "ck".to_string(),
        consumer_secret: "cs".to_string(),
        access_token: "at".to_string(),
        access_secret: "as".to_string(),
    }
}

fn backends(state: BotState) -> Backends {
    let chat = MockServer::start();
    let feed = MockServer::start();
    let dir = tempfile::tempdir().expect("tempdir");
    let state_path = dir.path().join("mattermost.json");

    let chat_client = MattermostApiClient::new(
        &chat.base_url(),
        Some("pat".to_string()),
        Duration::from_secs(5),
    )
    .expect("chat client");
    let feed_client = TwitterApiClient::new(&feed.base_url(), credentials(), Duration::from_secs(5))
        .expect("feed client");

    let ctx = Arc::new(BotContext::new(
        Arc::new(chat_client),
        Arc::new(feed_client),
        Arc::new(StateStore::with_state(&state_path, state)),
        BotIdentity {
            user_id: "bot-id".to_string(),
            username: "relaybot".to_string(),
        },
        BotChannels {
            main_channel_id: MAIN_CHANNEL.to_string(),
            debug_channel_id: Some(DEBUG_CHANNEL.to_string()),
        },
        RuntimeSettings {
            max_items: 20,
            ..RuntimeSettings::default()
        },
    ));
    Backends {
        chat,
        feed,
        _dir: dir,
        state_path,
        ctx,
    }
}

fn tweet(id: u64, text: &str) -> Value {
    json!({
        "id": id,
        "full_text": text,
        "user": {
            "name": "Rust Language",
            "screen_name": "rustlang",
            "profile_image_url_https": "https://pbs.example/rust.png"
        }
    })
}

fn command(user_id: &str, message: &str) -> PostedEvent {
    let mut post = Post::new(COMMAND_CHANNEL, message);
    post.id = "cmd-post".to_string();
    post.user_id = user_id.to_string();
    PostedEvent {
        post,
        is_direct: false,
    }
}

fn persisted_cursor(path: &Path) -> u64 {
    let raw = std::fs::read_to_string(path).expect("state file");
    let value: Value = serde_json::from_str(&raw).expect("state json");
    value["lastPost"].as_u64().expect("lastPost")
}

#[tokio::test]
async fn integration_poll_forwards_new_items_and_persists_cursor() {
    let backends = backends(BotState {
        last_post: 10,
        ..BotState::default()
    });
    let timeline = backends.feed.mock(|when, then| {
        when.method(GET)
            .path("/statuses/home_timeline.json")
            .query_param("since_id", "10")
            .query_param("count", "20")
            .query_param("tweet_mode", "extended")
            .header_exists("authorization");
        then.status(200).json_body(json!([
            tweet(13, "third"),
            tweet(11, "first"),
            tweet(12, "second"),
            tweet(9, "stale")
        ]));
    });
    let posts = backends.chat.mock(|when, then| {
        when.method(POST)
            .path("/api/v4/posts")
            .header("authorization", "Bearer pat")
            .json_body_includes(json!({ "channel_id": MAIN_CHANNEL }).to_string());
        then.status(201)
            .json_body(json!({ "id": "p1", "channel_id": MAIN_CHANNEL }));
    });

    let report = check_timeline(&backends.ctx).await.expect("poll");

    timeline.assert_calls(1);
    posts.assert_calls(3);
    assert_eq!(report.fetched, 3);
    assert_eq!(report.published, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(report.cursor, 13);
    assert_eq!(persisted_cursor(&backends.state_path), 13);
}

#[tokio::test]
async fn integration_follow_command_calls_feed_and_replies_in_thread() {
    let backends = backends(BotState::default());
    let follow = backends.feed.mock(|when, then| {
        when.method(POST)
            .path("/friendships/create.json")
            .body("screen_name=rustlang");
        then.status(200)
            .json_body(json!({ "id": 7, "screen_name": "rustlang" }));
    });
    let reply = backends.chat.mock(|when, then| {
        when.method(POST).path("/api/v4/posts").json_body_includes(
            json!({
                "channel_id": COMMAND_CHANNEL,
                "root_id": "cmd-post",
                "message": "Ok!"
            })
            .to_string(),
        );
        then.status(201).json_body(json!({ "id": "reply-1" }));
    });

    let dispatcher = CommandDispatcher::new(Arc::clone(&backends.ctx));
    let sent = dispatcher
        .dispatch(&command("alice", "@relaybot follow @rustlang"))
        .await;

    assert_eq!(sent.as_deref(), Some("Ok!"));
    follow.assert_calls(1);
    reply.assert_calls(1);
}

#[tokio::test]
async fn integration_untrusted_caller_is_refused_without_backend_calls() {
    let mut trusted = TrustStore::new();
    trusted.set("alice", true);
    let backends = backends(BotState {
        trusted,
        ..BotState::default()
    });
    let follow = backends.feed.mock(|when, then| {
        when.method(POST).path("/friendships/create.json");
        then.status(200).json_body(json!({}));
    });
    let reply = backends.chat.mock(|when, then| {
        when.method(POST).path("/api/v4/posts").json_body_includes(
            json!({ "message": "Sorry, I don't trust you :/" }).to_string(),
        );
        then.status(201).json_body(json!({ "id": "reply-1" }));
    });

    let dispatcher = CommandDispatcher::new(Arc::clone(&backends.ctx));
    let sent = dispatcher
        .dispatch(&command("mallory", "@relaybot follow rustlang"))
        .await;

    assert_eq!(sent.as_deref(), Some("Sorry, I don't trust you :/"));
    follow.assert_calls(0);
    reply.assert_calls(1);
}

#[tokio::test]
async fn integration_check_command_runs_a_poll_cycle() {
    let backends = backends(BotState::default());
    let timeline = backends.feed.mock(|when, then| {
        when.method(GET).path("/statuses/home_timeline.json");
        then.status(200).json_body(json!([tweet(42, "fresh")]));
    });
    let forwarded = backends.chat.mock(|when, then| {
        when.method(POST)
            .path("/api/v4/posts")
            .json_body_includes(json!({ "channel_id": MAIN_CHANNEL, "message": "" }).to_string());
        then.status(201).json_body(json!({ "id": "feed-1" }));
    });
    let reply = backends.chat.mock(|when, then| {
        when.method(POST)
            .path("/api/v4/posts")
            .json_body_includes(
                json!({
                    "channel_id": COMMAND_CHANNEL,
                    "root_id": "cmd-post",
                    "message": "done!"
                })
                .to_string(),
            );
        then.status(201).json_body(json!({ "id": "reply-1" }));
    });

    let dispatcher = CommandDispatcher::new(Arc::clone(&backends.ctx));
    let sent = dispatcher.dispatch(&command("alice", "@relaybot check")).await;

    assert_eq!(sent.as_deref(), Some("done!"));
    timeline.assert_calls(1);
    forwarded.assert_calls(1);
    reply.assert_calls(1);
    assert_eq!(persisted_cursor(&backends.state_path), 42);
}

#[tokio::test]
async fn integration_check_reports_feed_outage_and_keeps_cursor() {
    let backends = backends(BotState {
        last_post: 5,
        ..BotState::default()
    });
    backends.feed.mock(|when, then| {
        when.method(GET).path("/statuses/home_timeline.json");
        then.status(429).json_body(json!({
            "errors": [{ "code": 88, "message": "Rate limit exceeded" }]
        }));
    });
    let reply = backends.chat.mock(|when, then| {
        when.method(POST).path("/api/v4/posts").json_body_includes(
            json!({ "root_id": "cmd-post" }).to_string(),
        );
        then.status(201).json_body(json!({ "id": "reply-1" }));
    });

    let dispatcher = CommandDispatcher::new(Arc::clone(&backends.ctx));
    let sent = dispatcher
        .dispatch(&command("alice", "@relaybot check"))
        .await
        .expect("reply");

    assert!(sent.starts_with("error: "), "{sent}");
    assert!(sent.contains("Rate limit exceeded"), "{sent}");
    reply.assert_calls(1);
    assert_eq!(backends.ctx.state.feed_cursor().expect("cursor"), 5);
}
