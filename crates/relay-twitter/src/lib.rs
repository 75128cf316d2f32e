//! Feed backend: the Twitter v1.1 REST surface the relay consumes.
//!
//! [`FeedBackend`] is the seam the runtime depends on; [`TwitterApiClient`]
//! is the OAuth 1.0a signed implementation.

mod api_client;
mod oauth;
mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use api_client::{TwitterApiClient, DEFAULT_TWITTER_API_BASE};
pub use oauth::OAuthCredentials;
pub use types::{ExtendedEntities, ExtendedTweet, FriendsPage, MediaEntity, Tweet, TwitterUser};

/// Cursor value that requests the first page of a cursored listing.
pub const FIRST_PAGE_CURSOR: i64 = -1;

#[derive(Debug, Error)]
/// Failure of a single feed backend call.
pub enum TwitterApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("twitter {operation} failed with status {status}: {message}")]
    Api {
        operation: &'static str,
        status: u16,
        code: Option<i64>,
        message: String,
    },
    #[error("failed to decode twitter {operation} response: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to sign request: {0}")]
    Signing(String),
}

#[async_trait]
/// Feed operations used by the poller and the follow-graph commands.
pub trait FeedBackend: Send + Sync {
    /// Returns the authenticated account; used as the startup credential check.
    async fn verify_credentials(&self) -> Result<TwitterUser, TwitterApiError>;

    /// Fetches up to `count` home timeline items newer than `since_id`
    /// (`0` means no lower bound) in extended text mode.
    async fn home_timeline(&self, since_id: u64, count: usize)
        -> Result<Vec<Tweet>, TwitterApiError>;

    /// Fetches one page of followed accounts starting at `cursor`.
    async fn friends_page(&self, cursor: i64) -> Result<FriendsPage, TwitterApiError>;

    async fn follow(&self, screen_name: &str) -> Result<TwitterUser, TwitterApiError>;

    async fn unfollow(&self, screen_name: &str) -> Result<TwitterUser, TwitterApiError>;
}
