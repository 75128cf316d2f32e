//! Chat backend: the Mattermost REST v4 surface and websocket event stream.
//!
//! [`ChatBackend`] is the request/response seam the runtime depends on.
//! [`MattermostWebSocket`] is one physical event-stream connection; the
//! runtime owns reconnecting it.

mod api_client;
mod types;
mod websocket;

use async_trait::async_trait;
use thiserror::Error;

pub use api_client::MattermostApiClient;
pub use types::{AttachmentField, Channel, Post, PostList, SlackAttachment, Team, User};
pub use websocket::{
    parse_socket_event, websocket_url, MattermostWebSocket, PostedEvent, SocketRead,
};

#[derive(Debug, Error)]
/// Failure of a single chat backend call.
pub enum MattermostApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message} (status {status}, {id})")]
    Api {
        operation: &'static str,
        status: u16,
        id: String,
        message: String,
    },
    #[error("failed to decode mattermost {operation} response: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("mattermost {0} requires an authenticated session")]
    MissingToken(&'static str),
    #[error("invalid mattermost url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

#[async_trait]
/// Chat operations used by startup, the publisher and the command handlers.
pub trait ChatBackend: Send + Sync {
    async fn ping(&self) -> Result<(), MattermostApiError>;

    /// Password login; the session token is kept by the backend for later calls.
    async fn login(&self, login_id: &str, password: &str) -> Result<User, MattermostApiError>;

    /// The authenticated user.
    async fn me(&self) -> Result<User, MattermostApiError>;

    async fn team_by_name(&self, name: &str) -> Result<Team, MattermostApiError>;

    async fn channel_by_name(&self, team_id: &str, name: &str)
        -> Result<Channel, MattermostApiError>;

    async fn add_channel_member(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<(), MattermostApiError>;

    async fn create_post(&self, post: &Post) -> Result<Post, MattermostApiError>;

    async fn delete_post(&self, post_id: &str) -> Result<(), MattermostApiError>;

    async fn user_by_username(&self, username: &str) -> Result<User, MattermostApiError>;

    /// One page of channel history, newest first.
    async fn channel_posts(
        &self,
        channel_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<PostList, MattermostApiError>;
}
