//! One physical Mattermost websocket connection and its event parsing.

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::{MattermostApiError, Post};

/// A `posted` event decoded from the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct PostedEvent {
    pub post: Post,
    /// Direct messages skip the mention prefix requirement.
    pub is_direct: bool,
}

/// Outcome of reading one websocket frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketRead {
    Posted(PostedEvent),
    Ignored,
    Closed,
}

#[derive(Debug, Deserialize)]
struct SocketEnvelope {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Maps the chat base URL to its websocket endpoint (`http` to `ws`,
/// `https` to `wss`).
pub fn websocket_url(server_url: &str) -> Result<String, MattermostApiError> {
    let invalid = |reason: String| MattermostApiError::InvalidUrl {
        url: server_url.to_string(),
        reason,
    };
    let mut url = url::Url::parse(server_url.trim_end_matches('/'))
        .map_err(|error| invalid(error.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid(format!("unsupported scheme '{other}'"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| invalid(format!("cannot switch scheme to {scheme}")))?;
    url.path_segments_mut()
        .map_err(|_| invalid("url cannot be a base".to_string()))?
        .pop_if_empty()
        .extend(["api", "v4", "websocket"]);
    Ok(url.to_string())
}

pub fn parse_socket_event(message: WsMessage) -> SocketRead {
    match message {
        WsMessage::Text(text) => parse_event_text(&text),
        WsMessage::Binary(bytes) => match std::str::from_utf8(&bytes) {
            Ok(text) => parse_event_text(text),
            Err(error) => {
                tracing::debug!(%error, "dropping non utf-8 websocket frame");
                SocketRead::Ignored
            }
        },
        WsMessage::Close(_) => SocketRead::Closed,
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => SocketRead::Ignored,
    }
}

fn parse_event_text(text: &str) -> SocketRead {
    let envelope = match serde_json::from_str::<SocketEnvelope>(text) {
        Ok(envelope) => envelope,
        Err(error) => {
            tracing::debug!(%error, "dropping malformed websocket frame");
            return SocketRead::Ignored;
        }
    };
    if envelope.event.as_deref() != Some("posted") {
        return SocketRead::Ignored;
    }
    // `data.post` is itself JSON encoded as a string.
    let Some(raw_post) = envelope.data.get("post").and_then(Value::as_str) else {
        tracing::debug!("dropping posted event without post payload");
        return SocketRead::Ignored;
    };
    let post = match serde_json::from_str::<Post>(raw_post) {
        Ok(post) => post,
        Err(error) => {
            tracing::debug!(%error, "dropping posted event with malformed post");
            return SocketRead::Ignored;
        }
    };
    let is_direct = envelope.data.get("channel_type").and_then(Value::as_str) == Some("D");
    SocketRead::Posted(PostedEvent { post, is_direct })
}

pub struct MattermostWebSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl MattermostWebSocket {
    /// Opens the websocket and sends the authentication challenge.
    pub async fn connect(server_url: &str, token: &str) -> Result<Self, MattermostApiError> {
        let url = websocket_url(server_url)?;
        let (mut stream, _response) = connect_async(url.as_str()).await?;
        let challenge = json!({
            "seq": 1,
            "action": "authentication_challenge",
            "data": { "token": token },
        })
        .to_string();
        stream.send(WsMessage::Text(challenge.into())).await?;
        Ok(Self { stream })
    }

    pub async fn read(&mut self) -> Result<SocketRead, MattermostApiError> {
        match self.stream.next().await {
            None => Ok(SocketRead::Closed),
            Some(Ok(message)) => Ok(parse_socket_event(message)),
            Some(Err(error)) => Err(error.into()),
        }
    }

    /// Next `posted` event; `None` once the peer closes the stream.
    pub async fn next_posted(&mut self) -> Result<Option<PostedEvent>, MattermostApiError> {
        loop {
            match self.read().await? {
                SocketRead::Posted(event) => return Ok(Some(event)),
                SocketRead::Ignored => continue,
                SocketRead::Closed => return Ok(None),
            }
        }
    }

    pub async fn close(&mut self) {
        if let Err(error) = self.stream.close(None).await {
            tracing::debug!(%error, "websocket close handshake failed");
        }
    }
}
