//! Mattermost REST v4 client.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use relay_core::truncate_for_error;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::{ChatBackend, Channel, MattermostApiError, Post, PostList, Team, User};

const ERROR_BODY_LIMIT: usize = 320;

#[derive(Debug, Deserialize)]
struct MattermostErrorBody {
    #[serde(default)]
    id: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug)]
pub struct MattermostApiClient {
    http: reqwest::Client,
    server_url: String,
    token: RwLock<Option<String>>,
}

impl MattermostApiClient {
    /// `token` is a personal access token; pass `None` to log in with a
    /// password later.
    pub fn new(
        server_url: &str,
        token: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, MattermostApiError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("mattermost-twitter-relay"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(request_timeout.max(Duration::from_millis(1)))
            .build()?;
        Ok(Self {
            http,
            server_url: server_url.trim_end_matches('/').to_string(),
            token: RwLock::new(token.filter(|token| !token.trim().is_empty())),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Current session token, if authenticated.
    pub fn token(&self) -> Option<String> {
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_token(&self, token: String) {
        match self.token.write() {
            Ok(mut guard) => *guard = Some(token),
            Err(poisoned) => *poisoned.into_inner() = Some(token),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<url::Url, MattermostApiError> {
        let invalid = |reason: String| MattermostApiError::InvalidUrl {
            url: self.server_url.clone(),
            reason,
        };
        let mut url = url::Url::parse(&self.server_url).map_err(|error| invalid(error.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["api", "v4"])
            .extend(segments);
        Ok(url)
    }

    fn authorized(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, MattermostApiError> {
        let token = self
            .token()
            .ok_or(MattermostApiError::MissingToken(operation))?;
        Ok(request.bearer_auth(token))
    }

    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, MattermostApiError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let (id, message) = match serde_json::from_str::<MattermostErrorBody>(&body) {
            Ok(parsed) if !parsed.message.is_empty() => (parsed.id, parsed.message),
            _ => (String::new(), truncate_for_error(&body, ERROR_BODY_LIMIT)),
        };
        tracing::debug!(operation, status = status.as_u16(), error_id = %id, "mattermost request failed");
        Err(MattermostApiError::Api {
            operation,
            status: status.as_u16(),
            id,
            message,
        })
    }

    async fn decode<T>(
        operation: &'static str,
        response: reqwest::Response,
    ) -> Result<T, MattermostApiError>
    where
        T: DeserializeOwned,
    {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|source| MattermostApiError::Decode { operation, source })
    }

    async fn get_json<T>(
        &self,
        operation: &'static str,
        segments: &[&str],
    ) -> Result<T, MattermostApiError>
    where
        T: DeserializeOwned,
    {
        let request = self.authorized(operation, self.http.get(self.endpoint(segments)?))?;
        let response = self.send(operation, request).await?;
        Self::decode(operation, response).await
    }
}

#[async_trait]
impl ChatBackend for MattermostApiClient {
    async fn ping(&self) -> Result<(), MattermostApiError> {
        let request = self.http.get(self.endpoint(&["system", "ping"])?);
        self.send("system/ping", request).await?;
        Ok(())
    }

    async fn login(&self, login_id: &str, password: &str) -> Result<User, MattermostApiError> {
        let operation = "users/login";
        let request = self
            .http
            .post(self.endpoint(&["users", "login"])?)
            .json(&json!({ "login_id": login_id, "password": password }));
        let response = self.send(operation, request).await?;
        let token = response
            .headers()
            .get("Token")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or(MattermostApiError::MissingToken(operation))?;
        self.set_token(token);
        Self::decode(operation, response).await
    }

    async fn me(&self) -> Result<User, MattermostApiError> {
        self.get_json("users/me", &["users", "me"]).await
    }

    async fn team_by_name(&self, name: &str) -> Result<Team, MattermostApiError> {
        self.get_json("teams/name", &["teams", "name", name]).await
    }

    async fn channel_by_name(
        &self,
        team_id: &str,
        name: &str,
    ) -> Result<Channel, MattermostApiError> {
        self.get_json(
            "channels/name",
            &["teams", team_id, "channels", "name", name],
        )
        .await
    }

    async fn add_channel_member(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<(), MattermostApiError> {
        let operation = "channels/members";
        let request = self.authorized(
            operation,
            self.http
                .post(self.endpoint(&["channels", channel_id, "members"])?)
                .json(&json!({ "user_id": user_id })),
        )?;
        self.send(operation, request).await?;
        Ok(())
    }

    async fn create_post(&self, post: &Post) -> Result<Post, MattermostApiError> {
        let operation = "posts/create";
        let request = self.authorized(
            operation,
            self.http.post(self.endpoint(&["posts"])?).json(post),
        )?;
        let response = self.send(operation, request).await?;
        Self::decode(operation, response).await
    }

    async fn delete_post(&self, post_id: &str) -> Result<(), MattermostApiError> {
        let operation = "posts/delete";
        let request =
            self.authorized(operation, self.http.delete(self.endpoint(&["posts", post_id])?))?;
        self.send(operation, request).await?;
        Ok(())
    }

    async fn user_by_username(&self, username: &str) -> Result<User, MattermostApiError> {
        self.get_json("users/username", &["users", "username", username])
            .await
    }

    async fn channel_posts(
        &self,
        channel_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<PostList, MattermostApiError> {
        let operation = "channels/posts";
        let request = self.authorized(
            operation,
            self.http
                .get(self.endpoint(&["channels", channel_id, "posts"])?)
                .query(&[("page", page), ("per_page", per_page)]),
        )?;
        let response = self.send(operation, request).await?;
        Self::decode(operation, response).await
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn client(server: &MockServer, token: Option<&str>) -> MattermostApiClient {
        MattermostApiClient::new(
            &server.base_url(),
            token.map(str::to_string),
            Duration::from_secs(5),
        )
        .expect("client")
    }

    #[tokio::test]
    async fn functional_login_stores_session_token_for_later_calls() {
        let server = MockServer::start();
        let login = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v4/users/login")
                .json_body(json!({ "login_id": "bot", "password": "secret" }));
            then.status(200)
                .header("Token", "session-token")
                .json_body(json!({ "id": "bot-id", "username": "bot" }));
        });
        let me = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v4/users/me")
                .header("authorization", "Bearer session-token");
            then.status(200)
                .json_body(json!({ "id": "bot-id", "username": "bot" }));
        });

        let client = client(&server, None);
        assert!(matches!(
            client.me().await,
            Err(MattermostApiError::MissingToken("users/me"))
        ));
        let user = client.login("bot", "secret").await.expect("login");
        assert_eq!(user.id, "bot-id");
        assert_eq!(client.token().as_deref(), Some("session-token"));
        client.me().await.expect("me");
        login.assert();
        me.assert();
    }

    #[tokio::test]
    async fn functional_channel_posts_sends_paging_query() {
        let server = MockServer::start();
        let posts = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v4/channels/c9/posts")
                .query_param("page", "2")
                .query_param("per_page", "50");
            then.status(200).json_body(json!({
                "order": ["p2", "p1"],
                "posts": {
                    "p1": { "id": "p1", "user_id": "bot-id", "message": "one" },
                    "p2": { "id": "p2", "user_id": "bot-id", "message": "two" }
                }
            }));
        });

        let list = client(&server, Some("pat"))
            .channel_posts("c9", 2, 50)
            .await
            .expect("posts");
        posts.assert();
        assert_eq!(list.order, vec!["p2", "p1"]);
    }

    #[tokio::test]
    async fn functional_create_and_delete_post_use_bearer_token() {
        let server = MockServer::start();
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v4/posts")
                .header("authorization", "Bearer pat")
                .json_body(json!({ "channel_id": "c1", "root_id": "r1", "message": "pong" }));
            then.status(201).json_body(json!({
                "id": "p5", "channel_id": "c1", "root_id": "r1", "message": "pong"
            }));
        });
        let delete = server.mock(|when, then| {
            when.method(DELETE).path("/api/v4/posts/p5");
            then.status(200).json_body(json!({ "status": "OK" }));
        });

        let client = client(&server, Some("pat"));
        let created = client
            .create_post(&Post::new("c1", "pong").in_thread("r1"))
            .await
            .expect("create");
        assert_eq!(created.id, "p5");
        client.delete_post(&created.id).await.expect("delete");
        create.assert();
        delete.assert();
    }

    #[tokio::test]
    async fn regression_api_error_carries_mattermost_message() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/v4/users/username/ghost");
            then.status(404).json_body(json!({
                "id": "app.user.missing_account.const",
                "message": "We couldn't find an existing account matching your username.",
                "status_code": 404
            }));
        });

        let error = client(&server, Some("pat"))
            .user_by_username("ghost")
            .await
            .expect_err("missing user");
        assert!(matches!(error, MattermostApiError::Api { status: 404, .. }));
        assert_eq!(
            error.to_string(),
            "We couldn't find an existing account matching your username. (status 404, app.user.missing_account.const)"
        );
    }

    #[test]
    fn unit_endpoint_keeps_server_path_prefix() {
        let client = MattermostApiClient::new(
            "https://chat.example.com/mm/",
            None,
            Duration::from_secs(1),
        )
        .expect("client");
        let url = client
            .endpoint(&["teams", "name", "dev team"])
            .expect("endpoint");
        assert_eq!(
            url.as_str(),
            "https://chat.example.com/mm/api/v4/teams/name/dev%20team"
        );
    }
}
