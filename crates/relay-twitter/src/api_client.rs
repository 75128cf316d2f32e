//! Signed Twitter v1.1 REST client.

use std::time::Duration;

use async_trait::async_trait;
use relay_core::{current_unix_timestamp, truncate_for_error};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::oauth::{authorization_header, OAuthCredentials, OAuthNonce};
use crate::{FeedBackend, FriendsPage, Tweet, TwitterApiError, TwitterUser};

pub const DEFAULT_TWITTER_API_BASE: &str = "https://api.twitter.com/1.1";

const ERROR_BODY_LIMIT: usize = 320;

#[derive(Debug, Deserialize)]
struct TwitterErrorBody {
    #[serde(default)]
    errors: Vec<TwitterErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct TwitterErrorEntry {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

#[derive(Clone)]
pub struct TwitterApiClient {
    http: reqwest::Client,
    api_base: String,
    credentials: OAuthCredentials,
}

impl TwitterApiClient {
    pub fn new(
        api_base: &str,
        credentials: OAuthCredentials,
        request_timeout: Duration,
    ) -> Result<Self, TwitterApiError> {
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
            api_base: api_base.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    async fn request_json<T>(
        &self,
        operation: &'static str,
        method: reqwest::Method,
        path: &str,
        params: Vec<(String, String)>,
    ) -> Result<T, TwitterApiError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.api_base, path);
        let nonce = OAuthNonce::generate(current_unix_timestamp());
        let authorization =
            authorization_header(&self.credentials, method.as_str(), &url, &params, &nonce)?;
        let request = self
            .http
            .request(method.clone(), &url)
            .header(reqwest::header::AUTHORIZATION, authorization);
        let request = if method == reqwest::Method::GET {
            request.query(&params)
        } else {
            request.form(&params)
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let (code, message) = match serde_json::from_str::<TwitterErrorBody>(&body) {
                Ok(parsed) if !parsed.errors.is_empty() => {
                    let first = &parsed.errors[0];
                    (first.code, first.message.clone())
                }
                _ => (None, truncate_for_error(&body, ERROR_BODY_LIMIT)),
            };
            tracing::debug!(operation, status = status.as_u16(), ?code, "twitter request failed");
            return Err(TwitterApiError::Api {
                operation,
                status: status.as_u16(),
                code,
                message,
            });
        }
        serde_json::from_str(&body).map_err(|source| TwitterApiError::Decode { operation, source })
    }
}

fn param(key: &str, value: impl ToString) -> (String, String) {
    (key.to_string(), value.to_string())
}

fn home_timeline_params(since_id: u64, count: usize) -> Vec<(String, String)> {
    let mut params = vec![param("count", count), param("tweet_mode", "extended")];
    if since_id > 0 {
        params.push(param("since_id", since_id));
    }
    params
}

#[async_trait]
impl FeedBackend for TwitterApiClient {
    async fn verify_credentials(&self) -> Result<TwitterUser, TwitterApiError> {
        self.request_json(
            "account/verify_credentials",
            reqwest::Method::GET,
            "account/verify_credentials.json",
            Vec::new(),
        )
        .await
    }

    async fn home_timeline(
        &self,
        since_id: u64,
        count: usize,
    ) -> Result<Vec<Tweet>, TwitterApiError> {
        self.request_json(
            "statuses/home_timeline",
            reqwest::Method::GET,
            "statuses/home_timeline.json",
            home_timeline_params(since_id, count),
        )
        .await
    }

    async fn friends_page(&self, cursor: i64) -> Result<FriendsPage, TwitterApiError> {
        self.request_json(
            "friends/list",
            reqwest::Method::GET,
            "friends/list.json",
            vec![
                param("cursor", cursor),
                param("include_user_entities", "true"),
            ],
        )
        .await
    }

    async fn follow(&self, screen_name: &str) -> Result<TwitterUser, TwitterApiError> {
        self.request_json(
            "friendships/create",
            reqwest::Method::POST,
            "friendships/create.json",
            vec![param("screen_name", screen_name)],
        )
        .await
    }

    async fn unfollow(&self, screen_name: &str) -> Result<TwitterUser, TwitterApiError> {
        self.request_json(
            "friendships/destroy",
            reqwest::Method::POST,
            "friendships/destroy.json",
            vec![param("screen_name", screen_name)],
        )
        .await
    }
}
