//! Bot API client: the [`BotApi`] trait and its HTTP implementation.
//!
//! [`BotApi`] is the seam the dispatch layer consumes; production code uses [`HttpBot`],
//! tests substitute their own implementation.

use crate::error::{ApiError, ApiResult};
use crate::types::{Message, Update, User};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default Bot API server.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// The subset of the Bot API the dispatch layer calls. Implementations map each method to
/// one HTTP call and raise a typed [`ApiError`] on failure.
#[async_trait]
pub trait BotApi: Send + Sync {
    /// Identity of the bot behind the token. Used to verify authentication at startup.
    async fn get_me(&self) -> ApiResult<User>;

    /// Long-polls for updates. `offset` must be one past the highest update id already
    /// seen; `timeout` is the long-poll window in seconds.
    async fn get_updates(
        &self,
        offset: Option<i64>,
        limit: Option<u8>,
        timeout: Option<u64>,
    ) -> ApiResult<Vec<Update>>;

    /// Sends a text message to the given chat.
    async fn send_message(&self, chat_id: i64, text: &str) -> ApiResult<Message>;

    /// Registers a webhook URL; updates are then POSTed there instead of being polled.
    async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> ApiResult<bool>;

    /// Removes a registered webhook. Required before polling can start.
    async fn delete_webhook(&self, drop_pending_updates: bool) -> ApiResult<bool>;
}

/// Response envelope every Bot API method returns.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Serialize)]
struct GetUpdatesParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<u64>,
}

#[derive(Serialize)]
struct SendMessageParams<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Serialize)]
struct SetWebhookParams<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_token: Option<&'a str>,
}

#[derive(Serialize)]
struct DeleteWebhookParams {
    drop_pending_updates: bool,
}

/// Reqwest-backed [`BotApi`] implementation. The HTTP client is injected so callers control
/// pooling and TLS; there is no process-wide client.
pub struct HttpBot {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBot {
    /// Creates a client for the given token against the public Bot API server.
    pub fn new(token: &str) -> Self {
        Self::with_client(reqwest::Client::new(), token, DEFAULT_API_URL)
    }

    /// Creates a client with an explicit `reqwest::Client` and API server URL (e.g. a
    /// local Bot API server or a test double).
    pub fn with_client(client: reqwest::Client, token: &str, api_url: &str) -> Self {
        Self {
            client,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        }
    }

    async fn call<P, T>(&self, method: &str, params: &P, timeout: Option<Duration>) -> ApiResult<T>
    where
        P: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, method);
        debug!(method, "calling Bot API");
        let mut request = self.client.post(&url).json(params);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if envelope.ok {
            return envelope.result.ok_or_else(|| ApiError::Api {
                code: 0,
                description: "ok response without result".to_string(),
            });
        }

        if let Some(retry_after) = envelope.parameters.and_then(|p| p.retry_after) {
            return Err(ApiError::RetryAfter(retry_after));
        }

        let description = envelope
            .description
            .unwrap_or_else(|| "unknown error".to_string());
        match envelope.error_code {
            Some(401) => Err(ApiError::Unauthorized),
            Some(404) => Err(ApiError::InvalidToken),
            Some(400) => Err(ApiError::BadRequest(description)),
            Some(409) => Err(ApiError::Conflict(description)),
            code => Err(ApiError::Api {
                code: code.unwrap_or_else(|| i64::from(status.as_u16())),
                description,
            }),
        }
    }
}

fn map_transport_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::TimedOut
    } else {
        ApiError::Network(error.to_string())
    }
}

#[async_trait]
impl BotApi for HttpBot {
    async fn get_me(&self) -> ApiResult<User> {
        self.call("getMe", &serde_json::json!({}), None).await
    }

    async fn get_updates(
        &self,
        offset: Option<i64>,
        limit: Option<u8>,
        timeout: Option<u64>,
    ) -> ApiResult<Vec<Update>> {
        let params = GetUpdatesParams {
            offset,
            limit,
            timeout,
        };
        // The request deadline sits above the long-poll window so the server side expires first.
        let request_timeout = Duration::from_secs(timeout.unwrap_or(0).saturating_add(10));
        self.call("getUpdates", &params, Some(request_timeout)).await
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> ApiResult<Message> {
        self.call("sendMessage", &SendMessageParams { chat_id, text }, None)
            .await
    }

    async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> ApiResult<bool> {
        self.call("setWebhook", &SetWebhookParams { url, secret_token }, None)
            .await
    }

    async fn delete_webhook(&self, drop_pending_updates: bool) -> ApiResult<bool> {
        self.call(
            "deleteWebhook",
            &DeleteWebhookParams {
                drop_pending_updates,
            },
            None,
        )
        .await
    }
}
