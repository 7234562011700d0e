use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::secret::SecretToken;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum simultaneous webhook connections requested from the Bot API.
pub const MAX_CONNECTIONS: u8 = 100;

/// Update categories the webhook subscribes to.
pub const ALLOWED_UPDATES: [&str; 6] = [
    "message",
    "edited_message",
    "channel_post",
    "edited_channel_post",
    "business_message",
    "edited_business_message",
];

#[derive(Debug, Serialize)]
struct SetWebhookPayload<'a> {
    url: &'a str,
    max_connections: u8,
    allowed_updates: &'a [&'a str],
    secret_token: &'a str,
}

#[derive(Debug, Serialize)]
struct DeleteMessagePayload {
    chat_id: i64,
    message_id: i64,
}

/// Thin client for the Bot API methods this service calls.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// POST `body` to a Bot API method. Anything other than 200 is an error
    /// carrying the status code and response body.
    ///
    /// Takes raw bytes rather than `.json()` so `deleteWebhook` can go through
    /// here with an empty body; use [`ApiClient::post_json`] for payloads.
    pub async fn post(&self, method: &str, body: Vec<u8>) -> Result<()> {
        let url = format!("{}{}", self.base_url, method);

        debug!("Calling Bot API method {}", method);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .with_context(|| format!("error sending http request to {}", method))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response
                .text()
                .await
                .with_context(|| format!("error reading http response body from {}", method))?;
            anyhow::bail!(
                "got unexpected status code from {}: {}, body: {}",
                method,
                status.as_u16(),
                body
            );
        }

        Ok(())
    }

    pub async fn post_json<T: Serialize + ?Sized>(&self, method: &str, payload: &T) -> Result<()> {
        let body = serde_json::to_vec(payload)
            .with_context(|| format!("error encoding {} payload", method))?;
        self.post(method, body).await
    }

    pub async fn set_webhook(&self, url: &str, secret: &SecretToken) -> Result<()> {
        let payload = SetWebhookPayload {
            url,
            max_connections: MAX_CONNECTIONS,
            allowed_updates: &ALLOWED_UPDATES,
            secret_token: secret.as_str(),
        };
        self.post_json("setWebhook", &payload).await
    }

    pub async fn delete_webhook(&self) -> Result<()> {
        self.post("deleteWebhook", Vec::new()).await
    }

    pub async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        let payload = DeleteMessagePayload {
            chat_id,
            message_id,
        };
        self.post_json("deleteMessage", &payload).await
    }
}
