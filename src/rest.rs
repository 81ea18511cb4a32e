use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::error::BotError;

/// Rate-limit wait used when a 429 body carries no usable `retry_after`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Outbound chat operations the reply pipeline depends on.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send_typing(&self, channel_id: &str) -> Result<(), BotError>;

    /// Post a message, optionally as a reply. Returns the new message id.
    async fn send_message(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<String, BotError>;

    /// Per-user slow mode of a channel, in seconds.
    async fn channel_slow_mode(&self, channel_id: &str) -> Result<u64, BotError>;
}

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChannelInfo {
    #[serde(default)]
    rate_limit_per_user: Option<u64>,
}

pub struct RestClient {
    client: Client,
    base_url: String,
    token: String,
}

impl RestClient {
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header("Authorization", self.token.as_str())
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, BotError> {
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            return Err(BotError::RateLimited {
                retry_after: retry_after_from(&body),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BotError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}

/// Read `retry_after` (seconds, possibly fractional) from a 429 body.
///
/// Missing, negative or unrepresentable values fall back to the default.
pub fn retry_after_from(body: &serde_json::Value) -> Duration {
    let Some(raw) = body.get("retry_after") else {
        return DEFAULT_RETRY_AFTER;
    };
    match raw.as_f64().and_then(|secs| Duration::try_from_secs_f64(secs).ok()) {
        Some(delay) => delay,
        None => {
            tracing::warn!("unusable retry_after {raw}, waiting {DEFAULT_RETRY_AFTER:?}");
            DEFAULT_RETRY_AFTER
        }
    }
}

#[async_trait]
impl ChatApi for RestClient {
    async fn send_typing(&self, channel_id: &str) -> Result<(), BotError> {
        let url = format!("{}/channels/{channel_id}/typing", self.base_url);
        let builder = self.client.post(&url).json(&json!({}));
        Self::check(self.apply_auth(builder).send().await?).await?;
        Ok(())
    }

    async fn send_message(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<String, BotError> {
        let url = format!("{}/channels/{channel_id}/messages", self.base_url);
        let mut body = json!({
            "content": content,
            "tts": false,
        });
        if let Some(message_id) = reply_to {
            body["message_reference"] = json!({
                "message_id": message_id,
                "channel_id": channel_id,
            });
            body["allowed_mentions"] = json!({ "parse": ["users"] });
        }

        let builder = self.client.post(&url).json(&body);
        let resp = Self::check(self.apply_auth(builder).send().await?).await?;
        let created: CreatedMessage = resp.json().await?;
        Ok(created.id)
    }

    async fn channel_slow_mode(&self, channel_id: &str) -> Result<u64, BotError> {
        let url = format!("{}/channels/{channel_id}", self.base_url);
        let builder = self.client.get(&url);
        let resp = Self::check(self.apply_auth(builder).send().await?).await?;
        let channel: ChannelInfo = resp.json().await?;
        Ok(channel.rate_limit_per_user.unwrap_or(0))
    }
}
