use std::time::Duration;

use crate::error::BotError;
use crate::gateway::session::BackoffPolicy;
use crate::gateway::GatewayConfig;
use crate::throttle::ReplyPolicy;

pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";
pub const DEFAULT_API_URL: &str = "https://discord.com/api/v9";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Clone, PartialEq)]
pub enum ReplySource {
    Canned,
    Gemini,
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub channel_id: String,
    pub gateway_url: String,
    pub api_url: String,
    pub reply_source: ReplySource,
    pub gemini: Option<GeminiConfig>,
    pub max_reply_chars: usize,
    pub cooldown: Duration,
    pub epoch: Duration,
}

fn required(name: &str) -> Result<String, BotError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| BotError::Config(format!("{name} is required")))
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Tokens are sent raw; some dashboards hand them out with a `Bearer ` prefix.
pub fn clean_token(token: &str) -> String {
    token
        .trim()
        .strip_prefix("Bearer ")
        .unwrap_or(token.trim())
        .to_string()
}

impl Config {
    pub fn from_env() -> Result<Self, BotError> {
        let token = clean_token(&required("ACCORDBOT_TOKEN")?);
        let channel_id = required("ACCORDBOT_CHANNEL_ID")?;

        let reply_source = match std::env::var("ACCORDBOT_REPLY_SOURCE")
            .unwrap_or_else(|_| "canned".to_string())
            .to_lowercase()
            .as_str()
        {
            "gemini" => ReplySource::Gemini,
            _ => ReplySource::Canned,
        };

        let gemini = if reply_source == ReplySource::Gemini {
            let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| {
                BotError::Config(
                    "GEMINI_API_KEY is required when ACCORDBOT_REPLY_SOURCE=gemini".to_string(),
                )
            })?;
            Some(GeminiConfig {
                api_key,
                model: std::env::var("ACCORDBOT_GEMINI_MODEL")
                    .unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string()),
            })
        } else {
            None
        };

        Ok(Self {
            token,
            channel_id,
            gateway_url: std::env::var("ACCORDBOT_GATEWAY_URL")
                .unwrap_or_else(|_| DEFAULT_GATEWAY_URL.to_string()),
            api_url: std::env::var("ACCORDBOT_API_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            reply_source,
            gemini,
            max_reply_chars: parse_or("ACCORDBOT_MAX_REPLY_CHARS", 50usize).max(1),
            cooldown: Duration::from_secs(parse_or("ACCORDBOT_COOLDOWN_SECS", 10)),
            epoch: Duration::from_secs(parse_or("ACCORDBOT_EPOCH_SECS", 3600u64).max(1)),
        })
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            url: self.gateway_url.clone(),
            token: self.token.clone(),
            backoff: BackoffPolicy::default(),
            ..GatewayConfig::default()
        }
    }

    pub fn reply_policy(&self) -> ReplyPolicy {
        ReplyPolicy {
            channel_id: self.channel_id.clone(),
            max_chars: self.max_reply_chars,
            cooldown: self.cooldown,
            epoch: self.epoch,
            ..ReplyPolicy::default()
        }
    }
}
