use std::fmt;
use std::time::Duration;

use tokio_tungstenite::tungstenite;

#[derive(Debug)]
pub enum BotError {
    Http(reqwest::Error),
    Api { status: u16, body: String },
    RateLimited { retry_after: Duration },
    Gateway(tungstenite::Error),
    Json(serde_json::Error),
    Config(String),
    EmptyReply,
}

impl BotError {
    /// True for failures the caller may retry after waiting.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, BotError::RateLimited { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            BotError::Api { status, .. } => Some(*status),
            BotError::RateLimited { .. } => Some(429),
            BotError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl fmt::Display for BotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotError::Http(e) => write!(f, "HTTP error: {e}"),
            BotError::Api { status, body } => write!(f, "server returned {status}: {body}"),
            BotError::RateLimited { retry_after } => {
                write!(f, "rate limited, retry after {:.2}s", retry_after.as_secs_f64())
            }
            BotError::Gateway(e) => write!(f, "gateway error: {e}"),
            BotError::Json(e) => write!(f, "malformed payload: {e}"),
            BotError::Config(msg) => write!(f, "invalid configuration: {msg}"),
            BotError::EmptyReply => write!(f, "reply generator produced no text"),
        }
    }
}

impl std::error::Error for BotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BotError::Http(e) => Some(e),
            BotError::Gateway(e) => Some(e),
            BotError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BotError {
    fn from(e: reqwest::Error) -> Self {
        BotError::Http(e)
    }
}

impl From<tungstenite::Error> for BotError {
    fn from(e: tungstenite::Error) -> Self {
        BotError::Gateway(e)
    }
}

impl From<serde_json::Error> for BotError {
    fn from(e: serde_json::Error) -> Self {
        BotError::Json(e)
    }
}
