use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::error::BotError;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1";
const GENERATE_TIMEOUT: Duration = Duration::from_secs(30);
const PREVIEW_CHARS: usize = 50;

/// Produces the text of a short reply to an incoming message.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, source: &str) -> Result<String, BotError>;
}

const DEFAULT_PHRASES: &[&str] = &[
    "Let's go everyone!",
    "New here, hi all!",
    "You all are great",
    "What do you think?",
    "Nothing is impossible!",
    "Keep it up!",
    "Exactly right!",
    "Beautiful day today!",
    "So good, friends",
    "Think it through",
    "Oh, is that so?",
    "That's right",
    "How interesting",
    "Well said",
    "Absolutely amazing",
    "Anyone else like me?",
    "Sounds reasonable",
    "That's the way",
    "Oh wow",
    "Love it",
    "Got it now",
    "Sounds great",
    "Can't wait for more",
    "So nice",
    "Thanks everyone!",
    "True expert",
    "Impressive",
    "Okay okay",
    "This one is good",
    "Spot on",
];

/// Picks a phrase at random from a fixed list. Never fails.
#[derive(Debug, Clone)]
pub struct CannedReplies {
    phrases: Vec<String>,
}

impl Default for CannedReplies {
    fn default() -> Self {
        Self {
            phrases: DEFAULT_PHRASES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl CannedReplies {
    /// Blank phrases are dropped; an empty list falls back to the defaults.
    pub fn new(phrases: Vec<String>) -> Self {
        let phrases: Vec<String> = phrases
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if phrases.is_empty() {
            Self::default()
        } else {
            Self { phrases }
        }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    pub fn contains(&self, phrase: &str) -> bool {
        self.phrases.iter().any(|p| p == phrase)
    }

    pub fn pick(&self) -> String {
        self.phrases
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| DEFAULT_PHRASES[0].to_string())
    }
}

#[async_trait]
impl ReplyGenerator for CannedReplies {
    async fn generate(&self, _source: &str) -> Result<String, BotError> {
        Ok(self.pick())
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// Asks a Gemini model for a short, friendly reply.
pub struct GeminiReplies {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl GeminiReplies {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            base_url: GEMINI_BASE_URL.to_string(),
            api_key,
            model,
            timeout: GENERATE_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn prompt(source: &str) -> String {
        format!(
            "Reply to this message briefly and cheerfully, in no more than 20 words, \
             the way a friendly social media user would: \"{source}\""
        )
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

#[async_trait]
impl ReplyGenerator for GeminiReplies {
    async fn generate(&self, source: &str) -> Result<String, BotError> {
        tracing::debug!("requesting reply from {} for \"{}\"", self.model, preview(source));

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = json!({
            "contents": [{ "parts": [{ "text": Self::prompt(source) }] }],
            "generationConfig": {
                "temperature": 0.9,
                "topK": 40,
                "topP": 0.95,
                "maxOutputTokens": 30
            }
        });

        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(BotError::Api { status, body });
        }

        let parsed: GenerateResponse = resp.json().await?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .map(|t| t.replace('"', "").trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(BotError::EmptyReply)?;

        tracing::debug!("gemini replied \"{text}\"");
        Ok(text)
    }
}
