use chrono::{DateTime, Utc};
use dashmap::DashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::error::BotError;
use crate::gateway::events::MessageCreate;
use crate::reply::{CannedReplies, ReplyGenerator};
use crate::rest::ChatApi;

/// Tunables for when and how the bot answers.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyPolicy {
    /// The one channel the bot watches.
    pub channel_id: String,
    pub max_chars: usize,
    pub typing_per_char: Duration,
    pub min_typing: Duration,
    pub max_typing: Duration,
    pub cooldown: Duration,
    pub epoch: Duration,
}

impl Default for ReplyPolicy {
    fn default() -> Self {
        Self {
            channel_id: String::new(),
            max_chars: 50,
            typing_per_char: Duration::from_millis(100),
            min_typing: Duration::from_secs(1),
            max_typing: Duration::from_secs(5),
            cooldown: Duration::from_secs(10),
            epoch: Duration::from_secs(60 * 60),
        }
    }
}

impl ReplyPolicy {
    /// Simulated typing time, proportional to length and clamped.
    pub fn typing_delay(&self, reply: &str) -> Duration {
        let chars = u32::try_from(reply.chars().count()).unwrap_or(u32::MAX);
        self.typing_per_char
            .saturating_mul(chars)
            .clamp(self.min_typing, self.min_typing.max(self.max_typing))
    }

    /// Trim and cut to at most `max_chars` characters.
    pub fn cap(&self, reply: &str) -> String {
        let capped: String = reply.trim().chars().take(self.max_chars).collect();
        capped.trim_end().to_string()
    }
}

/// Gate in front of the reply pipeline.
///
/// One reply in flight at a time, and at most one reply per user per epoch.
pub struct ReplyThrottle {
    policy: ReplyPolicy,
    api: Arc<dyn ChatApi>,
    generator: Arc<dyn ReplyGenerator>,
    fallback: CannedReplies,
    busy: AtomicBool,
    responded: DashSet<String>,
    epoch_started: AtomicI64,
}

/// Clears `busy` however the pipeline task ends.
struct BusyGuard(Arc<ReplyThrottle>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.busy.store(false, Ordering::Release);
    }
}

impl ReplyThrottle {
    pub fn new(
        policy: ReplyPolicy,
        api: Arc<dyn ChatApi>,
        generator: Arc<dyn ReplyGenerator>,
    ) -> Self {
        Self {
            policy,
            api,
            generator,
            fallback: CannedReplies::default(),
            busy: AtomicBool::new(false),
            responded: DashSet::new(),
            epoch_started: AtomicI64::new(Utc::now().timestamp()),
        }
    }

    pub fn policy(&self) -> &ReplyPolicy {
        &self.policy
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn has_responded(&self, user_id: &str) -> bool {
        self.responded.contains(user_id)
    }

    pub fn responded_count(&self) -> usize {
        self.responded.len()
    }

    pub fn epoch_started(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.epoch_started.load(Ordering::Relaxed), 0)
            .unwrap_or_else(Utc::now)
    }

    /// Decide whether to answer `message`, and if so start the reply pipeline.
    ///
    /// Returns the pipeline task, or `None` when the message was filtered out.
    /// The task logs its own outcome, including a panic, so callers may drop
    /// the handle.
    pub fn on_message(
        self: &Arc<Self>,
        self_id: Option<&str>,
        message: &MessageCreate,
    ) -> Option<JoinHandle<()>> {
        let author_id = message.author.id.as_str();
        if self_id == Some(author_id) {
            return None;
        }
        if message.channel_id != self.policy.channel_id {
            return None;
        }

        tracing::info!(
            "message from {} ({}): {}",
            message.author_label(),
            author_id,
            message.content
        );

        if self.is_busy() {
            tracing::info!("busy with another reply, skipping {}", message.author_label());
            return None;
        }
        if self.has_responded(author_id) {
            tracing::info!("already answered {} this epoch, skipping", message.author_label());
            return None;
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let guard = BusyGuard(Arc::clone(self));
        let this = Arc::clone(self);
        let message_id = message.id.clone();
        let message = message.clone();
        let pipeline = tokio::spawn(async move {
            let _guard = guard;
            match this.respond(&message).await {
                Ok(()) => {
                    this.responded.insert(message.author.id.clone());
                    tracing::info!("added {} to the answered set", message.author_label());
                    tokio::time::sleep(this.policy.cooldown).await;
                    tracing::info!("ready for new messages");
                }
                Err(e) => tracing::warn!("reply to {} abandoned: {e}", message.id),
            }
        });

        Some(tokio::spawn(async move {
            if let Err(e) = pipeline.await {
                tracing::error!("reply pipeline for {message_id} crashed: {e}");
            }
        }))
    }

    async fn respond(&self, message: &MessageCreate) -> Result<(), BotError> {
        let reply = self.compose(&message.content).await;
        if reply.trim().is_empty() {
            return Err(BotError::EmptyReply);
        }

        if let Err(e) = self.api.send_typing(&self.policy.channel_id).await {
            tracing::warn!("failed to send typing indicator: {e}");
        }
        let delay = self.policy.typing_delay(&reply);
        tracing::debug!("typing for {:.1}s", delay.as_secs_f64());
        tokio::time::sleep(delay).await;

        self.deliver(&reply, &message.id).await
    }

    /// Generated reply capped to policy length, or a canned phrase if that fails.
    async fn compose(&self, source: &str) -> String {
        match self.generator.generate(source).await {
            Ok(reply) => {
                let capped = self.policy.cap(&reply);
                if capped.is_empty() {
                    tracing::warn!("generated reply was empty, using a canned phrase");
                    self.policy.cap(&self.fallback.pick())
                } else {
                    capped
                }
            }
            Err(e) => {
                tracing::warn!("reply generation failed: {e}, using a canned phrase");
                self.policy.cap(&self.fallback.pick())
            }
        }
    }

    /// Honour slow mode, then send. Each 429 is waited out and sent again.
    async fn deliver(&self, reply: &str, reply_to: &str) -> Result<(), BotError> {
        let channel_id = self.policy.channel_id.as_str();

        let slow_mode = match self.api.channel_slow_mode(channel_id).await {
            Ok(secs) => secs,
            Err(e) => {
                tracing::warn!("failed to check slow mode: {e}");
                0
            }
        };
        if slow_mode > 0 {
            tracing::info!("slow mode active, waiting {slow_mode}s before sending");
            tokio::time::sleep(Duration::from_secs(slow_mode)).await;
        }

        loop {
            tracing::info!("sending reply: {reply}");
            match self.api.send_message(channel_id, reply, Some(reply_to)).await {
                Ok(id) => {
                    tracing::info!("sent message {id}");
                    return Ok(());
                }
                Err(BotError::RateLimited { retry_after }) => {
                    tracing::warn!(
                        "rate limited, retrying in {:.2}s",
                        retry_after.as_secs_f64()
                    );
                    tokio::time::sleep(retry_after).await;
                }
                Err(e) => {
                    match e.status() {
                        Some(401) => {
                            tracing::error!("authentication failed: token is invalid or expired")
                        }
                        Some(403) => {
                            tracing::error!("account is timed out or lacks permission to send")
                        }
                        _ => {}
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Forget everyone answered so far. Returns how many were cleared.
    pub fn rotate_epoch(&self) -> usize {
        let cleared = self.responded.len();
        self.responded.clear();
        let previous = self.epoch_started();
        self.epoch_started.store(Utc::now().timestamp(), Ordering::Relaxed);
        if cleared > 0 {
            tracing::info!(
                "cleared {cleared} answered user(s) from epoch started {}",
                previous.to_rfc3339()
            );
        }
        cleared
    }

    /// Rotate the epoch every `policy.epoch` until the task is aborted.
    pub fn spawn_rotation(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let period = this.policy.epoch;
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                interval.tick().await;
                this.rotate_epoch();
            }
        })
    }
}
