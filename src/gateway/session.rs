use std::time::Duration;

/// Exponential reconnect delay: `min(base * 2^attempts, cap)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let factor = 1u32.checked_shl(attempts).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Mutable identity of the current gateway session.
///
/// Owned by the connection and only written from its receive loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatewaySession {
    pub sequence: Option<u64>,
    pub session_id: Option<String>,
    pub self_id: Option<String>,
    pub reconnect_attempts: u32,
}

impl GatewaySession {
    /// Record a sequence number from an inbound frame. Never moves backwards.
    pub fn observe_sequence(&mut self, seq: u64) {
        self.sequence = Some(self.sequence.map_or(seq, |s| s.max(seq)));
    }

    /// Handshake completed: remember who we are and forget past failures.
    pub fn mark_ready(&mut self, session_id: String, self_id: String) {
        self.session_id = Some(session_id);
        self.self_id = Some(self_id);
        self.reconnect_attempts = 0;
    }

    /// The server dropped our session; a fresh IDENTIFY starts a new one.
    pub fn invalidate(&mut self) {
        self.session_id = None;
        self.sequence = None;
    }

    /// A new transport starts a new sequence stream.
    pub fn reset_for_transport(&mut self) {
        self.sequence = None;
    }

    /// Delay before the next reconnect; counts the closure that caused it.
    pub fn next_backoff(&mut self, policy: &BackoffPolicy) -> Duration {
        let delay = policy.delay_for(self.reconnect_attempts);
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
        delay
    }
}
