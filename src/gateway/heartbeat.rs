use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Keep-alive timer for one gateway connection.
///
/// Lives inside the connection's `select!` loop, so there is only ever one
/// emitter. `start` replaces the running schedule; `cancel` is idempotent.
#[derive(Debug, Default)]
pub struct HeartbeatScheduler {
    interval: Option<Interval>,
}

impl HeartbeatScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin beating every `period`, first beat one full period from now.
    pub fn start(&mut self, period: Duration) {
        self.cancel();
        let period = period.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
    }

    pub fn cancel(&mut self) {
        self.interval = None;
    }

    pub fn is_active(&self) -> bool {
        self.interval.is_some()
    }

    pub fn period(&self) -> Option<Duration> {
        self.interval.as_ref().map(|i| i.period())
    }

    /// Resolves when the next beat is due; never resolves while cancelled.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn beats_within(scheduler: &mut HeartbeatScheduler, window: Duration) -> usize {
        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);
        let mut count = 0;
        loop {
            tokio::select! {
                _ = &mut deadline => return count,
                _ = scheduler.tick() => count += 1,
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_beat_after_full_interval() {
        let mut scheduler = HeartbeatScheduler::new();
        scheduler.start(Duration::from_millis(41250));
        assert_eq!(beats_within(&mut scheduler, Duration::from_millis(41000)).await, 0);
        assert_eq!(beats_within(&mut scheduler, Duration::from_millis(500)).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_beats_on_period() {
        let mut scheduler = HeartbeatScheduler::new();
        scheduler.start(Duration::from_secs(10));
        // beats at 10, 20, 30, 40
        let count = beats_within(&mut scheduler, Duration::from_millis(45_000)).await;
        assert_eq!(count, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_supersedes_previous_schedule() {
        let mut scheduler = HeartbeatScheduler::new();
        scheduler.start(Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(5)).await;
        scheduler.start(Duration::from_secs(10));
        assert_eq!(scheduler.period(), Some(Duration::from_secs(10)));

        // The first schedule would have fired at t=10; only the second (t=15) may.
        assert_eq!(beats_within(&mut scheduler, Duration::from_secs(9)).await, 0);
        assert_eq!(beats_within(&mut scheduler, Duration::from_secs(2)).await, 1);
        // At most one beat per interval window from here on.
        assert_eq!(beats_within(&mut scheduler, Duration::from_secs(10)).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent_and_silences() {
        let mut scheduler = HeartbeatScheduler::new();
        scheduler.start(Duration::from_secs(1));
        scheduler.cancel();
        scheduler.cancel();
        assert!(!scheduler.is_active());
        assert_eq!(beats_within(&mut scheduler, Duration::from_secs(5)).await, 0);
    }
}
