use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shortest allowed interval between two pings.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// The remote liveness call made on every tick.
#[async_trait]
pub trait Heartbeat: Send + Sync {
    async fn ping(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct HeartbeatScheduler {
    interval: Duration,
}

impl HeartbeatScheduler {
    /// Intervals below [`MIN_HEARTBEAT_INTERVAL`] are raised to it.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(MIN_HEARTBEAT_INTERVAL),
        }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Ping every interval until `cancel` fires. The first ping is one
    /// interval after the call; a failed ping is logged and the loop goes on.
    /// A ping still in flight when `cancel` fires is dropped.
    pub async fn run(self, heartbeat: Arc<dyn Heartbeat>, cancel: CancellationToken) {
        info!("heartbeat every {}s", self.interval.as_secs());

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("heartbeat cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            debug!("heartbeat cancelled during ping");
                            break;
                        }
                        result = heartbeat.ping() => match result {
                            Ok(()) => debug!("heartbeat ok"),
                            Err(e) => warn!("heartbeat failed: {:#}", e),
                        },
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHeartbeat {
        pings: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Heartbeat for CountingHeartbeat {
        async fn ping(&self) -> anyhow::Result<()> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("controller unreachable");
            }
            Ok(())
        }
    }

    /// Answers only after a long stall, like a controller that accepts the
    /// connection and never replies.
    #[derive(Default)]
    struct StalledHeartbeat {
        started: AtomicUsize,
    }

    #[async_trait]
    impl Heartbeat for StalledHeartbeat {
        async fn ping(&self) -> anyhow::Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    #[test]
    fn test_interval_floor() {
        assert_eq!(HeartbeatScheduler::from_secs(2).interval(), Duration::from_secs(5));
        assert_eq!(HeartbeatScheduler::from_secs(0).interval(), Duration::from_secs(5));
        assert_eq!(HeartbeatScheduler::from_secs(30).interval(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pings_once_per_interval() {
        let hb = Arc::new(CountingHeartbeat::default());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(HeartbeatScheduler::from_secs(5).run(hb.clone(), cancel.clone()));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(hb.pings.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(hb.pings.load(Ordering::SeqCst), 3);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_clamped_interval_is_used() {
        let hb = Arc::new(CountingHeartbeat::default());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(HeartbeatScheduler::from_secs(2).run(hb.clone(), cancel.clone()));

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(hb.pings.load(Ordering::SeqCst), 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_loop() {
        let hb = Arc::new(CountingHeartbeat {
            fail: true,
            ..Default::default()
        });
        let cancel = CancellationToken::new();
        let task = tokio::spawn(HeartbeatScheduler::from_secs(5).run(hb.clone(), cancel.clone()));

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(hb.pings.load(Ordering::SeqCst), 4);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_tick_never_pings() {
        let hb = Arc::new(CountingHeartbeat::default());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(HeartbeatScheduler::from_secs(5).run(hb.clone(), cancel.clone()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(hb.pings.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_ping_in_flight() {
        let hb = Arc::new(StalledHeartbeat::default());
        let cancel = CancellationToken::new();
        let started_at = Instant::now();
        let task = tokio::spawn(HeartbeatScheduler::from_secs(5).run(hb.clone(), cancel.clone()));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(hb.started.load(Ordering::SeqCst), 1);

        cancel.cancel();
        task.await.unwrap();

        assert!(
            started_at.elapsed() < Duration::from_secs(7),
            "loop exited after {:?}",
            started_at.elapsed()
        );
    }
}
