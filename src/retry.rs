use rand::{rng, RngExt};
use std::time::Duration;
use tokio::{sync::mpsc, task::JoinHandle};

/// Exponential backoff with jitter, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
        }
    }

    /// Delay before retry number `attempt` (starting at 0).
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self
            .initial
            .saturating_mul(1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX));
        let base = base.min(self.max);
        let jitter_ms = (base.as_millis() / 4) as u64;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rng().random_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        (base + jitter).min(self.max)
    }
}

/// Sends a message to a channel after a delay. Scheduling again replaces a
/// pending send.
#[derive(Default, Debug)]
pub struct RetryTimer {
    handle: Option<JoinHandle<()>>,
}

impl RetryTimer {
    pub fn new() -> Self {
        Self { handle: None }
    }

    pub fn schedule<T>(&mut self, sender: mpsc::Sender<T>, message: T, delay: Duration)
    where
        T: Send + 'static,
    {
        self.abort();
        self.handle = Some(tokio::task::spawn(async move {
            tokio::time::sleep(delay).await;
            if sender.send(message).await.is_err() {
                log::debug!("Retry fired after the worker stopped");
            }
        }));
    }

    /// Returns true if a pending send was cancelled.
    pub fn abort(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for RetryTimer {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
        let first = backoff.delay(0);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(125));
        let third = backoff.delay(2);
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(500));
        assert_eq!(backoff.delay(30), Duration::from_secs(1));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescheduling_replaces_pending_send() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut timer = RetryTimer::new();
        timer.schedule(tx.clone(), 1, Duration::from_secs(5));
        timer.schedule(tx, 2, Duration::from_secs(5));
        assert!(timer.is_pending());
        assert_eq!(rx.recv().await, Some(2));
        assert!(rx.try_recv().is_err());
    }
}
