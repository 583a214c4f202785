use std::future::Future;
use std::time::Duration;

/// Fixed-interval, bounded polling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub attempts: u32,
}

impl WaitPolicy {
    pub const fn new(interval: Duration, attempts: u32) -> Self {
        Self { interval, attempts }
    }

    /// Worst-case time spent before giving up.
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.attempts)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    Ready(T),
    TimedOut,
}

impl<T> WaitOutcome<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::TimedOut => None,
        }
    }
}

/// Run `probe` up to `policy.attempts` times, sleeping `policy.interval`
/// before each attempt. The first `Some` wins.
pub async fn wait_for<T, F, Fut>(policy: WaitPolicy, mut probe: F) -> WaitOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for attempt in 1..=policy.attempts {
        tokio::time::sleep(policy.interval).await;
        if let Some(value) = probe().await {
            tracing::debug!(attempt, "wait condition satisfied");
            return WaitOutcome::Ready(value);
        }
    }
    WaitOutcome::TimedOut
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn ready_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let policy = WaitPolicy::new(Duration::from_secs(1), 30);
        let started = tokio::time::Instant::now();

        let outcome = wait_for(policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { (n == 3).then_some("url") }
        })
        .await;

        assert_eq!(outcome, WaitOutcome::Ready("url"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_exact_attempt_budget() {
        let calls = AtomicU32::new(0);
        let policy = WaitPolicy::new(Duration::from_secs(1), 30);
        let started = tokio::time::Instant::now();

        let outcome: WaitOutcome<()> = wait_for(policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { None }
        })
        .await;

        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(calls.load(Ordering::SeqCst), 30);
        assert_eq!(started.elapsed(), policy.budget());
    }

    #[tokio::test]
    async fn zero_attempts_times_out_immediately() {
        let policy = WaitPolicy::new(Duration::from_secs(60), 0);
        let outcome: WaitOutcome<()> = wait_for(policy, || async { Some(()) }).await;
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }
}
