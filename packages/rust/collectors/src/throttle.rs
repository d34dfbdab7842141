//! Per-adapter politeness: a minimum-interval rate limiter plus an explicit
//! retry policy, driven through a small per-call state machine.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use jobcompass_shared::{JobCompassError, Result, RetryConfig, Source};

// ---------------------------------------------------------------------------
// Rate limiter
// ---------------------------------------------------------------------------

/// Mutable limiter state, owned by exactly one adapter instance.
#[derive(Debug, Default)]
pub struct RateLimiterState {
    /// When the previous call was released.
    pub last_call: Option<Instant>,
}

/// Spaces calls at least `min_interval` apart.
///
/// The state lock is held while sleeping, so concurrent callers on the same
/// adapter queue up and are released one interval apart.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    state: Mutex<RateLimiterState>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            state: Mutex::new(RateLimiterState::default()),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for this caller's slot. Returns the instant it was released at.
    pub async fn acquire(&self) -> Instant {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let until = match state.last_call {
            Some(last) if last + self.min_interval > now => last + self.min_interval,
            _ => now,
        };
        if until > now {
            trace!(wait_ms = (until - now).as_millis() as u64, "rate limiter waiting");
            tokio::time::sleep_until(until).await;
        }
        state.last_call = Some(until);
        until
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Exponential backoff over a bounded number of attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_ceiling: Duration,
    retryable: fn(&JobCompassError) -> bool,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: config.backoff_base,
            backoff_ceiling: config.backoff_ceiling,
            retryable: JobCompassError::is_transient,
        }
    }

    /// Replace the transient-error predicate.
    pub fn with_retryable(mut self, retryable: fn(&JobCompassError) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Delay before the retry that follows `attempt` (1-based):
    /// `base * 2^(attempt - 1)`, clamped to the ceiling.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_ceiling)
    }

    /// Whether a failure on `attempt` (1-based) should be retried.
    pub fn should_retry(&self, err: &JobCompassError, attempt: u32) -> bool {
        attempt < self.max_attempts && (self.retryable)(err)
    }
}

// ---------------------------------------------------------------------------
// Call state machine
// ---------------------------------------------------------------------------

/// States a single throttled call passes through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Waiting { until: Instant },
    Executing { attempt: u32 },
    RetryScheduled { attempt: u32, delay: Duration },
    Success,
    Failed,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Success | CallState::Failed)
    }
}

/// Rate limiter plus retry policy for one adapter instance.
#[derive(Debug)]
pub struct Throttle {
    source: Source,
    limiter: RateLimiter,
    policy: RetryPolicy,
}

impl Throttle {
    pub fn new(source: Source, min_interval: Duration, policy: RetryPolicy) -> Self {
        Self {
            source,
            limiter: RateLimiter::new(min_interval),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` under the rate limiter, retrying transient failures.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.call_traced(op).await.0
    }

    /// Like [`call`](Self::call), also returning every state visited.
    pub async fn call_traced<T, F, Fut>(&self, mut op: F) -> (Result<T>, Vec<CallState>)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut trace = vec![CallState::Idle];
        let mut attempt = 0;

        loop {
            attempt += 1;
            let until = self.limiter.acquire().await;
            trace.push(CallState::Waiting { until });
            trace.push(CallState::Executing { attempt });

            match op().await {
                Ok(value) => {
                    trace.push(CallState::Success);
                    return (Ok(value), trace);
                }
                Err(err) if self.policy.should_retry(&err, attempt) => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        source = %self.source,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    trace.push(CallState::RetryScheduled { attempt, delay });
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    debug!(source = %self.source, attempt, error = %err, "call failed");
                    trace.push(CallState::Failed);
                    return (Err(err), trace);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(&RetryConfig {
            max_attempts,
            backoff_base: Duration::from_millis(5),
            backoff_ceiling: Duration::from_millis(20),
        })
    }

    #[test]
    fn backoff_doubles_and_clamps() {
        let policy = RetryPolicy::new(&RetryConfig {
            max_attempts: 5,
            backoff_base: Duration::from_secs(2),
            backoff_ceiling: Duration::from_secs(10),
        });
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(4), Duration::from_secs(10));
        assert_eq!(policy.backoff(40), Duration::from_secs(10));
    }

    #[test]
    fn only_transient_errors_are_retried() {
        let policy = fast_policy(3);
        let timeout = JobCompassError::Timeout("t".into());
        assert!(policy.should_retry(&timeout, 1));
        assert!(policy.should_retry(&timeout, 2));
        assert!(!policy.should_retry(&timeout, 3));
        assert!(!policy.should_retry(&JobCompassError::auth("jsearch", "401"), 1));
    }

    #[tokio::test]
    async fn rate_limiter_spaces_bursty_callers() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(40)));
        let start = Instant::now();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();

        let mut released = Vec::new();
        for handle in handles {
            released.push(handle.await.expect("join"));
        }
        released.sort();

        assert!(released[1] - released[0] >= Duration::from_millis(40));
        assert!(released[2] - released[1] >= Duration::from_millis(40));
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn separate_limiters_do_not_block_each_other() {
        let a = RateLimiter::new(Duration::from_millis(200));
        let b = RateLimiter::new(Duration::from_millis(200));
        a.acquire().await;
        let start = Instant::now();
        b.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let throttle = Throttle::new(Source::JobBank, Duration::ZERO, fast_policy(3));
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let (result, trace) = throttle
            .call_traced(|| async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(JobCompassError::Network("connection reset".into()))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.expect("second attempt succeeds"), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(trace[0], CallState::Idle));
        assert!(trace.iter().any(|s| matches!(s, CallState::RetryScheduled { attempt: 1, .. })));
        assert_eq!(trace.last(), Some(&CallState::Success));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let throttle = Throttle::new(Source::Adzuna, Duration::ZERO, fast_policy(3));
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<()> = throttle
            .call(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(JobCompassError::Http {
                    status: 503,
                    message: "unavailable".into(),
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let throttle = Throttle::new(Source::JSearch, Duration::ZERO, fast_policy(3));
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let (result, trace): (Result<()>, _) = throttle
            .call_traced(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(JobCompassError::auth("jsearch", "403"))
            })
            .await;

        assert!(matches!(result, Err(JobCompassError::Auth { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(trace.last(), Some(&CallState::Failed));
        assert!(trace.last().is_some_and(CallState::is_terminal));
    }
}
