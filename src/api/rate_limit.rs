//! Shared request gate with exponential backoff for the chain API.
//!
//! Every call routed through a [`RateLimitedClient`] waits until at least
//! `1/rps` seconds have passed since the previous request issued through the
//! same client, then runs. Transient failures are retried with
//! `base_delay * 2^attempt + U(0, 0.25s)` until `max_tries` attempts are used.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use super::ChainApiError;

const MIN_RPS: f64 = 0.1;
const MAX_JITTER: Duration = Duration::from_millis(250);

/// Retry settings for a [`RateLimitedClient`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_tries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_tries: 5,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Exponential backoff with additive uniform jitter.
#[derive(Debug, Clone)]
pub struct JitteredExponential {
    policy: RetryPolicy,
    attempt: u32,
}

impl JitteredExponential {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Deterministic part of the delay for a given attempt.
    pub fn base_for(&self, attempt: u32) -> Duration {
        self.policy.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Backoff for JitteredExponential {
    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.attempt + 1 >= self.policy.max_tries {
            return None;
        }
        let jitter = rand::thread_rng().gen_range(Duration::ZERO..=MAX_JITTER);
        let delay = self.base_for(self.attempt) + jitter;
        self.attempt += 1;
        Some(delay)
    }
}

/// Serializes calls to an external API at a bounded rate.
///
/// All callers that share an upstream must share one instance; the spacing
/// guarantee only holds for requests that go through the same gate.
pub struct RateLimitedClient {
    min_interval: Duration,
    policy: RetryPolicy,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimitedClient {
    pub fn new(rps: f64, policy: RetryPolicy) -> Self {
        let rps = if rps.is_finite() { rps.max(MIN_RPS) } else { MIN_RPS };
        Self {
            min_interval: Duration::from_secs_f64(1.0 / rps),
            policy,
            last_request: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for our turn at the gate and stamp the request time.
    async fn wait_turn(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let next = prev + self.min_interval;
            if next > Instant::now() {
                sleep_until(next).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Run `request` through the gate, retrying transient failures.
    ///
    /// Returns the last error once retries are exhausted, or the first
    /// non-transient error immediately.
    pub async fn call<T, F, Fut>(&self, label: &str, request: F) -> Result<T, ChainApiError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ChainApiError>>,
    {
        let gate = self;
        let request = &request;

        backoff::future::retry_notify(
            JitteredExponential::new(self.policy),
            move || async move {
                gate.wait_turn().await;
                request().await.map_err(|e| {
                    if e.is_transient() {
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            },
            |e: ChainApiError, delay: Duration| {
                warn!(
                    request = label,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Transient chain API failure, backing off"
                );
            },
        )
        .await
        .map_err(|e| {
            debug!(request = label, error = %e, "Chain API request failed");
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    fn policy(max_tries: u32) -> RetryPolicy {
        RetryPolicy {
            max_tries,
            base_delay: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_backoff_schedule() {
        let mut b = JitteredExponential::new(policy(4));

        for attempt in 0..3u32 {
            let delay = b.next_backoff().unwrap();
            let base = Duration::from_millis(500) * 2u32.pow(attempt);
            assert!(delay >= base);
            assert!(delay <= base + MAX_JITTER);
        }
        // 4 tries means only 3 waits
        assert!(b.next_backoff().is_none());

        b.reset();
        assert!(b.next_backoff().is_some());
    }

    #[test]
    fn test_rps_is_clamped() {
        let client = RateLimitedClient::new(0.0, RetryPolicy::default());
        assert_eq!(client.min_interval(), Duration::from_secs(10));

        let client = RateLimitedClient::new(4.0, RetryPolicy::default());
        assert_eq!(client.min_interval(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_are_spaced() {
        let client = RateLimitedClient::new(5.0, policy(1));
        let stamps = StdMutex::new(Vec::new());
        let log = &stamps;

        for _ in 0..60u32 {
            client
                .call("spacing", move || async move {
                    log.lock().unwrap().push(Instant::now());
                    Ok::<_, ChainApiError>(())
                })
                .await
                .unwrap();
        }

        let stamps = stamps.into_inner().unwrap();
        assert_eq!(stamps.len(), 60);
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(200));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let client = RateLimitedClient::new(100.0, policy(5));
        let attempts = AtomicU32::new(0);
        let counter = &attempts;

        let result = client
            .call("flaky", move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(ChainApiError::RateLimited("429 Too Many Requests".into()))
                } else {
                    Ok(42u64)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let client = RateLimitedClient::new(100.0, policy(3));
        let attempts = AtomicU32::new(0);
        let counter = &attempts;

        let result: Result<(), _> = client
            .call("always-429", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ChainApiError::RateLimited("429".into()))
            })
            .await;

        assert!(matches!(result, Err(ChainApiError::RateLimited(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let client = RateLimitedClient::new(100.0, policy(5));
        let attempts = AtomicU32::new(0);
        let counter = &attempts;

        let result: Result<(), _> = client
            .call("bad-shape", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ChainApiError::DataShape("missing txs".into()))
            })
            .await;

        assert!(matches!(result, Err(ChainApiError::DataShape(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
