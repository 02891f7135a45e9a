//! Exponential-backoff retry for transient server-backend faults.
//!
//! Only errors classified `Transient` are retried; everything else
//! propagates immediately. The classifier is keyed on SQLSTATE so a backend
//! can plug in its own set.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::warn;

use ragstore_core::Result;

/// SQLSTATE classes retried by default: connection exceptions (class 08),
/// serialization failure, deadlock, too-many-connections, and
/// cannot-connect-now.
const TRANSIENT_SQLSTATES: &[&str] = &["40001", "40P01", "53300", "57P03"];

pub fn is_transient_sqlstate(code: &str) -> bool {
    code.starts_with("08") || TRANSIENT_SQLSTATES.contains(&code)
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub factor: u32,
    pub max_delay: Duration,
    pub max_total: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            factor: 2,
            max_delay: Duration::from_secs(5),
            max_total: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.factor.saturating_pow(attempt);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Run `attempt` until it succeeds, fails non-transiently, or the policy is
/// exhausted (retry count or total elapsed time).
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let mut retries = 0u32;
    loop {
        match attempt().await {
            Err(e) if e.is_transient() => {
                let delay = policy.delay_for(retries);
                if retries >= policy.max_retries
                    || started.elapsed().saturating_add(delay) > policy.max_total
                {
                    return Err(e);
                }
                retries += 1;
                warn!(
                    operation,
                    retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient storage fault, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragstore_core::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn classifier_accepts_connection_class_and_known_codes() {
        assert!(is_transient_sqlstate("08006"));
        assert!(is_transient_sqlstate("08000"));
        assert!(is_transient_sqlstate("40001"));
        assert!(is_transient_sqlstate("40P01"));
        assert!(!is_transient_sqlstate("23505"));
        assert!(!is_transient_sqlstate("42601"));
    }

    #[test]
    fn delays_double_and_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(200));
        assert_eq!(policy.delay_for(1), Duration::from_millis(400));
        assert_eq!(policy.delay_for(2), Duration::from_millis(800));
        assert_eq!(policy.delay_for(10), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_retry_up_to_the_cap() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&RetryPolicy::default(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::transient("connection reset")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4, "initial try plus 3 retries");
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&RetryPolicy::default(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::storage("syntax error")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&RetryPolicy::default(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::transient("flaky"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }
}
