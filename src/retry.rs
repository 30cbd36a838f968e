// src/retry.rs
//! Uniform retry-with-backoff for external calls (embeddings, text generation).
//!
//! Delay before retry `n` (1-based) is `base_delay * multiplier^(n-1)`.
//! Only errors classified as transient are retried; anything else returns at once.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

/// Errors that can tell whether another attempt might succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(rename = "base_delay_ms", with = "millis")]
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier,
        }
    }

    /// No waiting between attempts (tests, local backends).
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, 1.0)
    }

    /// Delay after the failed attempt with 0-based index `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(16) as i32);
        let secs = self.base_delay.as_secs_f64() * factor;
        if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs.min(300.0))
        } else {
            Duration::ZERO
        }
    }
}

/// Run `op` under `policy`. The closure receives the 0-based attempt index.
///
/// Returns the last error once attempts are exhausted or on the first
/// non-transient failure.
pub async fn retry_async<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt + 1 < attempts => {
                let wait = policy.delay_for(attempt);
                tracing::warn!(
                    call = label,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    wait_ms = wait.as_millis() as u64,
                    error = %e,
                    "transient failure, backing off"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::error!(call = label, attempts, error = %e, "retries exhausted");
                }
                return Err(e);
            }
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestErr(bool);
    impl std::fmt::Display for TestErr {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "err(transient={})", self.0)
        }
    }
    impl Transient for TestErr {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn delays_grow_exponentially() {
        let p = RetryPolicy::new(3, Duration::from_secs(1), 2.0);
        assert_eq!(p.delay_for(0), Duration::from_secs(1));
        assert_eq!(p.delay_for(1), Duration::from_secs(2));
        assert_eq!(p.delay_for(2), Duration::from_secs(4));
        assert_eq!(RetryPolicy::immediate(3).delay_for(5), Duration::ZERO);
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let out: Result<u32, TestErr> = retry_async(&RetryPolicy::immediate(3), "t", |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(TestErr(true))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(out.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn attempts_are_capped() {
        let calls = AtomicU32::new(0);
        let out: Result<(), TestErr> = retry_async(&RetryPolicy::immediate(3), "t", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestErr(true)) }
        })
        .await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let out: Result<(), TestErr> = retry_async(&RetryPolicy::immediate(5), "t", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestErr(false)) }
        })
        .await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn policy_parses_from_toml() {
        let p: RetryPolicy =
            toml::from_str("max_attempts = 4\nbase_delay_ms = 250\nmultiplier = 3.0").unwrap();
        assert_eq!(p.max_attempts, 4);
        assert_eq!(p.base_delay, Duration::from_millis(250));
        assert_eq!(p.delay_for(1), Duration::from_millis(750));
    }
}
