//! Retry logic with exponential backoff
//!
//! This module provides configurable retry logic for transient failures.
//! It implements exponential backoff with optional jitter to prevent thundering herd.
//! All waits go through a caller-supplied [`Clock`], so retry behavior is
//! deterministic under test without real delays.

use crate::config::RetryConfig;
use crate::error::Error;
use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Suspension point abstraction
///
/// The reconciler and retry helpers never call `tokio::time::sleep` directly;
/// they suspend through whatever clock the caller supplies. Production code
/// uses [`TokioClock`]; tests inject a recording clock that returns
/// immediately.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Suspend the current task for at least `duration`
    async fn sleep(&self, duration: Duration);
}

/// Production clock backed by the tokio timer
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, connection resets) should return `true`.
/// Permanent failures (account not found, corrupt store, bad config) should
/// return `false`. Rate limiting is deliberately *not* retryable here: it
/// carries its own wait duration and is handled by the reconciler's
/// rate-limit loop, not by exponential backoff.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Explicitly transient by classification at the fetch boundary
            Error::Transient(_) => true,
            // Network errors are retryable when they are timeouts or connect failures
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            // I/O errors can be retryable in some cases
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // Rate limiting has its own wait-then-retry loop with an explicit duration
            Error::RateLimited { .. } => false,
            // Persistence errors are never retried (risk of masking corruption)
            Error::Store(_) => false,
            // Download task failures are retried by the media queue, not here
            Error::Download(_) => false,
            // Absent account is permanent
            Error::NotFound(_) => false,
            // Config errors are permanent
            Error::Config { .. } => false,
            // Quarantined records are permanent for that record
            Error::InvalidRecord { .. } => false,
            // Serialization errors are permanent
            Error::Serialization(_) => false,
            // External tool errors might be retryable (temporary failures)
            Error::ExternalTool(msg) => {
                msg.contains("timeout") || msg.contains("busy") || msg.contains("temporary")
            }
            // Cancellation is deliberate
            Error::Cancelled => false,
            // Unknown errors - be conservative and don't retry
            Error::Other(_) => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// # Arguments
///
/// * `config` - Retry configuration (max attempts, delays, backoff multiplier, jitter)
/// * `clock` - Suspension point used between attempts
/// * `operation` - Async closure returning `Result<T, E>` where `E: IsRetryable`
///
/// # Returns
///
/// Returns the successful result or the last error after all retry attempts
/// are exhausted. Non-retryable errors surface immediately.
pub async fn fetch_with_retry<C, F, Fut, T, E>(
    config: &RetryConfig,
    clock: &C,
    mut operation: F,
) -> Result<T, E>
where
    C: Clock + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                let jittered_delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                clock.sleep(jittered_delay).await;

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(
                        error = %e,
                        "Operation failed with non-retryable error"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// actual delay falls between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::from_secs_f64(jittered_secs)
}
