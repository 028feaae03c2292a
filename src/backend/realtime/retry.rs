//! # Bring-up Retry
//!
//! Bounded exponential backoff for backplane connects. Only errors that report
//! themselves as retryable (connection and I/O failures) are attempted again;
//! configuration errors surface on the first attempt.

use std::future::Future;
use std::time::Duration;

use crate::backend::error::BackendError;
use crate::shared::config::LifecycleOptions;

/// Backoff strategy between connect attempts
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Same delay before every retry
    Fixed {
        interval: Duration,
    },
    /// Doubling delay, capped at `max_interval`
    Exponential {
        base_interval: Duration,
        max_interval: Duration,
    },
}

impl BackoffStrategy {
    /// Delay before retry number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed { interval } => *interval,
            BackoffStrategy::Exponential {
                base_interval,
                max_interval,
            } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                base_interval.saturating_mul(factor).min(*max_interval)
            }
        }
    }
}

/// Retry policy derived from the `[sockets.lifecycle]` table
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure
    pub max_retries: u32,
    pub backoff: BackoffStrategy,
}

impl From<&LifecycleOptions> for RetryPolicy {
    fn from(options: &LifecycleOptions) -> Self {
        Self {
            max_retries: options.connect_retries,
            backoff: BackoffStrategy::Exponential {
                base_interval: Duration::from_millis(options.initial_backoff_ms),
                max_interval: Duration::from_millis(options.max_backoff_ms),
            },
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the retry
/// budget is spent
pub async fn retry_connect<T, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!("[Lifecycle] {} connected after {} retries", label, attempt);
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.backoff.delay(attempt);
                tracing::warn!(
                    "[Lifecycle] {} failed ({}), retry {}/{} in {:?}",
                    label,
                    err,
                    attempt,
                    policy.max_retries,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
