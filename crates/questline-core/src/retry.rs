//! ============================================================================
//! Retry Logic - Exponential Backoff for Transient Failures
//! ============================================================================
//! Lock contention surfaces as `Busy`/`Conflict`. Those are retried a
//! bounded number of times with exponential backoff and jitter; every other
//! error is returned immediately.
//! ============================================================================

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::types::Result;

/// How hard to retry `Busy` and `Conflict`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts in total, the first one included
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per attempt
    pub base_delay_ms: u64,
    /// Upper bound on the backoff, before jitter
    pub max_delay_ms: u64,
    /// Add up to 50% random spread
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 25,
            max_delay_ms: 500,
            jitter: true,
        }
    }
}

/// Backoff before retry `attempt` (0-based): `base * 2^attempt`, capped at
/// `max_delay_ms`, plus up to half again when jitter is on
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let backoff = 1u64
        .checked_shl(attempt)
        .and_then(|factor| config.base_delay_ms.checked_mul(factor))
        .unwrap_or(u64::MAX)
        .min(config.max_delay_ms);

    let spread = if config.jitter {
        rand::thread_rng().gen_range(0..=backoff / 2)
    } else {
        0
    };
    Duration::from_millis(backoff.saturating_add(spread))
}

/// Run `op`, retrying transient failures up to `config.max_attempts` times
pub async fn retry_transient<T, F, Fut>(config: &RetryConfig, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("{} succeeded on attempt {}", label, attempt + 1);
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                let delay = calculate_delay(attempt, config);
                warn!(
                    "{} attempt {} failed ({}), retrying after {:?}",
                    label,
                    attempt + 1,
                    e,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!("{} giving up after {} attempts: {}", label, attempts, e);
                }
                return Err(e);
            }
        }
    }
}
