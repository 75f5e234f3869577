// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Retry engine with exponential backoff and jitter for adapter-level I/O.
//
// Only transient errors are retried, and only a bounded number of times.
// Session calls are never retried: a repeated read would duplicate or drop
// image bytes.

use std::time::Duration;

use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::logger::Logger;
use scanwerk_core::types::ErrorClass;
use tracing::{debug, warn};

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first call.
    pub max_retries: u32,
    /// Base delay between retries (exponential backoff).
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryConfig {
    /// No waiting between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }
}

/// Result of evaluating whether to retry.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after this delay.
    RetryAfter(Duration),
    /// Do not retry: the error is permanent.
    GiveUp(ErrorClass),
    /// Maximum retries exhausted.
    Exhausted,
}

/// Classify a `ScanError` for retry decisions.
pub fn classify_error(err: &ScanError) -> ErrorClass {
    err.class()
}

/// Decide whether to retry based on the error class and attempt count.
pub fn should_retry(err: &ScanError, attempt: u32, config: &RetryConfig) -> RetryDecision {
    match classify_error(err) {
        ErrorClass::Permanent => RetryDecision::GiveUp(ErrorClass::Permanent),
        ErrorClass::Transient => {
            if attempt >= config.max_retries {
                warn!(attempt, max = config.max_retries, "retry limit exhausted");
                RetryDecision::Exhausted
            } else {
                let delay = compute_delay(attempt, config);
                debug!(attempt, delay_ms = delay.as_millis(), "scheduling retry");
                RetryDecision::RetryAfter(delay)
            }
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or retries run out.
pub fn with_retry<T>(
    config: &RetryConfig,
    logger: &Logger,
    what: &str,
    mut op: impl FnMut() -> Result<T>,
) -> Result<T> {
    let mut attempt = 0;
    loop {
        let err = match op() {
            Ok(v) => return Ok(v),
            Err(err) => err,
        };
        match should_retry(&err, attempt, config) {
            RetryDecision::RetryAfter(delay) => {
                logger.warning(
                    "workaround.retry_io",
                    &format!("{what} failed ({err}), retry {} in {delay:?}", attempt + 1),
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            RetryDecision::GiveUp(_) | RetryDecision::Exhausted => return Err(err),
        }
    }
}

/// Compute exponential backoff delay with jitter.
///
/// delay = min(base * 2^attempt + jitter, max_delay)
fn compute_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base_ms = config.base_delay.as_millis() as u64;
    let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(10));
    let total_ms = exp_ms.saturating_add(jitter(base_ms, attempt));
    let capped_ms = total_ms.min(config.max_delay.as_millis() as u64);
    Duration::from_millis(capped_ms)
}

/// Deterministic jitter in [0, base) derived from the attempt number.
fn jitter(base_ms: u64, attempt: u32) -> u64 {
    let hash = (attempt as u64).wrapping_mul(6364136223846793005);
    hash % base_ms.max(1)
}
