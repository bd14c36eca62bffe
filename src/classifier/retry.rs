//! Bounded retry with exponential backoff for classifier calls.

use std::thread;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::{Error, Result};

/// Runs `operation`, retrying on [`Error::Transient`] with exponential
/// backoff.
///
/// Other error variants are surfaced immediately; a run that exhausts its
/// retries surfaces the final `Transient` error unchanged. Backoff doubles
/// per attempt from `base_backoff_ms`, capped at `max_backoff_ms`.
pub fn with_backoff<T, F>(config: &RetryConfig, operation_name: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 0u32;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(Error::Transient { operation, cause }) if attempt < config.max_retries => {
                let backoff_ms = config
                    .base_backoff_ms
                    .saturating_mul(1u64 << attempt.min(16))
                    .min(config.max_backoff_ms);
                attempt += 1;
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_retries = config.max_retries,
                    backoff_ms,
                    "transient failure in '{operation}': {cause}; retrying"
                );
                metrics::counter!(
                    "coachdb_classifier_retries_total",
                    "operation" => operation_name.to_string()
                )
                .increment(1);
                thread::sleep(Duration::from_millis(backoff_ms));
            },
            Err(e) => return Err(e),
        }
    }
}
