//! Bounded retry with exponential backoff

use std::future::Future;
use std::time::Duration;

use log::warn;

use crate::core::error::{Error, Result};

/// Attempts for metadata and listing calls; kept small so a persistent
/// listing failure surfaces quickly
pub const METADATA_ATTEMPTS: u32 = 3;

/// Delay before retry number `attempt` (1-based): base, 2×base, 4×base, ...
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
}

/// Run `operation` up to `max_attempts` times, retrying only transient errors
pub async fn retry_transient<F, Fut, T>(
    what: &str,
    max_attempts: u32,
    base_delay: Duration,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(Error::Transient(msg)) if attempt < max_attempts => {
                let delay = backoff_delay(base_delay, attempt);
                warn!(
                    "⚠️  {what}: transient error (attempt {attempt}/{max_attempts}): {msg}. Retrying in {}ms...",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
