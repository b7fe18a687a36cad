use chrono::{DateTime, Utc};
use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};

use crate::models::retry::RetryConfig;

/// Failure of the last attempt plus how many attempts were made.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Runs `operation` up to `config.max_attempts` times. After failed attempt
/// `n` the caller sleeps `n * delay_unit_ms` before trying again.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(attempt, max_attempts, "Retry succeeded");
                }
                return Ok(result);
            }
            Err(e) => {
                if attempt >= max_attempts {
                    warn!(
                        max_attempts,
                        error = %e,
                        "Retry failed after exhausting all attempts"
                    );
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }

                let delay_ms = config.delay_unit_ms * u64::from(attempt);

                debug!(
                    attempt,
                    max_attempts,
                    delay_ms,
                    error = %e,
                    "Retry attempt failed, backing off"
                );

                sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

/// "Tuesday, March 4, 2025 at 2:30 PM"
pub fn format_long_date(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%A, %B %-d, %Y at %-I:%M %p").to_string()
}

/// Plain two-decimal amount, no currency symbol or grouping.
pub fn format_currency(amount: f64) -> String {
    format!("{:.2}", amount)
}
