use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

// ============================================================================
// Exponential Backoff Retry
// ============================================================================
//
// Only used while the process starts and its dependencies may still be
// coming up. Message handling never retries in-process; redelivery is the
// broker's job.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl RetryConfig {
    /// Roughly half a minute of patience for dependencies started alongside us.
    pub fn startup() -> Self {
        Self {
            max_attempts: 6,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }

    fn next_delay(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier).min(self.max_delay)
    }
}

/// Run `operation` until it succeeds or `max_attempts` is used up.
/// The last error is returned unchanged.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt >= config.max_attempts => {
                tracing::error!(
                    operation = operation_name,
                    attempt,
                    error = %e,
                    "Giving up"
                );
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts = config.max_attempts,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Attempt failed, retrying"
                );
                sleep(delay).await;
                delay = config.next_delay(delay);
                attempt += 1;
            }
        }
    }
}
