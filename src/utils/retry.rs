// Retry logic with Google retryDelay hint support
// Author: kelexine (https://github.com/kelexine)

use backoff::{backoff::Backoff, ExponentialBackoff};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Parse Google's retryDelay duration string (e.g., "0.457639761s", "40s")
/// Returns duration in milliseconds, capped at 60 seconds
pub fn parse_retry_delay(error_json: &str) -> Option<Duration> {
    let parsed: Value = serde_json::from_str(error_json).ok()?;
    
    // Navigate: error.details[] -> find RetryInfo -> retryDelay
    let details = parsed.get("error")?.get("details")?.as_array()?;
    
    for detail in details {
        if detail.get("@type")?.as_str()? == "type.googleapis.com/google.rpc.RetryInfo" {
            if let Some(retry_delay) = detail.get("retryDelay").and_then(|v| v.as_str()) {
                return parse_duration_string(retry_delay);
            }
        }
    }
    
    None
}

/// Parse duration strings like "0.457639761s", "40s", "1.5s"
/// Returns duration, capped at 60 seconds
fn parse_duration_string(duration_str: &str) -> Option<Duration> {
    // Remove 's' suffix and parse as float
    let seconds_str = duration_str.strip_suffix('s')?;
    let seconds: f64 = seconds_str.parse().ok()?;
    
    // Cap at 60 seconds (from Gemini CLI implementation)
    let capped_seconds = seconds.min(60.0);
    
    let millis = (capped_seconds * 1000.0) as u64;
    Some(Duration::from_millis(millis))
}

/// Create exponential backoff configuration for retries
pub fn create_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: Duration::from_millis(500),     // Start at 500ms
        initial_interval: Duration::from_millis(500),
        randomization_factor: 0.3,                         // Add jitter
        multiplier: 2.0,                                  // Double each time
        max_interval: Duration::from_secs(30),            // Cap at 30s
        max_elapsed_time: Some(Duration::from_secs(120)), // Give up after 2 minutes
        ..Default::default()
    }
}

/// Determine if an HTTP status code is retryable
pub fn is_retryable(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Delay before the next attempt: Google's hint when the error body has one,
/// otherwise the next exponential backoff step.
fn next_delay(backoff: &mut ExponentialBackoff, error_body: &str) -> Duration {
    parse_retry_delay(error_body)
        .or_else(|| backoff.next_backoff())
        .unwrap_or(Duration::from_secs(30))
}

/// Run `operation` until it succeeds, fails with a non-retryable status, or
/// `max_attempts` calls have been made (at least one always is).
///
/// Errors are `(http_status, raw_body)`; the raw body is kept intact so the
/// RetryInfo hint can be read from it.
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    max_attempts: u32,
    mut operation: F,
) -> Result<T, (u16, String)>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, (u16, String)>>,
{
    let mut backoff = create_backoff();
    let mut attempt = 0;

    loop {
        attempt += 1;

        let (status, error_body) = match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(e) => e,
        };

        if !is_retryable(status) || attempt >= max_attempts {
            return Err((status, error_body));
        }

        let delay = next_delay(&mut backoff, &error_body);
        debug!(
            "{} failed with {} (attempt {}/{}), retrying after {}ms",
            operation_name,
            status,
            attempt,
            max_attempts,
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;
    }
}
