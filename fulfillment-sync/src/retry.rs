//! Bounded exponential backoff around a single provider call
//!
//! Classifies responses into retryable and terminal. Non-retryable statuses
//! (including plain 4xx) pass through to the caller unmodified; retryable
//! ones are reattempted up to the configured ceiling and then surfaced as
//! the last observed error.

use std::future::Future;
use std::time::Duration;

use crate::error::{FulfillmentError, FulfillmentResult};
use crate::transport::RawResponse;

/// Canonical set of retryable HTTP statuses
pub const RETRYABLE_STATUSES: &[u16] = &[408, 429, 500, 502, 503, 504];

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first (total = max_retries + 1)
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            retryable_statuses: RETRYABLE_STATUSES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// No retries: a single attempt, fail-fast
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn is_retryable(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Backoff delay before attempt `attempt + 1`; a 429 `Retry-After`
    /// header overrides the computed backoff for that one wait
    fn delay_for(&self, attempt: u32, response: &RawResponse) -> Duration {
        if response.status == 429 {
            if let Some(seconds) = response.retry_after {
                return Duration::from_secs(seconds).min(self.max_delay);
            }
        }
        let backoff = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(backoff as u64).min(self.max_delay)
    }
}

/// Run `op` under `policy`, returning the first terminal response or the
/// last observed error once attempts are exhausted
pub async fn execute_with_retry<F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> FulfillmentResult<RawResponse>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = FulfillmentResult<RawResponse>>,
{
    let mut last_error: FulfillmentError;

    for attempt in 0..=policy.max_retries {
        match op().await {
            Ok(response) => {
                if response.is_success() || !policy.is_retryable(response.status) {
                    return Ok(response);
                }
                let delay = policy.delay_for(attempt, &response);
                last_error = retryable_to_error(&response);
                if attempt < policy.max_retries {
                    tracing::debug!(
                        status = response.status,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Retryable provider response, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e @ FulfillmentError::Network(_)) => {
                // Transport failures are always retryable
                let delay = policy.delay_for(attempt, &RawResponse {
                    status: 0,
                    retry_after: None,
                    body: serde_json::Value::Null,
                });
                last_error = e;
                if attempt < policy.max_retries {
                    tracing::debug!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Network error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => return Err(e),
        }

        if attempt == policy.max_retries {
            return Err(last_error);
        }
    }

    unreachable!("retry loop always returns")
}

/// Convert a retryable response into the error surfaced on exhaustion
fn retryable_to_error(response: &RawResponse) -> FulfillmentError {
    if response.status == 429 {
        return FulfillmentError::RateLimited {
            retry_after_ms: response.retry_after.map(|s| s * 1000),
        };
    }
    let message = response
        .body
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or("provider returned a retryable error")
        .to_string();
    FulfillmentError::api(response.status, message)
}
