//! Poller for long-running provider-side jobs (mockup generation)
//!
//! The attempt/backoff/terminal logic is an explicit state machine so the
//! bounded-attempts and backoff-ceiling invariants are testable without a
//! network. Bounds are attempt-count-based, not wall-clock-based.

use std::sync::Arc;
use std::time::Duration;

use crate::client::{FulfillmentClient, MockupTask, MockupTaskStatus};
use crate::error::FulfillmentError;

/// Polling schedule for one task
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Maximum status polls before giving up
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 12,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(15),
            backoff_multiplier: 1.5,
        }
    }
}

impl PollerConfig {
    fn next_delay(&self, current: Duration) -> Duration {
        let next = current.as_millis() as f64 * self.backoff_multiplier;
        Duration::from_millis(next as u64).min(self.max_delay)
    }
}

/// State of one polling loop
#[derive(Debug, Clone)]
pub enum PollState {
    /// About to issue poll number `attempt` (zero-based)
    Pending { attempt: u32 },
    /// Waiting out the backoff delay before the next poll
    Retrying { attempt: u32, delay: Duration },
    Completed(MockupTask),
    /// Provider marked the task failed
    Failed { reason: Option<String> },
    /// A non-retryable error ended the loop
    Aborted(FulfillmentError),
    /// Attempts exhausted without a terminal task status
    TimedOut,
}

impl PollState {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed(_) | Self::Failed { .. } | Self::Aborted(_) | Self::TimedOut
        )
    }
}

/// Pure transition function: fold one poll result into the machine.
/// 5xx, rate-limit and transport errors are transient; 4xx aborts.
fn on_poll_result(
    config: &PollerConfig,
    attempt: u32,
    delay: Duration,
    result: Result<MockupTask, FulfillmentError>,
) -> PollState {
    match result {
        Ok(task) => match task.status {
            MockupTaskStatus::Completed => PollState::Completed(task),
            MockupTaskStatus::Failed => PollState::Failed { reason: task.error },
            MockupTaskStatus::Pending | MockupTaskStatus::Unknown => retry_or_time_out(config, attempt, delay),
        },
        Err(FulfillmentError::Api { status, .. }) if (500..600).contains(&status) => {
            retry_or_time_out(config, attempt, delay)
        }
        Err(FulfillmentError::Network(_)) | Err(FulfillmentError::RateLimited { .. }) => {
            retry_or_time_out(config, attempt, delay)
        }
        Err(e) => PollState::Aborted(e),
    }
}

fn retry_or_time_out(config: &PollerConfig, attempt: u32, delay: Duration) -> PollState {
    if attempt + 1 >= config.max_attempts {
        PollState::TimedOut
    } else {
        PollState::Retrying { attempt, delay }
    }
}

/// Drives mockup generation tasks to completion
pub struct TaskPoller {
    client: Arc<FulfillmentClient>,
    config: PollerConfig,
}

impl TaskPoller {
    pub fn new(client: Arc<FulfillmentClient>) -> Self {
        Self {
            client,
            config: PollerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PollerConfig) -> Self {
        self.config = config;
        self
    }

    /// Poll one task to a terminal state. `None` means "no mockups
    /// produced" — a degraded outcome the caller tolerates, not an error.
    pub async fn wait_for_task(&self, task_key: &str) -> Option<MockupTask> {
        // Generation typically takes single-digit seconds; wait before the
        // first poll rather than burning an attempt immediately
        tokio::time::sleep(self.config.initial_delay).await;

        let mut delay = self.config.initial_delay;
        let mut state = PollState::Pending { attempt: 0 };

        while !state.is_terminal() {
            state = match state {
                PollState::Pending { attempt } => {
                    let result = self.client.get_mockup_task(task_key).await;
                    on_poll_result(&self.config, attempt, delay, result)
                }
                PollState::Retrying { attempt, delay: wait } => {
                    tokio::time::sleep(wait).await;
                    delay = self.config.next_delay(wait);
                    PollState::Pending {
                        attempt: attempt + 1,
                    }
                }
                terminal => terminal,
            };
        }

        match state {
            PollState::Completed(task) => Some(task),
            PollState::Failed { reason } => {
                tracing::warn!(
                    task_key,
                    reason = reason.as_deref().unwrap_or("unspecified"),
                    "Mockup task failed on the provider side"
                );
                None
            }
            PollState::Aborted(e) => {
                tracing::error!(task_key, error = %e, "Mockup task poll aborted");
                None
            }
            PollState::TimedOut => {
                tracing::warn!(
                    task_key,
                    attempts = self.config.max_attempts,
                    "Mockup task did not finish within the attempt budget"
                );
                None
            }
            PollState::Pending { .. } | PollState::Retrying { .. } => unreachable!(),
        }
    }

    /// Poll several tasks concurrently and independently; one task failing
    /// neither cancels nor blocks the others. Results are gathered before
    /// anything downstream persists them.
    pub async fn wait_for_all(&self, task_keys: &[String]) -> Vec<MockupTask> {
        let polls = task_keys.iter().map(|key| self.wait_for_task(key));
        futures::future::join_all(polls)
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}
