//! Error taxonomy for provider-facing operations

use thiserror::Error;

/// Error type for all fulfillment operations
#[derive(Debug, Clone, Error)]
pub enum FulfillmentError {
    /// Provider credentials are missing; surfaced before any network call
    #[error("Fulfillment provider not configured: missing API token")]
    NotConfigured,

    /// Provider rate limit hit and retries exhausted
    #[error("Rate limited by provider (retry after {retry_after_ms:?} ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    /// Transport-level failure (connection refused, timeout, DNS)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-retryable HTTP failure or application-level error payload
    #[error("Provider API error ({status}): {reason}: {message}")]
    Api {
        status: u16,
        reason: String,
        message: String,
    },

    /// Looked-up entity does not exist (order, product, variant)
    #[error("{0} not found")]
    NotFound(String),

    /// Local persistence failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Response body did not match the expected shape
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl FulfillmentError {
    /// Create an Api error with a generic reason
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            reason: "api_error".to_string(),
            message: message.into(),
        }
    }

    /// Create a Storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a NotFound error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }
}

/// Result type for fulfillment operations
pub type FulfillmentResult<T> = Result<T, FulfillmentError>;
