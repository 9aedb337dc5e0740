//! Provider connection configuration
//!
//! All fields can be overridden through environment variables:
//!
//! | Environment variable | Default | Meaning |
//! |-----------------------|---------|---------|
//! | FULFILLMENT_API_TOKEN | (unset) | Bearer token for the provider API |
//! | FULFILLMENT_STORE_ID | (unset) | Optional store scoping header |
//! | FULFILLMENT_BASE_URL | https://api.printful.com | Provider REST base URL |
//! | FULFILLMENT_TIMEOUT_SECS | 30 | Per-request timeout |
//! | FULFILLMENT_RATE_QUOTA | 120 | Outbound calls per rate window |
//! | FULFILLMENT_RATE_WINDOW_SECS | 60 | Rate window length |
//! | FULFILLMENT_CACHE_TTL_SECS | 300 | Catalog cache TTL |

use std::time::Duration;

/// Configuration for the fulfillment provider connection
#[derive(Debug, Clone)]
pub struct FulfillmentConfig {
    /// Bearer token; `None` means the integration is not configured
    pub api_token: Option<String>,
    /// Optional store id sent as an `X-PF-Store-Id` header
    pub store_id: Option<String>,
    /// Provider REST base URL
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Outbound call quota per rate window
    pub rate_quota: u32,
    /// Rate window length
    pub rate_window: Duration,
    /// TTL for cached catalog lookups
    pub cache_ttl: Duration,
}

impl FulfillmentConfig {
    /// Load configuration from environment variables, using defaults
    /// for anything unset
    pub fn from_env() -> Self {
        Self {
            api_token: std::env::var("FULFILLMENT_API_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            store_id: std::env::var("FULFILLMENT_STORE_ID")
                .ok()
                .filter(|s| !s.is_empty()),
            base_url: std::env::var("FULFILLMENT_BASE_URL")
                .unwrap_or_else(|_| "https://api.printful.com".into()),
            timeout: Duration::from_secs(
                std::env::var("FULFILLMENT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            rate_quota: std::env::var("FULFILLMENT_RATE_QUOTA")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
            rate_window: Duration::from_secs(
                std::env::var("FULFILLMENT_RATE_WINDOW_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60),
            ),
            cache_ttl: Duration::from_secs(
                std::env::var("FULFILLMENT_CACHE_TTL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(300),
            ),
        }
    }

    /// Set the API token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Set the store id
    pub fn with_store_id(mut self, store_id: impl Into<String>) -> Self {
        self.store_id = Some(store_id.into());
        self
    }

    /// Set the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the rate quota and window
    pub fn with_rate_limit(mut self, quota: u32, window: Duration) -> Self {
        self.rate_quota = quota;
        self.rate_window = window;
        self
    }

    /// Whether an API token is present
    pub fn is_configured(&self) -> bool {
        self.api_token.is_some()
    }
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            store_id: None,
            base_url: "https://api.printful.com".into(),
            timeout: Duration::from_secs(30),
            rate_quota: 120,
            rate_window: Duration::from_secs(60),
            cache_ttl: Duration::from_secs(300),
        }
    }
}
