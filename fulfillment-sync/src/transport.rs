//! HTTP transport seam for the provider API
//!
//! The client talks to the provider through [`HttpTransport`] so tests can
//! substitute a scripted transport; [`ReqwestTransport`] is the production
//! implementation.

use async_trait::async_trait;
use http::Method;
use reqwest::Client;
use serde_json::Value;

use crate::config::FulfillmentConfig;
use crate::error::{FulfillmentError, FulfillmentResult};

/// A single request to the provider REST API
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub method: Method,
    /// Path relative to the base URL, e.g. `orders/123`
    pub path: String,
    pub body: Option<Value>,
}

impl ProviderRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
        }
    }
}

/// Raw provider response before envelope decoding
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    /// `Retry-After` header in seconds, when present
    pub retry_after: Option<u64>,
    pub body: Value,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport over which provider requests are sent
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send one request; `Err` means the transport itself failed
    /// (non-2xx responses come back as `Ok`)
    async fn send(&self, request: &ProviderRequest) -> FulfillmentResult<RawResponse>;
}

/// reqwest-backed transport with bearer auth and optional store scoping
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
    token: String,
    store_id: Option<String>,
}

impl ReqwestTransport {
    /// Build a transport from configuration; fails with `NotConfigured`
    /// when no API token is present
    pub fn new(config: &FulfillmentConfig) -> FulfillmentResult<Self> {
        let token = config
            .api_token
            .clone()
            .ok_or(FulfillmentError::NotConfigured)?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FulfillmentError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
            store_id: config.store_id.clone(),
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &ProviderRequest) -> FulfillmentResult<RawResponse> {
        let url = format!("{}/{}", self.base_url, request.path.trim_start_matches('/'));

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .bearer_auth(&self.token);

        if let Some(store_id) = &self.store_id {
            builder = builder.header("X-PF-Store-Id", store_id);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FulfillmentError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        // The provider sends JSON on both success and error paths; anything
        // else (e.g. a gateway HTML page) is kept as a raw string
        let text = response
            .text()
            .await
            .map_err(|e| FulfillmentError::Network(e.to_string()))?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }
}
