//! Typed façade over the provider's REST endpoints
//!
//! Composes the rate limiter, retry executor and response cache. Mutating
//! calls carry a caller-supplied external id so retried submissions never
//! create duplicate provider orders.

mod types;

pub use types::*;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::config::FulfillmentConfig;
use crate::error::{FulfillmentError, FulfillmentResult};
use crate::limiter::RateLimiter;
use crate::retry::{RetryPolicy, execute_with_retry};
use crate::transport::{HttpTransport, ProviderRequest, RawResponse, ReqwestTransport};

/// Client for the fulfillment provider API
pub struct FulfillmentClient {
    transport: Option<Arc<dyn HttpTransport>>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    cache: ResponseCache,
}

impl FulfillmentClient {
    /// Build a client from configuration. A missing API token still yields
    /// a client; every call on it returns [`FulfillmentError::NotConfigured`].
    pub fn new(config: &FulfillmentConfig) -> Self {
        let transport: Option<Arc<dyn HttpTransport>> = if config.is_configured() {
            ReqwestTransport::new(config)
                .ok()
                .map(|t| Arc::new(t) as Arc<dyn HttpTransport>)
        } else {
            None
        };
        Self::assemble(transport, config)
    }

    /// Build a client over a custom transport (used by tests)
    pub fn with_transport(transport: Arc<dyn HttpTransport>, config: &FulfillmentConfig) -> Self {
        Self::assemble(Some(transport), config)
    }

    fn assemble(transport: Option<Arc<dyn HttpTransport>>, config: &FulfillmentConfig) -> Self {
        Self {
            transport,
            limiter: RateLimiter::new(config.rate_quota, config.rate_window),
            retry: RetryPolicy::default(),
            cache: ResponseCache::new(config.cache_ttl),
        }
    }

    /// Override the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    // ========== Orders ==========

    /// Create a draft order; `confirm` submits it for fulfillment in the
    /// same call. `external_id` must be derived deterministically from the
    /// local order id — the provider dedupes on it.
    pub async fn create_order(
        &self,
        request: &CreateOrderRequest,
        confirm: bool,
    ) -> FulfillmentResult<ExternalOrder> {
        let path = if confirm { "orders?confirm=1" } else { "orders" };
        let body = serde_json::to_value(request)
            .map_err(|e| FulfillmentError::InvalidResponse(e.to_string()))?;
        self.request(ProviderRequest::post(path, body)).await
    }

    /// Submit a draft order for fulfillment
    pub async fn confirm_order(&self, order_id: &str) -> FulfillmentResult<ExternalOrder> {
        self.request(ProviderRequest::post(
            format!("orders/{order_id}/confirm"),
            json!({}),
        ))
        .await
    }

    /// Fetch an order with its shipments. Accepts the provider's numeric id
    /// or an `@`-prefixed external id.
    pub async fn get_order(&self, order_id: &str) -> FulfillmentResult<ExternalOrder> {
        self.request(ProviderRequest::get(format!("orders/{order_id}")))
            .await
    }

    // ========== Catalog (cached) ==========

    /// Fetch a catalog product with variants; cached under the product id
    pub async fn get_catalog_product(&self, product_id: i64) -> FulfillmentResult<CatalogProduct> {
        self.request_cached(
            format!("catalog:product:{product_id}"),
            ProviderRequest::get(format!("products/{product_id}")),
        )
        .await
    }

    /// Search the catalog by free-text query; cached per query
    pub async fn search_catalog(&self, query: &str) -> FulfillmentResult<Vec<CatalogProduct>> {
        self.request_cached(
            format!("catalog:search:{query}"),
            ProviderRequest::get(format!("products?search={query}")),
        )
        .await
    }

    /// Drop cached catalog entries (e.g. after a provider catalog update)
    pub fn invalidate_catalog_cache(&self) {
        self.cache.invalidate_prefix("catalog:");
    }

    // ========== Mockup tasks ==========

    /// Start a mockup generation task for the given variants
    pub async fn create_mockup_task(
        &self,
        product_id: i64,
        variant_ids: &[i64],
        image_url: &str,
    ) -> FulfillmentResult<MockupTask> {
        self.request(ProviderRequest::post(
            format!("mockup-generator/create-task/{product_id}"),
            json!({
                "variant_ids": variant_ids,
                "files": [{"placement": "front", "image_url": image_url}],
            }),
        ))
        .await
    }

    /// Poll the status of a mockup generation task
    pub async fn get_mockup_task(&self, task_key: &str) -> FulfillmentResult<MockupTask> {
        self.request(ProviderRequest::get(format!(
            "mockup-generator/task?task_key={task_key}"
        )))
        .await
    }

    // ========== Plumbing ==========

    async fn request<T: DeserializeOwned>(&self, request: ProviderRequest) -> FulfillmentResult<T> {
        let result = self.request_value(request).await?;
        serde_json::from_value(result).map_err(|e| FulfillmentError::InvalidResponse(e.to_string()))
    }

    async fn request_cached<T: DeserializeOwned>(
        &self,
        cache_key: String,
        request: ProviderRequest,
    ) -> FulfillmentResult<T> {
        // NotConfigured short-circuits before the cache is consulted
        if self.transport.is_none() {
            return Err(FulfillmentError::NotConfigured);
        }
        if let Some(hit) = self.cache.get(&cache_key) {
            return serde_json::from_value(hit)
                .map_err(|e| FulfillmentError::InvalidResponse(e.to_string()));
        }
        let result = self.request_value(request).await?;
        self.cache.set(cache_key, result.clone());
        serde_json::from_value(result).map_err(|e| FulfillmentError::InvalidResponse(e.to_string()))
    }

    /// Send one request through the limiter and retry executor and unwrap
    /// the provider envelope down to its `result` payload
    async fn request_value(&self, request: ProviderRequest) -> FulfillmentResult<Value> {
        let transport = self
            .transport
            .as_ref()
            .ok_or(FulfillmentError::NotConfigured)?;

        let transport = Arc::clone(transport);
        let retry = self.retry.clone();
        let response = self
            .limiter
            .execute(move || async move {
                execute_with_retry(&retry, || {
                    let transport = Arc::clone(&transport);
                    let request = request.clone();
                    async move { transport.send(&request).await }
                })
                .await
            })
            .await?;

        Self::decode_envelope(response)
    }

    /// Normalize both error paths — non-2xx HTTP and 200-with-error-code
    /// payloads — into [`FulfillmentError::Api`]
    fn decode_envelope(response: RawResponse) -> FulfillmentResult<Value> {
        if response.status == 404 {
            return Err(FulfillmentError::not_found(describe_error(
                &response.body,
                "requested entity",
            )));
        }

        let envelope: ProviderEnvelope = serde_json::from_value(response.body.clone())
            .unwrap_or(ProviderEnvelope {
                code: response.status as i64,
                result: None,
                error: None,
            });

        if !response.is_success() || !(200..300).contains(&envelope.code) {
            // An envelope code outside the u16 range falls back to the
            // HTTP status rather than wrapping
            let status = if response.is_success() {
                u16::try_from(envelope.code).unwrap_or(response.status)
            } else {
                response.status
            };
            let (reason, message) = match envelope.error {
                Some(body) => (
                    body.reason.unwrap_or_else(|| "api_error".into()),
                    body.message
                        .unwrap_or_else(|| "provider reported an error".into()),
                ),
                None => (
                    "api_error".into(),
                    describe_error(&response.body, "provider reported an error"),
                ),
            };
            return Err(FulfillmentError::Api {
                status,
                reason,
                message,
            });
        }

        envelope
            .result
            .ok_or_else(|| FulfillmentError::InvalidResponse("missing result payload".into()))
    }
}

fn describe_error(body: &Value, fallback: &str) -> String {
    body.get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or(fallback)
        .to_string()
}
