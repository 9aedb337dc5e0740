//! Fulfillment synchronization core
//!
//! Mirrors storefront orders into a print-on-demand fulfillment provider
//! and keeps the local order record in sync through polling and webhooks,
//! under real-world constraints: rate limits, transient failures,
//! asynchronous provider-side jobs and out-of-order webhook delivery.
//!
//! Layering, leaf-first:
//! - [`limiter::RateLimiter`] throttles outbound calls to a fixed quota per window
//! - [`retry`] wraps one HTTP call in bounded exponential backoff
//! - [`cache::ResponseCache`] memoizes idempotent catalog lookups
//! - [`client::FulfillmentClient`] is the typed façade over the provider API
//! - [`poller::TaskPoller`] drives mockup generation jobs to completion
//! - [`reconcile::ReconciliationEngine`] folds provider state into the local
//!   order under monotonicity and idempotence guarantees
//! - [`webhook::WebhookDispatcher`] resolves push events to the same rules
//!
//! The UI/action layer talks to all of this through
//! [`service::FulfillmentService`].

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod limiter;
pub mod order;
pub mod poller;
pub mod reconcile;
pub mod retry;
pub mod service;
pub mod store;
pub mod testutil;
pub mod transport;
pub mod webhook;

pub use client::FulfillmentClient;
pub use config::FulfillmentConfig;
pub use error::{FulfillmentError, FulfillmentResult};
pub use order::{LocalOrder, LocalOrderStatus, OrderUpdate};
pub use service::FulfillmentService;
