//! Test support: a scripted in-memory transport
//!
//! Used by this crate's own tests and by embedders wiring the client into
//! their test harnesses without a live provider.

use async_trait::async_trait;
use http::Method;
use serde_json::{Value, json};
use std::sync::Mutex;

use crate::error::FulfillmentResult;
use crate::transport::{HttpTransport, ProviderRequest, RawResponse};

struct Route {
    method: Method,
    path_prefix: String,
    status: u16,
    retry_after: Option<u64>,
    body: Value,
}

enum Script {
    /// Same response for every request
    Always(RawResponse),
    /// Responses consumed in order; the last one repeats
    Sequence(Vec<RawResponse>),
    /// Matched by method + path prefix; unmatched requests get a 404
    Routes(Vec<Route>),
}

/// Scripted [`HttpTransport`] implementation
pub struct MockTransport {
    script: Mutex<Script>,
    requests: Mutex<Vec<(Method, String)>>,
}

impl MockTransport {
    pub fn always(status: u16, body: Value) -> Self {
        Self::from_script(Script::Always(RawResponse {
            status,
            retry_after: None,
            body,
        }))
    }

    pub fn sequence(responses: Vec<(u16, Value)>) -> Self {
        Self::from_script(Script::Sequence(
            responses
                .into_iter()
                .map(|(status, body)| RawResponse {
                    status,
                    retry_after: None,
                    body,
                })
                .collect(),
        ))
    }

    pub fn routes() -> Self {
        Self::from_script(Script::Routes(Vec::new()))
    }

    fn from_script(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Add a route; later routes take precedence over earlier ones
    pub fn route(self, method: Method, path_prefix: &str, status: u16, body: Value) -> Self {
        if let Script::Routes(routes) = &mut *self.script.lock().unwrap() {
            routes.push(Route {
                method,
                path_prefix: path_prefix.to_string(),
                status,
                retry_after: None,
                body,
            });
        }
        self
    }

    /// Add a route after construction (e.g. to change provider state
    /// between test steps); later routes take precedence
    pub fn push_route(&self, method: Method, path_prefix: &str, status: u16, body: Value) {
        if let Script::Routes(routes) = &mut *self.script.lock().unwrap() {
            routes.push(Route {
                method,
                path_prefix: path_prefix.to_string(),
                status,
                retry_after: None,
                body,
            });
        }
    }

    /// Number of requests seen
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request seen, as (method, path)
    pub fn requests(&self) -> Vec<(Method, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: &ProviderRequest) -> FulfillmentResult<RawResponse> {
        self.requests
            .lock()
            .unwrap()
            .push((request.method.clone(), request.path.clone()));

        let response = match &mut *self.script.lock().unwrap() {
            Script::Always(response) => response.clone(),
            Script::Sequence(responses) => {
                if responses.len() > 1 {
                    responses.remove(0)
                } else {
                    responses[0].clone()
                }
            }
            Script::Routes(routes) => routes
                .iter()
                .rev()
                .find(|r| r.method == request.method && request.path.starts_with(&r.path_prefix))
                .map(|r| RawResponse {
                    status: r.status,
                    retry_after: r.retry_after,
                    body: r.body.clone(),
                })
                .unwrap_or(RawResponse {
                    status: 404,
                    retry_after: None,
                    body: json!({"code": 404, "error": {"message": "no route"}}),
                }),
        };

        Ok(response)
    }
}
