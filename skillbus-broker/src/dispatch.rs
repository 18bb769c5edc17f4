//! Inbound request dispatch
//!
//! The server hands each decoded request to the [`RequestDispatcher`] as
//! an [`InboundRequest`]: method, path, raw body, and a one-shot respond
//! channel. Dispatch validates and routes synchronously — a malformed
//! body is answered 400 and an unknown path 404 before anything reaches
//! the handler executor — then submits the handler invocation itself as
//! an executor task.
//!
//! Inside the task the handler's result maps onto the response:
//! `Ok(object)` → 200, `Ok(non-object)` → 204, `Err` → 500. A panic in
//! the handler is caught at the executor boundary; the respond channel
//! is simply dropped and the connection closes without a response, which
//! leaves the caller's own timeout in charge.

use crate::executor::TaskExecutor;
use crate::metrics::BrokerMetrics;
use crate::registry::HandlerRegistry;
use serde_json::Value;
use skillbus_core::{HttpResponse, Method};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;

/// One inbound request with its one-shot response channel
pub struct InboundRequest {
    pub method: Method,
    pub path: String,
    pub body: Vec<u8>,
    responder: oneshot::Sender<HttpResponse>,
}

impl InboundRequest {
    /// Build a request and the receiver its response will arrive on
    pub fn new(method: Method, path: String, body: Vec<u8>) -> (Self, oneshot::Receiver<HttpResponse>) {
        let (responder, receiver) = oneshot::channel();
        (
            Self {
                method,
                path,
                body,
                responder,
            },
            receiver,
        )
    }

    /// Send the response; consumed so a request is answered at most once
    pub fn respond(self, response: HttpResponse) {
        // The connection may already be gone; nothing to do then.
        let _ = self.responder.send(response);
    }
}

/// Routes inbound requests to registered handlers on the handler executor
pub struct RequestDispatcher {
    registry: Arc<HandlerRegistry>,
    executor: TaskExecutor,
    metrics: Option<Arc<BrokerMetrics>>,
}

impl RequestDispatcher {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        executor: TaskExecutor,
        metrics: Option<Arc<BrokerMetrics>>,
    ) -> Self {
        Self {
            registry,
            executor,
            metrics,
        }
    }

    /// Validate, route and submit one request
    pub fn dispatch(&self, request: InboundRequest) {
        // A POST body must be JSON; GET and empty bodies dispatch as None.
        let params: Option<Value> = if request.method == Method::Post && !request.body.is_empty() {
            match serde_json::from_slice(&request.body) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(path = %request.path, error = %e, "rejecting non-JSON request body");
                    self.record(&request.path, 400, 0.0);
                    request.respond(HttpResponse::bad_request());
                    return;
                }
            }
        } else {
            None
        };

        let handler = match self.registry.get(&request.path) {
            Some(handler) => handler,
            None => {
                tracing::debug!(path = %request.path, "no handler registered");
                self.record(&request.path, 404, 0.0);
                request.respond(HttpResponse::not_found());
                return;
            }
        };

        let path = request.path.clone();
        let metrics = self.metrics.clone();
        self.executor.submit(async move {
            let started = Instant::now();
            let response = match handler.handle(params).await {
                Ok(Value::Object(result)) => HttpResponse::ok_json(&Value::Object(result)),
                Ok(_) => HttpResponse::no_content(),
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "handler rejected request");
                    HttpResponse::internal_error()
                }
            };
            if let Some(metrics) = &metrics {
                metrics.record_request(&path, response.status, started.elapsed().as_secs_f64());
            }
            request.respond(response);
        });
    }

    fn record(&self, path: &str, status: u16, duration_secs: f64) {
        if let Some(metrics) = &self.metrics {
            metrics.record_request(path, status, duration_secs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::from_fn;
    use skillbus_core::Error;

    fn dispatcher() -> (RequestDispatcher, Arc<HandlerRegistry>) {
        let registry = Arc::new(HandlerRegistry::new());
        let dispatcher = RequestDispatcher::new(
            Arc::clone(&registry),
            TaskExecutor::new("test-dispatch"),
            None,
        );
        (dispatcher, registry)
    }

    async fn roundtrip(dispatcher: &RequestDispatcher, method: Method, path: &str, body: &[u8]) -> HttpResponse {
        let (request, receiver) = InboundRequest::new(method, path.to_string(), body.to_vec());
        dispatcher.dispatch(request);
        receiver.await.expect("no response")
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let (dispatcher, _registry) = dispatcher();
        let response = roundtrip(&dispatcher, Method::Post, "/ping", b"").await;
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_malformed_body_is_400_without_handler_run() {
        let (dispatcher, registry) = dispatcher();
        registry.register("/echo", from_fn(|_| async { panic!("must not run") }));

        let response = roundtrip(&dispatcher, Method::Post, "/echo", b"{not json").await;
        assert_eq!(response.status, 400);
    }

    #[tokio::test]
    async fn test_object_result_is_200_with_body() {
        let (dispatcher, registry) = dispatcher();
        registry.register(
            "/echo",
            from_fn(|params| async move { Ok(params.unwrap_or(Value::Null)) }),
        );

        let response = roundtrip(&dispatcher, Method::Post, "/echo", br#"{"x":1}"#).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.json().unwrap(), Some(serde_json::json!({"x": 1})));
    }

    #[tokio::test]
    async fn test_empty_result_is_204() {
        let (dispatcher, registry) = dispatcher();
        registry.register("/ack", from_fn(|_| async { Ok(Value::Null) }));

        let response = roundtrip(&dispatcher, Method::Post, "/ack", br#"{"x":1}"#).await;
        assert_eq!(response.status, 204);
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn test_handler_error_is_500() {
        let (dispatcher, registry) = dispatcher();
        registry.register(
            "/fail",
            from_fn(|_| async { Err::<Value, _>(Error::Handler("nope".into())) }),
        );

        let response = roundtrip(&dispatcher, Method::Post, "/fail", b"").await;
        assert_eq!(response.status, 500);
    }

    #[tokio::test]
    async fn test_get_dispatches_without_params() {
        let (dispatcher, registry) = dispatcher();
        registry.register(
            "/status",
            from_fn(|params| async move {
                assert!(params.is_none());
                Ok(serde_json::json!({"up": true}))
            }),
        );

        let response = roundtrip(&dispatcher, Method::Get, "/status", b"").await;
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_handler_panic_drops_the_response_channel() {
        let (dispatcher, registry) = dispatcher();
        registry.register("/boom", from_fn(|_| async { panic!("deliberate test panic") }));

        let (request, receiver) = InboundRequest::new(Method::Post, "/boom".into(), Vec::new());
        dispatcher.dispatch(request);
        assert!(receiver.await.is_err());
    }
}
