//! Handler traits for inbound requests and publish hooks
//!
//! A [`Handler`] is the broker's unit of behavior: an async callable that
//! takes an optional JSON value and produces a JSON value or an error.
//! Request handlers, subscribe hooks, request hooks and response hooks
//! are all this one shape — what differs is what the broker passes in and
//! what it does with the result.
//!
//! # Result Mapping
//!
//! For request handlers and subscribe hooks, the dispatcher turns the
//! returned value into an HTTP status:
//!
//! - `Ok(Value::Object(..))` → 200 with the serialized object
//! - `Ok(_)` (null or any non-object) → 204 with an empty body
//! - `Err(_)` → 500
//!
//! For publish hooks, the request hook's `Ok` value becomes the outbound
//! payload (its `Err` aborts that delivery), and the response hook's
//! result is only inspected for logging.
//!
//! # Examples
//!
//! ```rust
//! use skillbus_broker::{from_fn, from_typed_fn};
//! use serde::Deserialize;
//!
//! // Raw JSON handler: echo the request back
//! let echo = from_fn(|params| async move {
//!     Ok(params.unwrap_or(serde_json::Value::Null))
//! });
//!
//! // Typed handler with automatic deserialization
//! #[derive(Deserialize)]
//! struct Temperature { celsius: f64 }
//!
//! let report = from_typed_fn(|t: Temperature| async move {
//!     Ok(serde_json::json!({"fahrenheit": t.celsius * 9.0 / 5.0 + 32.0}))
//! });
//! ```

use serde_json::Value;
use skillbus_core::{Error, Result};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Pinned boxed future every handler resolves to
///
/// Handlers have distinct concrete future types; boxing gives the
/// registry one storable type, and `Send` lets the executors move the
/// future across threads.
pub type HandlerResult = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// An async callable taking optional JSON and producing JSON
///
/// Implementations must be `Send + Sync`: a handler handle is cloned out
/// of the registry and invoked concurrently from worker tasks. Handlers
/// should be stateless or use interior mutability.
pub trait Handler: Send + Sync {
    /// Invoke the handler
    ///
    /// `params` is the parsed request body for inbound requests, `None`
    /// for bodyless requests and for subscribe/request hooks, and the
    /// subscriber's parsed reply for response hooks.
    fn handle(&self, params: Option<Value>) -> HandlerResult;
}

/// Adapter implementing [`Handler`] for an async function
pub struct AsyncHandler<F, Fut>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    func: F,
}

impl<F, Fut> Handler for AsyncHandler<F, Fut>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn handle(&self, params: Option<Value>) -> HandlerResult {
        Box::pin((self.func)(params))
    }
}

/// Create a handler from an async function over raw JSON values
pub fn from_fn<F, Fut>(func: F) -> Box<dyn Handler>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Box::new(AsyncHandler { func })
}

/// Create a handler with automatic parameter deserialization
///
/// The request body is deserialized into `P` before the function runs;
/// a body that does not match is a handler error (and so a 500 at the
/// dispatcher). The function's return value is serialized back to JSON.
pub fn from_typed_fn<P, R, F, Fut>(func: F) -> Box<dyn Handler>
where
    P: serde::de::DeserializeOwned + Send + 'static,
    R: serde::Serialize + Send + 'static,
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    // Closures are not Clone; Arc lets each invocation share the function.
    let func = Arc::new(func);

    from_fn(move |params: Option<Value>| {
        let func = Arc::clone(&func);
        async move {
            let params: P = serde_json::from_value(params.unwrap_or(Value::Null))
                .map_err(|e| Error::Handler(format!("invalid request body: {e}")))?;
            let result = func(params).await?;
            serde_json::to_value(result).map_err(|e| Error::Serialization(e.to_string()))
        }
    })
}

/// Hook handles attached to one topic
///
/// All three are optional; re-registration overwrites whichever hooks
/// the caller supplies and leaves the rest in place.
#[derive(Clone, Default)]
pub struct PublishHooks {
    /// Produces the /subscribe reply body for a new subscriber
    pub on_subscribe: Option<Arc<dyn Handler>>,
    /// Synthesizes the outbound payload when a publish carries none
    pub on_request: Option<Arc<dyn Handler>>,
    /// Consumes a subscriber's non-empty reply body
    pub on_response: Option<Arc<dyn Handler>>,
}

impl PublishHooks {
    pub fn is_empty(&self) -> bool {
        self.on_subscribe.is_none() && self.on_request.is_none() && self.on_response.is_none()
    }

    /// Overlay `other` onto `self`; true iff an existing hook was replaced
    pub fn merge(&mut self, other: PublishHooks) -> bool {
        let mut replaced = false;
        if let Some(hook) = other.on_subscribe {
            replaced |= self.on_subscribe.replace(hook).is_some();
        }
        if let Some(hook) = other.on_request {
            replaced |= self.on_request.replace(hook).is_some();
        }
        if let Some(hook) = other.on_response {
            replaced |= self.on_response.replace(hook).is_some();
        }
        replaced
    }
}
