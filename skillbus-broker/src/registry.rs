//! Request handler registry
//!
//! Maps URL paths to [`Handler`] handles. Registration overwrites —
//! re-registering a path replaces the previous handler with a visible
//! log — and handlers are never removed for the broker's lifetime.
//!
//! The mutex is held only long enough to copy a handle in or out;
//! handlers always run outside it.

use crate::handler::Handler;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Path-keyed registry of request handlers
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Mutex<HashMap<String, Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a path, replacing any previous one
    pub fn register(&self, path: impl Into<String>, handler: Box<dyn Handler>) {
        let path = path.into();
        let mut handlers = self.handlers.lock().expect("handler registry lock poisoned");
        if handlers.insert(path.clone(), Arc::from(handler)).is_some() {
            tracing::warn!(path = %path, "replacing existing request handler");
        } else {
            tracing::debug!(path = %path, "registered request handler");
        }
    }

    /// Copy out the handler handle for a path
    pub fn get(&self, path: &str) -> Option<Arc<dyn Handler>> {
        let handlers = self.handlers.lock().expect("handler registry lock poisoned");
        handlers.get(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        let handlers = self.handlers.lock().expect("handler registry lock poisoned");
        handlers.contains_key(path)
    }

    /// All registered paths
    pub fn paths(&self) -> Vec<String> {
        let handlers = self.handlers.lock().expect("handler registry lock poisoned");
        handlers.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::from_fn;

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = HandlerRegistry::new();
        registry.register("/echo", from_fn(|p| async move { Ok(p.unwrap()) }));

        assert!(registry.contains("/echo"));
        assert!(!registry.contains("/other"));

        let handler = registry.get("/echo").unwrap();
        let result = handler
            .handle(Some(serde_json::json!({"x": 1})))
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_reregistration_overwrites() {
        let registry = HandlerRegistry::new();
        registry.register("/v", from_fn(|_| async { Ok(serde_json::json!(1)) }));
        registry.register("/v", from_fn(|_| async { Ok(serde_json::json!(2)) }));

        let handler = registry.get("/v").unwrap();
        assert_eq!(handler.handle(None).await.unwrap(), serde_json::json!(2));
        assert_eq!(registry.paths(), vec!["/v".to_string()]);
    }

    #[test]
    fn test_get_unknown_path_is_none() {
        let registry = HandlerRegistry::new();
        assert!(registry.get("/nope").is_none());
    }
}
