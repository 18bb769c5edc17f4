//! Broker builder
//!
//! Fluent configuration for a [`Broker`]: where to listen, where to
//! persist, how to reach subscribers, what to observe. `build()` wires
//! the store, registry, executors and pipelines together and installs
//! the built-in `/subscribe` and `/unsubscribe` handlers; any failure
//! leaves nothing behind.
//!
//! # Examples
//!
//! ```rust,no_run
//! use skillbus_broker::{Broker, MemoryStore, from_fn};
//! use std::sync::Arc;
//!
//! # async fn example() -> skillbus_core::Result<()> {
//! let broker = Broker::builder()
//!     .socket_path("/tmp/lss.sock")
//!     .storage(Arc::new(MemoryStore::new()))
//!     .handler("/echo", from_fn(|params| async move {
//!         Ok(params.unwrap_or(serde_json::Value::Null))
//!     }))
//!     .build()
//!     .await?;
//! broker.start().await?;
//! # Ok(())
//! # }
//! ```

use crate::dispatch::RequestDispatcher;
use crate::executor::TaskExecutor;
use crate::handler::{from_fn, Handler};
use crate::metrics::BrokerMetrics;
use crate::publish::PublishPipeline;
use crate::registry::HandlerRegistry;
use crate::storage::{KeyValueStore, SledStore};
use crate::subscriptions::SubscriptionStore;
use crate::transport::{HttpUdsTransport, UdsTransport};
use crate::{Broker, SUBSCRIBE_PATH, UNSUBSCRIBE_PATH};
use serde_json::Value;
use skillbus_core::{Error, ObservabilityConfig, Result, ServiceConfig, SubscriptionRecord};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Builder for a [`Broker`]
pub struct BrokerBuilder {
    socket_path: Option<PathBuf>,
    storage: Option<Arc<dyn KeyValueStore>>,
    transport: Option<Arc<dyn UdsTransport>>,
    handlers: Vec<(String, Box<dyn Handler>)>,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl BrokerBuilder {
    pub fn new() -> Self {
        Self {
            socket_path: None,
            storage: None,
            transport: None,
            handlers: Vec::new(),
            observability_config: None,
            service_name: None,
        }
    }

    /// Set the Unix-domain socket the broker listens on
    pub fn socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = Some(path.into());
        self
    }

    /// Configure from a JSON document carrying the
    /// `aace.localSkillService` section
    pub fn config(mut self, root: &Value) -> Result<Self> {
        let config = ServiceConfig::from_root(root)?;
        self.socket_path = Some(config.lss_socket_path);
        Ok(self)
    }

    /// Set the persistence backend (required)
    pub fn storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Use a sled database at `path` as the persistence backend
    pub fn sled_storage(mut self, path: impl Into<PathBuf>) -> Result<Self> {
        let store = SledStore::open(path.into())?;
        self.storage = Some(Arc::new(store));
        Ok(self)
    }

    /// Override the outbound transport (defaults to [`HttpUdsTransport`])
    pub fn transport(mut self, transport: Arc<dyn UdsTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Register a request handler for a path
    pub fn handler(mut self, path: impl Into<String>, handler: Box<dyn Handler>) -> Self {
        self.handlers.push((path.into(), handler));
        self
    }

    /// Enable OpenTelemetry observability with a custom configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with defaults
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Service name used when observability is enabled
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Wire everything together
    ///
    /// Fails on missing socket path or storage, or if observability
    /// initialization fails. The broker does not listen until
    /// [`Broker::start`] is called.
    pub async fn build(self) -> Result<Broker> {
        let socket_path = self
            .socket_path
            .ok_or_else(|| Error::Config("no socket path configured".into()))?;
        let storage = self
            .storage
            .ok_or_else(|| Error::Config("no storage backend configured".into()))?;

        let metrics = if let Some(mut config) = self.observability_config {
            if let Some(name) = self.service_name {
                config.service_name = name;
            }
            skillbus_core::init_observability(config.clone())
                .map_err(|e| Error::Config(format!("failed to initialize observability: {e}")))?;
            Some(Arc::new(BrokerMetrics::new(config.service_name.clone())))
        } else {
            None
        };

        let subscriptions = Arc::new(SubscriptionStore::new(storage));
        let registry = Arc::new(HandlerRegistry::new());
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HttpUdsTransport::new()));

        let dispatcher = Arc::new(RequestDispatcher::new(
            Arc::clone(&registry),
            TaskExecutor::new("handler-executor"),
            metrics.clone(),
        ));
        let pipeline = Arc::new(PublishPipeline::new(
            Arc::clone(&subscriptions),
            transport,
            TaskExecutor::new("publish-executor"),
            metrics,
        ));

        for (path, handler) in self.handlers {
            registry.register(path, handler);
        }
        install_builtin_handlers(&registry, &subscriptions, &pipeline);

        let (shutdown, _) = watch::channel(false);
        Ok(Broker {
            socket_path,
            subscriptions,
            registry,
            dispatcher,
            pipeline,
            shutdown,
            accept_task: Mutex::new(None),
        })
    }
}

impl Default for BrokerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Install `/subscribe` and `/unsubscribe`
///
/// The handlers capture the store and pipeline handles directly rather
/// than the broker, so no reference cycle forms through the registry.
fn install_builtin_handlers(
    registry: &HandlerRegistry,
    subscriptions: &Arc<SubscriptionStore>,
    pipeline: &Arc<PublishPipeline>,
) {
    let store = Arc::clone(subscriptions);
    let primer = Arc::clone(pipeline);
    registry.register(
        SUBSCRIBE_PATH,
        from_fn(move |params| {
            let store = Arc::clone(&store);
            let primer = Arc::clone(&primer);
            async move {
                let record = parse_record(params)?;
                let subscriber = record.subscriber();

                // Fails (and mutates nothing) unless a service has
                // registered the topic.
                store.add(&record.id, subscriber.clone()).await?;
                tracing::info!(topic = %record.id, subscriber = %subscriber, "subscribed");

                let hooks = store.hooks_of(&record.id).unwrap_or_default();
                let reply = match &hooks.on_subscribe {
                    Some(hook) => hook.handle(None).await?,
                    None => Value::Null,
                };
                // Prime the fresh subscriber with the topic's current
                // state; this runs in addition to the subscribe reply.
                if hooks.on_request.is_some() || hooks.on_response.is_some() {
                    primer.spawn_delivery(record.id.clone(), subscriber, None, hooks);
                }
                Ok(reply)
            }
        }),
    );

    let store = Arc::clone(subscriptions);
    registry.register(
        UNSUBSCRIBE_PATH,
        from_fn(move |params| {
            let store = Arc::clone(&store);
            async move {
                let record = parse_record(params)?;
                let subscriber = record.subscriber();
                if store.remove(&record.id, &subscriber).await {
                    tracing::info!(topic = %record.id, subscriber = %subscriber, "unsubscribed");
                } else {
                    tracing::debug!(topic = %record.id, subscriber = %subscriber,
                        "unsubscribe for unknown subscriber");
                }
                Ok(Value::Null)
            }
        }),
    );
}

fn parse_record(params: Option<Value>) -> Result<SubscriptionRecord> {
    let params = params.ok_or_else(|| Error::Handler("missing request body".into()))?;
    serde_json::from_value(params)
        .map_err(|e| Error::Handler(format!("invalid subscription record: {e}")))
}
