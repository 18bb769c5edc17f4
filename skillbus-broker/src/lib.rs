//! Local pub/sub and request-dispatch broker over Unix-domain sockets
//!
//! This crate implements a single-host message broker for cooperating
//! local processes. It exposes an HTTP/1.1 surface on a Unix-domain
//! socket, dispatches inbound requests to registered handlers, and fans
//! published JSON messages out to subscribers reachable on their own
//! Unix-domain sockets.
//!
//! # Core Pieces
//!
//! - **Handler registry**: path-keyed request routing with
//!   overwrite-on-reregistration
//! - **Subscription store**: topic id → subscriber set + hooks, with the
//!   subscription list persisted to a key-value store and restored on
//!   start
//! - **Publish pipeline**: per-subscriber delivery tasks with unbounded
//!   retry on timeout and immediate eviction on terminal failures
//! - **Built-ins**: `/subscribe` and `/unsubscribe` for peers that join
//!   and leave topics over the wire
//!
//! # Concurrency Model
//!
//! Two sequential FIFO executors do the work: the handler executor runs
//! inbound request handlers, the publish executor runs deliveries. The
//! accept loop and per-connection reads run on their own tokio tasks.
//! Subscription and handler state sit behind narrow mutexes; hooks and
//! network I/O always run outside the locks. Deliveries to one
//! subscriber are not ordered across publishes — a retried delivery
//! re-enters the queue behind newer work.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use skillbus_broker::{Broker, MemoryStore, from_fn};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> skillbus_core::Result<()> {
//!     let broker = Broker::builder()
//!         .socket_path("/tmp/lss.sock")
//!         .storage(Arc::new(MemoryStore::new()))
//!         .build()
//!         .await?;
//!
//!     // A service registers a topic and its hooks...
//!     broker.register_publish_handler(
//!         "weather",
//!         None,
//!         Some(from_fn(|_| async { Ok(serde_json::json!({"temp": 21})) })),
//!         None,
//!     );
//!
//!     broker.start().await?;
//!
//!     // ...and pushes events to whoever subscribed.
//!     broker.publish_message("weather", serde_json::json!({"temp": 22}))?;
//!     Ok(())
//! }
//! ```

mod builder;
mod dispatch;
mod executor;
mod handler;
mod metrics;
mod publish;
mod registry;
mod server;
mod storage;
mod subscriber;
mod subscriptions;
mod transport;

pub use builder::BrokerBuilder;
pub use dispatch::{InboundRequest, RequestDispatcher};
pub use executor::TaskExecutor;
pub use handler::{from_fn, from_typed_fn, Handler, HandlerResult, PublishHooks};
pub use metrics::BrokerMetrics;
pub use publish::PublishPipeline;
pub use registry::HandlerRegistry;
pub use storage::{KeyValueStore, MemoryStore, SledStore};
pub use subscriber::SubscriberSet;
pub use subscriptions::{SubscriptionStore, STORAGE_KEY, STORAGE_TABLE};
pub use transport::{
    HttpUdsTransport, TransportError, UdsTransport, CONNECT_TIMEOUT, REQUEST_TIMEOUT,
};

use serde_json::Value;
use skillbus_core::{Error, Result, Subscriber};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Path peers POST subscription records to
pub const SUBSCRIBE_PATH: &str = "/subscribe";

/// Path peers POST unsubscription records to
pub const UNSUBSCRIBE_PATH: &str = "/unsubscribe";

/// The broker facade: lifecycle plus the programmatic contract
///
/// Build one with [`Broker::builder`], register handlers and publish
/// handlers, then [`start`](Broker::start) it. In-process collaborators
/// use [`register_handler`](Broker::register_handler),
/// [`register_publish_handler`](Broker::register_publish_handler) and
/// [`publish_message`](Broker::publish_message); remote peers use the
/// HTTP surface.
pub struct Broker {
    socket_path: PathBuf,
    subscriptions: Arc<SubscriptionStore>,
    registry: Arc<HandlerRegistry>,
    dispatcher: Arc<RequestDispatcher>,
    pipeline: Arc<PublishPipeline>,
    shutdown: watch::Sender<bool>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl Broker {
    pub fn builder() -> BrokerBuilder {
        BrokerBuilder::new()
    }

    /// Restore persisted subscriptions, then start listening
    pub async fn start(&self) -> Result<()> {
        {
            let accept_task = self.accept_task.lock().expect("broker lock poisoned");
            if accept_task.is_some() {
                return Err(Error::Internal("broker already started".into()));
            }
        }

        self.subscriptions.load().await;

        let listener = server::bind(&self.socket_path)?;
        // Reset the flag so a stop/start cycle does not observe the old
        // shutdown signal.
        self.shutdown.send_replace(false);
        let handle = server::spawn_accept_loop(
            listener,
            Arc::clone(&self.dispatcher),
            self.shutdown.subscribe(),
        );

        let mut accept_task = self.accept_task.lock().expect("broker lock poisoned");
        *accept_task = Some(handle);
        tracing::info!(socket = %self.socket_path.display(), "broker listening");
        Ok(())
    }

    /// Stop accepting connections
    ///
    /// Queued publish deliveries keep draining; only the inbound surface
    /// goes away. The socket file is removed.
    pub async fn stop(&self) {
        let handle = {
            let mut accept_task = self.accept_task.lock().expect("broker lock poisoned");
            accept_task.take()
        };
        if let Some(handle) = handle {
            let _ = self.shutdown.send(true);
            let _ = handle.await;
            let _ = std::fs::remove_file(&self.socket_path);
            tracing::info!(socket = %self.socket_path.display(), "broker stopped");
        }
    }

    /// Register a request handler for a path, replacing any previous one
    pub fn register_handler(&self, path: impl Into<String>, handler: Box<dyn Handler>) {
        self.registry.register(path, handler);
    }

    /// Register a topic and any of its three hooks
    ///
    /// Creates the topic if needed; supplied hooks overwrite previous
    /// ones, omitted hooks stay as they were.
    pub fn register_publish_handler(
        &self,
        id: &str,
        on_subscribe: Option<Box<dyn Handler>>,
        on_request: Option<Box<dyn Handler>>,
        on_response: Option<Box<dyn Handler>>,
    ) {
        self.subscriptions.register_hooks(
            id,
            PublishHooks {
                on_subscribe: on_subscribe.map(Arc::from),
                on_request: on_request.map(Arc::from),
                on_response: on_response.map(Arc::from),
            },
        );
    }

    /// Fan a message out to the topic's current subscribers
    ///
    /// Fails only when the topic was never registered; delivery outcomes
    /// are the pipeline's business, not the publisher's.
    pub fn publish_message(&self, id: &str, message: Value) -> Result<()> {
        self.pipeline.publish(id, Some(message))
    }

    /// Current subscribers of a topic
    pub fn subscribers_of(&self, id: &str) -> Vec<Subscriber> {
        self.subscriptions.subscribers_of(id)
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}
