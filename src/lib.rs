//! skillbus - local pub/sub and request dispatch over Unix-domain sockets
//!
//! This is the convenience crate that re-exports the skillbus sub-crates.
//! Use it when one dependency should provide the broker, the client and
//! the shared types together.
//!
//! # Architecture
//!
//! - **skillbus-core**: shared types, HTTP-over-UDS codec, configuration,
//!   error handling, observability
//! - **skillbus-broker**: the broker — handler registry, subscription
//!   store with persistence, publish pipeline with retry and eviction
//! - **skillbus-client**: the peer side — a client for the broker's
//!   surface and a callback endpoint for receiving deliveries
//!
//! # Quick Start - Broker
//!
//! ```rust,no_run
//! use skillbus::{Broker, MemoryStore};
//! use skillbus::broker::from_fn;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> skillbus_core::Result<()> {
//!     let broker = Broker::builder()
//!         .socket_path("/tmp/lss.sock")
//!         .storage(Arc::new(MemoryStore::new()))
//!         .handler("/echo", from_fn(|params| async move {
//!             Ok(params.unwrap_or(serde_json::Value::Null))
//!         }))
//!         .build()
//!         .await?;
//!
//!     broker.start().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Quick Start - Subscriber
//!
//! ```rust,no_run
//! use skillbus::{BrokerClient, CallbackServer};
//! use skillbus_core::SubscriptionRecord;
//!
//! #[tokio::main]
//! async fn main() -> skillbus_core::Result<()> {
//!     let callbacks = CallbackServer::new("/tmp/peer.sock");
//!     callbacks.route("/cb", |delivery| async move {
//!         println!("delivery: {delivery:?}");
//!         Ok(serde_json::Value::Null)
//!     });
//!     callbacks.start().await?;
//!
//!     let client = BrokerClient::new("/tmp/lss.sock");
//!     client
//!         .subscribe(&SubscriptionRecord::new("weather", "/tmp/peer.sock", "/cb"))
//!         .await?;
//!     Ok(())
//! }
//! ```

// Re-export all public APIs from sub-crates so users can reach
// everything through the `skillbus::` prefix.
pub use skillbus_broker as broker;
pub use skillbus_client as client;
pub use skillbus_core as core;

// Convenience re-exports of the most commonly used types.
pub use skillbus_broker::{Broker, MemoryStore, SledStore};
pub use skillbus_client::{BrokerClient, CallbackServer};
