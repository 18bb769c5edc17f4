//! Client-side pieces for the skillbus broker
//!
//! Two halves, matching the two directions a peer talks in:
//!
//! - [`BrokerClient`] calls *into* the broker: registered paths,
//!   `/subscribe`, `/unsubscribe`.
//! - [`CallbackServer`] receives calls *from* the broker: it is the
//!   Unix-domain socket a subscriber names in its subscription record.
//!
//! A typical subscriber owns one of each:
//!
//! ```rust,no_run
//! use skillbus_client::{BrokerClient, CallbackServer};
//! use skillbus_core::SubscriptionRecord;
//!
//! # async fn example() -> skillbus_core::Result<()> {
//! let callbacks = CallbackServer::new("/tmp/peer.sock");
//! callbacks.route("/cb", |delivery| async move {
//!     println!("delivery: {delivery:?}");
//!     Ok(serde_json::Value::Null)
//! });
//! callbacks.start().await?;
//!
//! let broker = BrokerClient::new("/tmp/lss.sock");
//! broker
//!     .subscribe(&SubscriptionRecord::new("weather", "/tmp/peer.sock", "/cb"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod callback;
mod client;

pub use callback::CallbackServer;
pub use client::BrokerClient;
