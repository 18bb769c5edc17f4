//! Core types, codec and configuration for skillbus
//!
//! This crate is the foundation the broker and client build on:
//!
//! - **Types**: subscriber/subscription value objects and the minimal
//!   HTTP request/response model
//! - **Codec**: conversions between that model and hyper, which speaks
//!   HTTP/1.1 on the Unix-domain-socket surface
//! - **Config**: the `aace.localSkillService` configuration section
//! - **Error handling**: the shared error enum and `Result` alias
//! - **Observability**: OpenTelemetry initialization for traces, metrics
//!   and structured logs
//!
//! The crate is transport-constructing but policy-free: it knows how to
//! frame and parse messages, not what the broker does with them. The
//! `skillbus-broker` and `skillbus-client` crates supply the behavior.

pub mod codec;
pub mod config;
pub mod error;
pub mod observability;
pub mod types;

// Re-export the most commonly used items so callers can write
// `skillbus_core::Error` instead of `skillbus_core::error::Error`.
pub use config::{ServiceConfig, CONFIG_ROOT_KEY};
pub use error::{Error, Result};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{HttpRequest, HttpResponse, Method, Subscriber, SubscriptionRecord};
