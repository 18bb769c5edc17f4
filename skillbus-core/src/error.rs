//! Error types for skillbus
//!
//! A single application-level error enum is shared by every crate in the
//! workspace. The broker never lets an error cross its public API as a
//! panic: public methods return `Result`, and faults inside worker tasks
//! are logged and swallowed at the task boundary so the executors keep
//! draining.
//!
//! # Error Categories
//!
//! - **Configuration errors**: missing or malformed configuration; fatal
//!   to broker construction.
//! - **Wire errors**: `Http` (malformed framing) and `Serialization`
//!   (JSON that does not parse or does not match the expected shape).
//! - **Routing errors**: `SubscriptionNotFound` for operations on topic
//!   ids nobody registered.
//! - **Operational errors**: `Io`, `Storage`, `Handler`, `Internal`.
//!
//! # Examples
//!
//! ```rust
//! use skillbus_core::Error;
//!
//! let err = Error::SubscriptionNotFound("weather".into());
//! assert_eq!(err.to_string(), "Subscription not found: weather");
//! ```

use thiserror::Error;

/// Result type used throughout the skillbus crates
pub type Result<T> = std::result::Result<T, Error>;

/// Application-level error type for broker operations
///
/// Variants carry a rendered message rather than a source error so the
/// type stays `Clone` — handler futures and delivery tasks share errors
/// across task boundaries.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Missing or invalid configuration; fatal to broker construction
    #[error("Configuration error: {0}")]
    Config(String),

    /// Low-level I/O failure (socket bind, connect, read, write)
    #[error("IO error: {0}")]
    Io(String),

    /// Malformed HTTP framing on the wire
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON that failed to parse or did not match the expected shape
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The persistence backend failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// An operation referenced a topic id nobody registered
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// A handler or hook rejected the request
    #[error("Handler error: {0}")]
    Handler(String),

    /// Unexpected internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::Config("lssSocketPath missing".into()).to_string(),
            "Configuration error: lssSocketPath missing"
        );
        assert_eq!(
            Error::Http("truncated request line".into()).to_string(),
            "HTTP error: truncated request line"
        );
    }

    #[test]
    fn test_error_is_clone() {
        let err = Error::Storage("sled unavailable".into());
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
