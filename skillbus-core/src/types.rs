//! Core value and wire types for the broker
//!
//! Two families of types live here:
//!
//! 1. **Subscription types** — [`Subscriber`] (the callback address a peer
//!    registers) and [`SubscriptionRecord`] (the `{id, endpoint, path}`
//!    object used both as the /subscribe and /unsubscribe request body and
//!    as the element of the persisted subscription array).
//! 2. **HTTP types** — [`Method`], [`HttpRequest`] and [`HttpResponse`],
//!    the minimal request/response model the codec reads and writes over
//!    Unix-domain sockets.
//!
//! # Examples
//!
//! ```rust
//! use skillbus_core::{Subscriber, SubscriptionRecord};
//!
//! let record: SubscriptionRecord = serde_json::from_str(
//!     r#"{"id":"weather","endpoint":"/tmp/peer.sock","path":"/cb"}"#,
//! ).unwrap();
//! assert_eq!(record.subscriber(), Subscriber::new("/tmp/peer.sock", "/cb"));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A subscriber callback address: a Unix-domain socket and a URL path
///
/// Two subscribers are equal iff both components are equal; the
/// subscriber sets in the broker deduplicate on exactly this equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    /// Filesystem path of the peer's Unix-domain socket
    pub endpoint: String,
    /// URL path to POST deliveries to on that socket
    pub path: String,
}

impl Subscriber {
    pub fn new(endpoint: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.endpoint, self.path)
    }
}

/// One subscription entry: topic id plus the subscriber address
///
/// This is the wire shape of the /subscribe and /unsubscribe bodies and
/// the element type of the persisted subscription array. Unknown fields
/// are ignored on deserialization; missing required fields fail it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub id: String,
    pub endpoint: String,
    pub path: String,
}

impl SubscriptionRecord {
    pub fn new(
        id: impl Into<String>,
        endpoint: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            path: path.into(),
        }
    }

    /// The subscriber address this record names
    pub fn subscriber(&self) -> Subscriber {
        Subscriber::new(self.endpoint.clone(), self.path.clone())
    }
}

/// HTTP request method
///
/// The broker surface accepts GET and POST only; anything else is
/// rejected by the codec before it reaches the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded inbound HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub body: Vec<u8>,
}

/// An HTTP response: status code and raw body bytes
///
/// The dispatcher emits exactly five statuses (200, 204, 400, 404, 500);
/// the constructors below cover them. Bodies are always JSON when
/// non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// 200 with a serialized JSON body
    pub fn ok_json(value: &Value) -> Self {
        Self {
            status: 200,
            body: value.to_string().into_bytes(),
        }
    }

    /// 204 with an empty body
    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: Vec::new(),
        }
    }

    pub fn bad_request() -> Self {
        Self {
            status: 400,
            body: Vec::new(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: 404,
            body: Vec::new(),
        }
    }

    pub fn internal_error() -> Self {
        Self {
            status: 500,
            body: Vec::new(),
        }
    }

    /// True for any 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON, if there is one
    pub fn json(&self) -> crate::Result<Option<Value>> {
        if self.body.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(&self.body)
            .map(Some)
            .map_err(|e| crate::Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_equality() {
        let a = Subscriber::new("/tmp/a.sock", "/cb");
        let b = Subscriber::new("/tmp/a.sock", "/cb");
        let c = Subscriber::new("/tmp/a.sock", "/other");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_record_ignores_unknown_fields() {
        let record: SubscriptionRecord = serde_json::from_str(
            r#"{"id":"t","endpoint":"/tmp/a.sock","path":"/cb","extra":true}"#,
        )
        .unwrap();
        assert_eq!(record.id, "t");
    }

    #[test]
    fn test_record_requires_all_fields() {
        let result: Result<SubscriptionRecord, _> =
            serde_json::from_str(r#"{"id":"t","endpoint":"/tmp/a.sock"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_method_parse() {
        assert_eq!(Method::parse("GET"), Some(Method::Get));
        assert_eq!(Method::parse("POST"), Some(Method::Post));
        assert_eq!(Method::parse("DELETE"), None);
        assert_eq!(Method::parse("get"), None);
    }

    #[test]
    fn test_response_success_range() {
        assert!(HttpResponse::ok_json(&serde_json::json!({})).is_success());
        assert!(HttpResponse::no_content().is_success());
        assert!(!HttpResponse::not_found().is_success());
        assert!(!HttpResponse::internal_error().is_success());
    }

    #[test]
    fn test_response_json() {
        let resp = HttpResponse::ok_json(&serde_json::json!({"n": 42}));
        assert_eq!(resp.json().unwrap(), Some(serde_json::json!({"n": 42})));
        assert_eq!(HttpResponse::no_content().json().unwrap(), None);

        let garbage = HttpResponse {
            status: 200,
            body: b"not json".to_vec(),
        };
        assert!(garbage.json().is_err());
    }
}
