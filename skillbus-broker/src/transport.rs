//! Outbound transport: POST to a subscriber's Unix-domain socket
//!
//! The publish pipeline talks to subscribers through the [`UdsTransport`]
//! trait so delivery policy (retry, eviction) can be tested without real
//! sockets. [`TransportError`] is the classification that policy keys on:
//!
//! - `Connect` — the socket could not be reached at all; terminal, the
//!   subscriber is evicted.
//! - `Timeout` — connect or round-trip exceeded its deadline; transient,
//!   the delivery is retried.
//! - `Io` — anything else below HTTP; logged, neither retried nor
//!   evicting.
//!
//! [`HttpUdsTransport`] is the default implementation: one fresh
//! `UnixStream` per delivery driven by a hyper HTTP/1.1 client
//! connection, a 1 s connect deadline inside a 20 s total deadline.

use async_trait::async_trait;
use hyper_util::rt::TokioIo;
use serde_json::Value;
use skillbus_core::{codec, HttpResponse, Method};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UnixStream;
use tokio::time::timeout;

/// Deadline for establishing the connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Deadline for the whole delivery, connect included
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Delivery failure classification
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The peer socket could not be reached (missing, refused)
    #[error("connect failed: {0}")]
    Connect(String),

    /// The connect or total deadline elapsed
    #[error("request timed out")]
    Timeout,

    /// Send/receive failure after a successful connect
    #[error("transport error: {0}")]
    Io(String),
}

/// Outbound unix-socket POST transport
#[async_trait]
pub trait UdsTransport: Send + Sync {
    /// POST `body` to `http://localhost<path>` on the socket at `endpoint`
    async fn post(
        &self,
        endpoint: &Path,
        path: &str,
        body: Option<&Value>,
    ) -> Result<HttpResponse, TransportError>;
}

/// Default transport over tokio `UnixStream` and hyper
///
/// Each call owns its connection exclusively and drops it on every exit
/// path; nothing is pooled or reused.
#[derive(Debug, Default)]
pub struct HttpUdsTransport;

impl HttpUdsTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl UdsTransport for HttpUdsTransport {
    async fn post(
        &self,
        endpoint: &Path,
        path: &str,
        body: Option<&Value>,
    ) -> Result<HttpResponse, TransportError> {
        let exchange = async {
            let stream = match timeout(CONNECT_TIMEOUT, UnixStream::connect(endpoint)).await {
                Err(_) => return Err(TransportError::Timeout),
                Ok(Err(e)) => return Err(TransportError::Connect(e.to_string())),
                Ok(Ok(stream)) => stream,
            };

            let payload = body.map(|v| v.to_string().into_bytes());
            let request = codec::to_hyper_request(Method::Post, path, payload.as_deref())
                .map_err(|e| TransportError::Io(e.to_string()))?;

            let (mut sender, connection) =
                hyper::client::conn::http1::handshake(TokioIo::new(stream))
                    .await
                    .map_err(|e| TransportError::Io(e.to_string()))?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::trace!(error = %e, "delivery connection ended with error");
                }
            });

            let response = sender
                .send_request(request)
                .await
                .map_err(|e| TransportError::Io(e.to_string()))?;
            codec::from_hyper_response(response)
                .await
                .map_err(|e| TransportError::Io(e.to_string()))
        };

        match timeout(REQUEST_TIMEOUT, exchange).await {
            Err(_) => Err(TransportError::Timeout),
            Ok(result) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;
    use hyper::service::service_fn;
    use skillbus_core::HttpRequest;
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};
    use tokio::net::UnixListener;

    /// Serve one connection, recording the request it carries
    fn spawn_peer(
        listener: UnixListener,
        reply: HttpResponse,
    ) -> Arc<Mutex<Option<HttpRequest>>> {
        let seen: Arc<Mutex<Option<HttpRequest>>> = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let service = service_fn(move |request| {
                let sink = Arc::clone(&sink);
                let reply = reply.clone();
                async move {
                    let request = codec::from_hyper_request(request).await.unwrap();
                    *sink.lock().unwrap() = Some(request);
                    Ok::<_, Infallible>(codec::to_hyper_response(&reply))
                }
            });
            let _ = hyper::server::conn::http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await;
        });
        seen
    }

    #[tokio::test]
    async fn test_missing_socket_is_connect_error() {
        let transport = HttpUdsTransport::new();
        let result = transport
            .post(Path::new("/tmp/definitely-not-a-socket.sock"), "/cb", None)
            .await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }

    #[tokio::test]
    async fn test_post_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("peer.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let seen = spawn_peer(
            listener,
            HttpResponse::ok_json(&serde_json::json!({"seen": true})),
        );

        let transport = HttpUdsTransport::new();
        let response = transport
            .post(&socket, "/cb", Some(&serde_json::json!({"n": 42})))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(
            response.json().unwrap(),
            Some(serde_json::json!({"seen": true}))
        );

        let request = seen.lock().unwrap().take().unwrap();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.path, "/cb");
        assert_eq!(
            serde_json::from_slice::<Value>(&request.body).unwrap(),
            serde_json::json!({"n": 42})
        );
    }

    #[tokio::test]
    async fn test_peer_hangup_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("peer.sock");
        let listener = UnixListener::bind(&socket).unwrap();

        tokio::spawn(async move {
            // Accept, then hang up without speaking HTTP.
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let transport = HttpUdsTransport::new();
        let result = transport
            .post(&socket, "/cb", Some(&serde_json::json!({})))
            .await;
        assert!(matches!(result, Err(TransportError::Io(_))));
    }
}
