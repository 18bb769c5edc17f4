//! HTTP-over-UDS client for talking to the broker
//!
//! One hyper client connection per request: connect, send, read the
//! response, done. The broker surface is small enough that connection
//! reuse buys nothing on a local socket, and a fresh connection per
//! request keeps failure handling trivial.

use bytes::Bytes;
use http_body_util::Full;
use hyper_util::rt::TokioIo;
use serde_json::Value;
use skillbus_core::{codec, Error, HttpResponse, Method, Result, SubscriptionRecord};
use std::path::{Path, PathBuf};
use tokio::net::UnixStream;

/// Client for a broker listening on a Unix-domain socket
#[derive(Debug, Clone)]
pub struct BrokerClient {
    socket_path: PathBuf,
}

impl BrokerClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send one request and wait for its response
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        let payload = body.map(|v| v.to_string().into_bytes());
        self.send(codec::to_hyper_request(method, path, payload.as_deref())?)
            .await
    }

    /// POST a JSON body to a path
    pub async fn post(&self, path: &str, body: &Value) -> Result<HttpResponse> {
        self.request(Method::Post, path, Some(body)).await
    }

    /// POST raw bytes to a path, JSON or not
    pub async fn post_raw(&self, path: &str, body: &[u8]) -> Result<HttpResponse> {
        self.send(codec::to_hyper_request(Method::Post, path, Some(body))?)
            .await
    }

    /// GET a path
    pub async fn get(&self, path: &str) -> Result<HttpResponse> {
        self.request(Method::Get, path, None).await
    }

    /// Register a subscriber with the broker
    pub async fn subscribe(&self, record: &SubscriptionRecord) -> Result<HttpResponse> {
        let body = serde_json::to_value(record).map_err(|e| Error::Serialization(e.to_string()))?;
        self.post("/subscribe", &body).await
    }

    /// Remove a subscriber from the broker
    pub async fn unsubscribe(&self, record: &SubscriptionRecord) -> Result<HttpResponse> {
        let body = serde_json::to_value(record).map_err(|e| Error::Serialization(e.to_string()))?;
        self.post("/unsubscribe", &body).await
    }

    async fn send(&self, request: hyper::Request<Full<Bytes>>) -> Result<HttpResponse> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| Error::Io(format!("connect {}: {e}", self.socket_path.display())))?;

        let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| Error::Io(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::trace!(error = %e, "client connection ended with error");
            }
        });

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| Error::Io(e.to_string()))?;
        codec::from_hyper_response(response).await
    }
}
