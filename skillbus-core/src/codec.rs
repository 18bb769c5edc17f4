//! Bridging between the broker's message model and hyper
//!
//! The wire protocol is plain HTTP/1.1 over Unix-domain sockets, spoken
//! by hyper on both sides. This module is the seam: it converts between
//! hyper's request/response types and the broker's own [`HttpRequest`]
//! and [`HttpResponse`], which the dispatcher and publish pipeline work
//! in terms of.
//!
//! The conversions enforce the broker's surface rules rather than
//! leaving them to callers:
//!
//! - Only GET and POST convert; any other method is an [`Error::Http`].
//! - Bodies are capped at [`MAX_BODY_BYTES`]; an oversized body is an
//!   error, not a truncation.
//! - Outbound requests target `http://localhost<path>` — on a
//!   Unix-domain socket the authority is carried by the `Host` header
//!   alone.
//! - `Content-Type: application/json` is set exactly when a body is
//!   present.
//!
//! The body-reading functions are generic over the hyper body type so
//! they work on `hyper::body::Incoming` in the servers and on
//! `Full<Bytes>` in tests.

use crate::error::{Error, Result};
use crate::types::{HttpRequest, HttpResponse, Method};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::header::{HeaderValue, CONTENT_TYPE, HOST};
use hyper::StatusCode;

/// Upper bound on a request or response body
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build an outbound hyper request
///
/// Fails only when `path` does not parse as a URI.
pub fn to_hyper_request(
    method: Method,
    path: &str,
    body: Option<&[u8]>,
) -> Result<hyper::Request<Full<Bytes>>> {
    let payload = body.unwrap_or_default();

    let mut request = hyper::Request::new(Full::new(Bytes::copy_from_slice(payload)));
    *request.method_mut() = match method {
        Method::Get => hyper::Method::GET,
        Method::Post => hyper::Method::POST,
    };
    *request.uri_mut() = path
        .parse()
        .map_err(|e| Error::Http(format!("invalid request path {path:?}: {e}")))?;

    let headers = request.headers_mut();
    headers.insert(HOST, HeaderValue::from_static("localhost"));
    if !payload.is_empty() {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    Ok(request)
}

/// Decode an inbound hyper request, collecting its body
pub async fn from_hyper_request<B>(request: hyper::Request<B>) -> Result<HttpRequest>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = Method::parse(request.method().as_str())
        .ok_or_else(|| Error::Http(format!("unsupported method: {}", request.method())))?;
    let path = request.uri().path().to_string();
    let body = collect_body(request.into_body()).await?;

    Ok(HttpRequest { method, path, body })
}

/// Build a hyper response from the broker's response model
pub fn to_hyper_response(response: &HttpResponse) -> hyper::Response<Full<Bytes>> {
    let mut out = hyper::Response::new(Full::new(Bytes::copy_from_slice(&response.body)));
    *out.status_mut() =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if !response.body.is_empty() {
        out.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    out
}

/// Decode a hyper response, collecting its body
pub async fn from_hyper_response<B>(response: hyper::Response<B>) -> Result<HttpResponse>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let status = response.status().as_u16();
    let body = collect_body(response.into_body()).await?;

    Ok(HttpResponse { status, body })
}

/// Read a whole body, bounded by [`MAX_BODY_BYTES`]
async fn collect_body<B>(body: B) -> Result<Vec<u8>>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let collected = Limited::new(body, MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| Error::Http(format!("failed to read body: {e}")))?;
    Ok(collected.to_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_round_trip() {
        let request = to_hyper_request(Method::Post, "/subscribe", Some(br#"{"id":"t"}"#)).unwrap();
        assert_eq!(request.headers().get(HOST).unwrap(), "localhost");
        assert_eq!(
            request.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let decoded = from_hyper_request(request).await.unwrap();
        assert_eq!(decoded.method, Method::Post);
        assert_eq!(decoded.path, "/subscribe");
        assert_eq!(decoded.body, br#"{"id":"t"}"#);
    }

    #[tokio::test]
    async fn test_request_without_body() {
        let request = to_hyper_request(Method::Get, "/status", None).unwrap();
        assert!(request.headers().get(CONTENT_TYPE).is_none());

        let decoded = from_hyper_request(request).await.unwrap();
        assert_eq!(decoded.method, Method::Get);
        assert!(decoded.body.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_method_rejected() {
        let request = hyper::Request::builder()
            .method(hyper::Method::DELETE)
            .uri("/x")
            .body(Full::new(Bytes::new()))
            .unwrap();
        assert!(from_hyper_request(request).await.is_err());
    }

    #[test]
    fn test_invalid_path_rejected() {
        assert!(to_hyper_request(Method::Post, "not a uri", None).is_err());
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let oversized = vec![b'x'; MAX_BODY_BYTES + 1];
        let request = hyper::Request::builder()
            .method(hyper::Method::POST)
            .uri("/x")
            .body(Full::new(Bytes::from(oversized)))
            .unwrap();
        assert!(from_hyper_request(request).await.is_err());
    }

    #[tokio::test]
    async fn test_response_round_trip() {
        let response = HttpResponse::ok_json(&serde_json::json!({"n": 42}));
        let encoded = to_hyper_response(&response);
        assert_eq!(encoded.status(), StatusCode::OK);
        assert_eq!(
            encoded.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let decoded = from_hyper_response(encoded).await.unwrap();
        assert_eq!(decoded, response);
    }

    #[tokio::test]
    async fn test_no_content_response_round_trip() {
        let encoded = to_hyper_response(&HttpResponse::no_content());
        assert_eq!(encoded.status(), StatusCode::NO_CONTENT);
        assert!(encoded.headers().get(CONTENT_TYPE).is_none());

        let decoded = from_hyper_response(encoded).await.unwrap();
        assert_eq!(decoded.status, 204);
        assert!(decoded.body.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_status_falls_back_to_500() {
        let bogus = HttpResponse {
            status: 0,
            body: Vec::new(),
        };
        let encoded = to_hyper_response(&bogus);
        assert_eq!(encoded.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
