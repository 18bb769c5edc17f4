//! HTTP server over a Unix-domain socket
//!
//! One accept loop, one hyper-served connection per accept. Each
//! request is converted to an [`InboundRequest`], handed to the
//! dispatcher, and answered with whatever comes back on the one-shot
//! channel. If the dispatcher drops the channel without responding (a
//! handler panicked), the service errors out and hyper aborts the
//! connection without a response — the peer's own timeout takes over.
//!
//! Shutdown is a watch channel: `stop` flips it and the accept loop
//! exits at the next iteration. Connections already in flight finish
//! their current request.

use crate::dispatch::{InboundRequest, RequestDispatcher};
use bytes::Bytes;
use http_body_util::Full;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use skillbus_core::{codec, Error, HttpResponse, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Bind the listener, unlinking any stale socket file first
pub(crate) fn bind(path: &Path) -> Result<UnixListener> {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed stale socket file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(Error::Io(format!(
                "cannot remove stale socket {}: {e}",
                path.display()
            )))
        }
    }
    UnixListener::bind(path)
        .map_err(|e| Error::Io(format!("cannot bind {}: {e}", path.display())))
}

/// Spawn the accept loop
pub(crate) fn spawn_accept_loop(
    listener: UnixListener,
    dispatcher: Arc<RequestDispatcher>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let dispatcher = Arc::clone(&dispatcher);
                            tokio::spawn(async move {
                                serve_connection(stream, dispatcher).await;
                            });
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "accept failed");
                        }
                    }
                }
            }
        }
        tracing::info!("stopped accepting connections");
    })
}

/// Serve one connection until the peer hangs up
async fn serve_connection(stream: UnixStream, dispatcher: Arc<RequestDispatcher>) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |request| {
        let dispatcher = Arc::clone(&dispatcher);
        async move { handle_request(request, dispatcher).await }
    });

    if let Err(e) = hyper::server::conn::http1::Builder::new()
        .serve_connection(io, service)
        .await
    {
        tracing::debug!(error = %e, "connection closed with error");
    }
}

/// Bridge one hyper request onto the dispatcher
async fn handle_request(
    request: hyper::Request<hyper::body::Incoming>,
    dispatcher: Arc<RequestDispatcher>,
) -> Result<hyper::Response<Full<Bytes>>> {
    let request = match codec::from_hyper_request(request).await {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(error = %e, "unreadable request");
            return Ok(codec::to_hyper_response(&HttpResponse::bad_request()));
        }
    };

    tracing::trace!(method = %request.method, path = %request.path, "inbound request");
    let (inbound, response_rx) = InboundRequest::new(request.method, request.path, request.body);
    dispatcher.dispatch(inbound);

    match response_rx.await {
        Ok(response) => Ok(codec::to_hyper_response(&response)),
        // Responder dropped without an answer; erroring here makes
        // hyper abort the connection without a response.
        Err(_) => Err(Error::Internal("request dropped without a response".into())),
    }
}
