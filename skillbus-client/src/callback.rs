//! Callback endpoint for subscriber processes
//!
//! A peer that subscribes to a topic needs a socket of its own for the
//! broker to POST deliveries to. [`CallbackServer`] is that endpoint: it
//! binds a Unix-domain socket, serves it with hyper, routes POSTs by
//! path to registered closures, and answers with their JSON.
//!
//! Response mapping follows the broker's handler convention: an `Ok`
//! object becomes a 200 with a body, any other `Ok` a 204, an `Err` a
//! 500, and an unrouted path a 404 — which, on the broker side, gets the
//! subscriber evicted. Tests use exactly that to exercise eviction.
//!
//! # Examples
//!
//! ```rust,no_run
//! use skillbus_client::CallbackServer;
//!
//! # async fn example() -> skillbus_core::Result<()> {
//! let server = CallbackServer::new("/tmp/peer.sock");
//! server.route("/cb", |delivery| async move {
//!     println!("got {delivery:?}");
//!     Ok(serde_json::Value::Null)
//! });
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use http_body_util::Full;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::Value;
use skillbus_core::{codec, Error, HttpResponse, Method, Result};
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;

type RouteFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;
type RouteFn = Arc<dyn Fn(Option<Value>) -> RouteFuture + Send + Sync>;
type RouteTable = Arc<Mutex<HashMap<String, RouteFn>>>;

/// A small UDS HTTP listener for receiving broker deliveries
pub struct CallbackServer {
    socket_path: PathBuf,
    routes: RouteTable,
    shutdown: watch::Sender<bool>,
    accept_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl CallbackServer {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            socket_path: socket_path.into(),
            routes: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
            accept_task: Mutex::new(None),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Route POSTs on `path` to `handler`
    pub fn route<F, Fut>(&self, path: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let mut routes = self.routes.lock().expect("callback routes lock poisoned");
        routes.insert(
            path.into(),
            Arc::new(move |params| Box::pin(handler(params)) as RouteFuture),
        );
    }

    /// Bind the socket and start serving
    pub async fn start(&self) -> Result<()> {
        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::Io(format!(
                    "cannot remove stale socket {}: {e}",
                    self.socket_path.display()
                )))
            }
        }
        let listener = UnixListener::bind(&self.socket_path)
            .map_err(|e| Error::Io(format!("cannot bind {}: {e}", self.socket_path.display())))?;

        let routes = Arc::clone(&self.routes);
        self.shutdown.send_replace(false);
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, _)) => {
                                let routes = Arc::clone(&routes);
                                tokio::spawn(async move {
                                    serve_connection(stream, routes).await;
                                });
                            }
                            Err(e) => tracing::error!(error = %e, "callback accept failed"),
                        }
                    }
                }
            }
        });

        let mut accept_task = self.accept_task.lock().expect("callback lock poisoned");
        *accept_task = Some(handle);
        tracing::debug!(socket = %self.socket_path.display(), "callback endpoint listening");
        Ok(())
    }

    pub async fn stop(&self) {
        let handle = {
            let mut accept_task = self.accept_task.lock().expect("callback lock poisoned");
            accept_task.take()
        };
        if let Some(handle) = handle {
            let _ = self.shutdown.send(true);
            let _ = handle.await;
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

async fn serve_connection(stream: UnixStream, routes: RouteTable) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |request| {
        let routes = Arc::clone(&routes);
        async move { handle_request(request, routes).await }
    });

    if let Err(e) = hyper::server::conn::http1::Builder::new()
        .serve_connection(io, service)
        .await
    {
        tracing::trace!(error = %e, "callback connection closed with error");
    }
}

async fn handle_request(
    request: hyper::Request<hyper::body::Incoming>,
    routes: RouteTable,
) -> std::result::Result<hyper::Response<Full<Bytes>>, Infallible> {
    let request = match codec::from_hyper_request(request).await {
        Ok(request) => request,
        Err(_) => return Ok(codec::to_hyper_response(&HttpResponse::bad_request())),
    };

    let handler = {
        let routes = routes.lock().expect("callback routes lock poisoned");
        routes.get(&request.path).cloned()
    };
    let response = match handler {
        None => HttpResponse::not_found(),
        Some(handler) => {
            let params = if request.method == Method::Post && !request.body.is_empty() {
                match serde_json::from_slice(&request.body) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        return Ok(codec::to_hyper_response(&HttpResponse::bad_request()))
                    }
                }
            } else {
                None
            };
            match handler(params).await {
                Ok(Value::Object(result)) => HttpResponse::ok_json(&Value::Object(result)),
                Ok(_) => HttpResponse::no_content(),
                Err(_) => HttpResponse::internal_error(),
            }
        }
    };

    Ok(codec::to_hyper_response(&response))
}
