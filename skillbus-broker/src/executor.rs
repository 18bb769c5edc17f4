//! Sequential FIFO task executors
//!
//! The broker runs two of these: one drains inbound request handling,
//! the other drains outbound deliveries. Each is an unbounded queue with
//! a single drain task, so submitted work runs strictly in submission
//! order and one at a time — a retried delivery re-enters the queue
//! behind whatever else is already waiting.
//!
//! A panic inside a submitted task is caught and logged so the drain
//! task survives; the pool must outlive any single misbehaving handler.
//! Dropping every handle lets the drain task finish the queued work and
//! exit.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use tokio::sync::mpsc;

type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Handle to a sequential FIFO executor
///
/// Cheap to clone; submitting from inside a running task is allowed and
/// is how delivery retries loop back into the queue.
#[derive(Clone)]
pub struct TaskExecutor {
    name: &'static str,
    queue: mpsc::UnboundedSender<Task>,
}

impl TaskExecutor {
    /// Create an executor and spawn its drain task
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(name: &'static str) -> Self {
        let (queue, mut tasks) = mpsc::unbounded_channel::<Task>();
        tokio::spawn(async move {
            while let Some(task) = tasks.recv().await {
                if let Err(panic) = AssertUnwindSafe(task).catch_unwind().await {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic payload".to_string());
                    tracing::error!(executor = name, panic = %message, "task panicked");
                }
            }
            tracing::debug!(executor = name, "executor drained and stopped");
        });
        Self { name, queue }
    }

    /// Enqueue a task; false if the executor has already stopped
    pub fn submit<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let accepted = self.queue.send(Box::pin(task)).is_ok();
        if !accepted {
            tracing::warn!(executor = self.name, "task submitted to stopped executor");
        }
        accepted
    }
}
