//! Publish fan-out, delivery retry and eviction
//!
//! [`PublishPipeline::publish`] snapshots the topic's subscribers under
//! the subscription lock, submits one delivery task per subscriber to
//! the publish executor, and returns — the publisher never waits on, or
//! learns about, delivery outcomes.
//!
//! # Delivery Contract
//!
//! Each delivery POSTs one payload to one subscriber. The payload is, in
//! order of preference: the caller's message verbatim; the topic's
//! request hook output (a hook failure aborts that one delivery); or no
//! body at all. The transport outcome decides what happens next:
//!
//! | Outcome | Action |
//! |---|---|
//! | connect failure | evict the subscriber, persist |
//! | timeout | resubmit the same delivery to the publish executor |
//! | 2xx | feed a non-empty body to the response hook, if any |
//! | any other status | evict the subscriber, persist |
//! | other transport error | log only |
//!
//! Retry on timeout is unbounded and unpaced; a retried delivery
//! re-enters the FIFO queue, so other deliveries are not starved, but
//! duplicates are possible and per-subscriber ordering is not
//! guaranteed. Response-hook failures (parse or handler) are logged and
//! never evict. Because the retried task re-runs payload determination,
//! a request hook runs again on every attempt.

use crate::executor::TaskExecutor;
use crate::handler::PublishHooks;
use crate::metrics::BrokerMetrics;
use crate::subscriptions::SubscriptionStore;
use crate::transport::{TransportError, UdsTransport};
use serde_json::Value;
use skillbus_core::{Error, Result, Subscriber};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

/// Fans published messages out to a topic's subscribers
pub struct PublishPipeline {
    context: DeliveryContext,
}

/// Everything a delivery task needs, cloneable into retries
#[derive(Clone)]
struct DeliveryContext {
    subscriptions: Arc<SubscriptionStore>,
    transport: Arc<dyn UdsTransport>,
    executor: TaskExecutor,
    metrics: Option<Arc<BrokerMetrics>>,
}

impl PublishPipeline {
    pub fn new(
        subscriptions: Arc<SubscriptionStore>,
        transport: Arc<dyn UdsTransport>,
        executor: TaskExecutor,
        metrics: Option<Arc<BrokerMetrics>>,
    ) -> Self {
        Self {
            context: DeliveryContext {
                subscriptions,
                transport,
                executor,
                metrics,
            },
        }
    }

    /// Fan a message out to every current subscriber of `id`
    ///
    /// Fails only when the topic does not exist. Returns as soon as the
    /// delivery tasks are queued.
    #[tracing::instrument(skip(self, message), fields(topic = %id))]
    pub fn publish(&self, id: &str, message: Option<Value>) -> Result<()> {
        let (subscribers, hooks) = self
            .context
            .subscriptions
            .snapshot(id)
            .ok_or_else(|| Error::SubscriptionNotFound(id.to_string()))?;

        tracing::debug!(subscribers = subscribers.len(), "queueing deliveries");
        if let Some(metrics) = &self.context.metrics {
            metrics.record_publish(id);
        }
        for subscriber in subscribers {
            self.spawn_delivery(id.to_string(), subscriber, message.clone(), hooks.clone());
        }
        Ok(())
    }

    /// Queue a single delivery, bypassing the subscriber snapshot
    ///
    /// Used by /subscribe to prime a fresh subscriber with the topic's
    /// current state before any publish happens.
    pub fn spawn_delivery(
        &self,
        id: String,
        subscriber: Subscriber,
        message: Option<Value>,
        hooks: PublishHooks,
    ) {
        self.context
            .executor
            .submit(deliver(self.context.clone(), id, subscriber, message, hooks));
    }
}

/// One delivery attempt; boxed so a timeout can resubmit itself
fn deliver(
    context: DeliveryContext,
    id: String,
    subscriber: Subscriber,
    message: Option<Value>,
    hooks: PublishHooks,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        // Payload: caller message, else request hook, else empty.
        let payload: Option<Value> = match &message {
            Some(value) => Some(value.clone()),
            None => match &hooks.on_request {
                Some(hook) => match hook.handle(None).await {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::warn!(topic = %id, subscriber = %subscriber, error = %e,
                            "request hook failed, dropping delivery");
                        return;
                    }
                },
                None => None,
            },
        };

        let outcome = context
            .transport
            .post(Path::new(&subscriber.endpoint), &subscriber.path, payload.as_ref())
            .await;

        match outcome {
            Err(TransportError::Connect(e)) => {
                tracing::warn!(topic = %id, subscriber = %subscriber, error = %e,
                    "subscriber unreachable, evicting");
                evict(&context, &id, &subscriber).await;
            }
            Err(TransportError::Timeout) => {
                tracing::warn!(topic = %id, subscriber = %subscriber, "delivery timed out, retrying");
                if let Some(metrics) = &context.metrics {
                    metrics.record_retry(&id);
                }
                let retry = deliver(context.clone(), id, subscriber, message, hooks);
                context.executor.submit(retry);
            }
            Err(TransportError::Io(e)) => {
                tracing::warn!(topic = %id, subscriber = %subscriber, error = %e,
                    "delivery transport error");
            }
            Ok(response) if response.is_success() => {
                if !response.body.is_empty() {
                    if let Some(hook) = &hooks.on_response {
                        match response.json() {
                            Ok(Some(value)) => {
                                if let Err(e) = hook.handle(Some(value)).await {
                                    tracing::warn!(topic = %id, subscriber = %subscriber, error = %e,
                                        "response hook failed");
                                }
                            }
                            Ok(None) => {}
                            Err(e) => {
                                tracing::warn!(topic = %id, subscriber = %subscriber, error = %e,
                                    "subscriber reply was not valid JSON");
                            }
                        }
                    }
                }
                if let Some(metrics) = &context.metrics {
                    metrics.record_delivery(&id);
                }
                tracing::trace!(topic = %id, subscriber = %subscriber, "delivered");
            }
            Ok(response) => {
                tracing::warn!(topic = %id, subscriber = %subscriber, status = response.status,
                    "subscriber rejected delivery, evicting");
                evict(&context, &id, &subscriber).await;
            }
        }
    })
}

async fn evict(context: &DeliveryContext, id: &str, subscriber: &Subscriber) {
    if context.subscriptions.remove(id, subscriber).await {
        tracing::info!(topic = %id, subscriber = %subscriber, "evicted subscriber");
        if let Some(metrics) = &context.metrics {
            metrics.record_eviction(id);
        }
    }
}
