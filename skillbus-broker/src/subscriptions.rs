//! Topic subscription state and its persistence
//!
//! The [`SubscriptionStore`] is the single guarded structure behind the
//! broker's pub/sub state: topic id → subscriber set + hook handles. One
//! mutex covers all of it, and the critical sections are narrow — every
//! caller snapshots what it needs under the lock and does its hook
//! invocation and network I/O after the guard drops. The persistence
//! write likewise happens outside the lock, from a snapshot that is
//! internally consistent.
//!
//! # Persistence
//!
//! The entire subscription list is one JSON array of `{id, endpoint,
//! path}` objects, stored as a string under table
//! `aace.localSkillService`, key `subscriptions`. Load is forgiving by
//! design: a missing, empty or unparseable value yields an empty store,
//! and individually malformed entries are skipped with a log — a broker
//! that refuses to start over a bad persistence record would take every
//! local service down with it. Persist failures are logged and the
//! in-memory state stays authoritative until the next successful write.
//!
//! Topics referenced by persisted entries are created on load even when
//! no service has registered hooks for them yet; a later hook
//! registration attaches to the existing topic without disturbing its
//! subscribers.

use crate::handler::PublishHooks;
use crate::storage::KeyValueStore;
use crate::subscriber::SubscriberSet;
use skillbus_core::{Error, Result, Subscriber, SubscriptionRecord};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Storage table holding the broker's persisted state
pub const STORAGE_TABLE: &str = "aace.localSkillService";

/// Storage key of the subscription array
pub const STORAGE_KEY: &str = "subscriptions";

#[derive(Default)]
struct TopicState {
    subscribers: SubscriberSet,
    hooks: PublishHooks,
}

/// Map of topic id → subscribers and hooks, persisted to a K/V store
pub struct SubscriptionStore {
    topics: Mutex<HashMap<String, TopicState>>,
    storage: Arc<dyn KeyValueStore>,
}

impl SubscriptionStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            storage,
        }
    }

    /// Create the topic if it does not exist yet
    pub fn ensure_topic(&self, id: &str) {
        let mut topics = self.topics.lock().expect("subscription lock poisoned");
        topics.entry(id.to_string()).or_default();
    }

    pub fn has_topic(&self, id: &str) -> bool {
        let topics = self.topics.lock().expect("subscription lock poisoned");
        topics.contains_key(id)
    }

    /// Attach hooks to a topic, creating it if needed
    ///
    /// Only the hooks the caller supplies are overwritten; replacing an
    /// existing hook is logged. Subscribers already on the topic (for
    /// example, restored by [`load`](Self::load)) are untouched.
    pub fn register_hooks(&self, id: &str, hooks: PublishHooks) {
        let mut topics = self.topics.lock().expect("subscription lock poisoned");
        let topic = topics.entry(id.to_string()).or_default();
        if topic.hooks.merge(hooks) {
            tracing::warn!(topic = %id, "replacing existing publish handler");
        } else {
            tracing::debug!(topic = %id, "registered publish handler");
        }
    }

    /// Add a subscriber to an existing topic
    ///
    /// Fails with `SubscriptionNotFound` when the topic has never been
    /// registered, without mutating anything. Returns false when an
    /// equal subscriber is already present (no persistence write).
    pub async fn add(&self, id: &str, subscriber: Subscriber) -> Result<bool> {
        let added = {
            let mut topics = self.topics.lock().expect("subscription lock poisoned");
            match topics.get_mut(id) {
                Some(topic) => topic.subscribers.add(subscriber),
                None => return Err(Error::SubscriptionNotFound(id.to_string())),
            }
        };
        if added {
            self.persist().await;
        }
        Ok(added)
    }

    /// Remove a subscriber; false when the topic or subscriber is absent
    pub async fn remove(&self, id: &str, subscriber: &Subscriber) -> bool {
        let removed = {
            let mut topics = self.topics.lock().expect("subscription lock poisoned");
            topics
                .get_mut(id)
                .map(|topic| topic.subscribers.remove(subscriber))
                .unwrap_or(false)
        };
        if removed {
            self.persist().await;
        }
        removed
    }

    /// Snapshot of a topic's subscribers; empty when the topic is absent
    pub fn subscribers_of(&self, id: &str) -> Vec<Subscriber> {
        let topics = self.topics.lock().expect("subscription lock poisoned");
        topics
            .get(id)
            .map(|topic| topic.subscribers.snapshot())
            .unwrap_or_default()
    }

    /// Snapshot of a topic's subscribers and hooks, taken under one lock
    pub fn snapshot(&self, id: &str) -> Option<(Vec<Subscriber>, PublishHooks)> {
        let topics = self.topics.lock().expect("subscription lock poisoned");
        topics
            .get(id)
            .map(|topic| (topic.subscribers.snapshot(), topic.hooks.clone()))
    }

    /// Snapshot of a topic's hooks
    pub fn hooks_of(&self, id: &str) -> Option<PublishHooks> {
        let topics = self.topics.lock().expect("subscription lock poisoned");
        topics.get(id).map(|topic| topic.hooks.clone())
    }

    /// Total subscriptions across all topics
    pub fn subscription_count(&self) -> usize {
        let topics = self.topics.lock().expect("subscription lock poisoned");
        topics.values().map(|topic| topic.subscribers.len()).sum()
    }

    /// Restore state from the persistence backend
    ///
    /// Tolerant of every failure mode: the store starts empty rather
    /// than refusing to start. Re-loading is idempotent — entries equal
    /// to ones already present are dropped by set dedup.
    pub async fn load(&self) {
        let raw = match self.storage.get(STORAGE_TABLE, STORAGE_KEY).await {
            Ok(Some(raw)) if !raw.trim().is_empty() => raw,
            Ok(_) => {
                tracing::debug!("no persisted subscriptions");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read persisted subscriptions, starting empty");
                return;
            }
        };

        let entries: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "persisted subscriptions are not a JSON array, starting empty");
                return;
            }
        };

        let mut restored = 0usize;
        {
            let mut topics = self.topics.lock().expect("subscription lock poisoned");
            for entry in entries {
                let record: SubscriptionRecord = match serde_json::from_value(entry) {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping malformed subscription entry");
                        continue;
                    }
                };
                let topic = topics.entry(record.id.clone()).or_default();
                if topic.subscribers.add(record.subscriber()) {
                    restored += 1;
                }
            }
        }
        tracing::info!(restored, "loaded persisted subscriptions");
    }

    /// Write the current subscription list to the persistence backend
    ///
    /// Failures are logged; the in-memory state remains authoritative
    /// until the next successful write.
    pub async fn persist(&self) {
        let records: Vec<SubscriptionRecord> = {
            let topics = self.topics.lock().expect("subscription lock poisoned");
            topics
                .iter()
                .flat_map(|(id, topic)| {
                    topic
                        .subscribers
                        .snapshot()
                        .into_iter()
                        .map(move |s| SubscriptionRecord::new(id.clone(), s.endpoint, s.path))
                })
                .collect()
        };

        let serialized = match serde_json::to_string(&records) {
            Ok(serialized) => serialized,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize subscriptions");
                return;
            }
        };
        if let Err(e) = self.storage.put(STORAGE_TABLE, STORAGE_KEY, &serialized).await {
            tracing::warn!(error = %e, "failed to persist subscriptions, in-memory state wins");
        }
    }
}
