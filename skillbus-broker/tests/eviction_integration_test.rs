//! Eviction behavior against real subscriber endpoints

mod common;

use common::wait_until;
use serde_json::Value;
use skillbus_broker::{Broker, KeyValueStore, MemoryStore, STORAGE_KEY, STORAGE_TABLE};
use skillbus_client::{BrokerClient, CallbackServer};
use skillbus_core::{Error, SubscriptionRecord};
use std::sync::Arc;

async fn start_broker(
    dir: &tempfile::TempDir,
    storage: Arc<MemoryStore>,
) -> (Broker, BrokerClient) {
    let socket = dir.path().join("lss.sock");
    let broker = Broker::builder()
        .socket_path(&socket)
        .storage(storage as Arc<dyn KeyValueStore>)
        .build()
        .await
        .unwrap();
    broker.start().await.unwrap();
    (broker, BrokerClient::new(&socket))
}

async fn persisted(storage: &MemoryStore) -> Vec<SubscriptionRecord> {
    let raw = storage
        .get(STORAGE_TABLE, STORAGE_KEY)
        .await
        .unwrap()
        .unwrap_or_else(|| "[]".into());
    serde_json::from_str(&raw).unwrap()
}

#[tokio::test]
async fn test_subscriber_returning_500_is_evicted_and_unpersisted() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(MemoryStore::new());
    let (broker, client) = start_broker(&dir, Arc::clone(&storage)).await;

    // A peer that rejects every delivery.
    let peer = CallbackServer::new(dir.path().join("peer.sock"));
    peer.route("/cb", |_| async {
        Err::<Value, _>(Error::Handler("rejecting everything".into()))
    });
    peer.start().await.unwrap();

    broker.register_publish_handler("t", None, None, None);
    let record = SubscriptionRecord::new(
        "t",
        peer.socket_path().display().to_string(),
        "/cb",
    );
    client.subscribe(&record).await.unwrap();
    assert_eq!(persisted(&storage).await.len(), 1);

    broker.publish_message("t", serde_json::json!({"n": 1})).unwrap();

    wait_until(|| broker.subscribers_of("t").is_empty()).await;
    assert!(persisted(&storage).await.is_empty());

    // The next publish performs zero deliveries.
    broker.publish_message("t", serde_json::json!({"n": 2})).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(broker.subscribers_of("t").is_empty());

    peer.stop().await;
    broker.stop().await;
}

#[tokio::test]
async fn test_subscriber_returning_404_is_evicted() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(MemoryStore::new());
    let (broker, client) = start_broker(&dir, Arc::clone(&storage)).await;

    // A live endpoint with no route at the subscribed path: every
    // delivery comes back 404.
    let peer = CallbackServer::new(dir.path().join("peer.sock"));
    peer.route("/elsewhere", |_| async { Ok(Value::Null) });
    peer.start().await.unwrap();

    broker.register_publish_handler("t", None, None, None);
    let record = SubscriptionRecord::new(
        "t",
        peer.socket_path().display().to_string(),
        "/cb",
    );
    client.subscribe(&record).await.unwrap();

    broker.publish_message("t", serde_json::json!({})).unwrap();

    wait_until(|| broker.subscribers_of("t").is_empty()).await;
    assert!(persisted(&storage).await.is_empty());

    peer.stop().await;
    broker.stop().await;
}

#[tokio::test]
async fn test_unreachable_subscriber_is_evicted() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(MemoryStore::new());
    let (broker, client) = start_broker(&dir, Arc::clone(&storage)).await;

    broker.register_publish_handler("t", None, None, None);
    // Nothing listens on this socket.
    let record = SubscriptionRecord::new(
        "t",
        dir.path().join("ghost.sock").display().to_string(),
        "/cb",
    );
    client.subscribe(&record).await.unwrap();
    assert_eq!(broker.subscribers_of("t").len(), 1);

    broker.publish_message("t", serde_json::json!({})).unwrap();

    wait_until(|| broker.subscribers_of("t").is_empty()).await;
    assert!(persisted(&storage).await.is_empty());

    broker.stop().await;
}

#[tokio::test]
async fn test_healthy_subscriber_outlives_a_failing_one() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(MemoryStore::new());
    let (broker, client) = start_broker(&dir, Arc::clone(&storage)).await;

    let healthy = CallbackServer::new(dir.path().join("healthy.sock"));
    healthy.route("/cb", |_| async { Ok(Value::Null) });
    healthy.start().await.unwrap();

    broker.register_publish_handler("t", None, None, None);
    client
        .subscribe(&SubscriptionRecord::new(
            "t",
            healthy.socket_path().display().to_string(),
            "/cb",
        ))
        .await
        .unwrap();
    client
        .subscribe(&SubscriptionRecord::new(
            "t",
            dir.path().join("ghost.sock").display().to_string(),
            "/cb",
        ))
        .await
        .unwrap();
    assert_eq!(broker.subscribers_of("t").len(), 2);

    broker.publish_message("t", serde_json::json!({})).unwrap();

    wait_until(|| broker.subscribers_of("t").len() == 1).await;
    let survivors = persisted(&storage).await;
    assert_eq!(survivors.len(), 1);
    assert_eq!(
        survivors[0].endpoint,
        healthy.socket_path().display().to_string()
    );

    healthy.stop().await;
    broker.stop().await;
}
