//! Subscription persistence across broker restarts, on a sled store

mod common;

use common::wait_until;
use serde_json::Value;
use skillbus_broker::{Broker, KeyValueStore, SledStore, STORAGE_KEY, STORAGE_TABLE};
use skillbus_client::{BrokerClient, CallbackServer};
use skillbus_core::{Subscriber, SubscriptionRecord};
use std::path::Path;
use std::sync::{Arc, Mutex};

async fn start_broker(socket: &Path, storage: Arc<dyn KeyValueStore>) -> Broker {
    let broker = Broker::builder()
        .socket_path(socket)
        .storage(storage)
        .build()
        .await
        .unwrap();
    broker.start().await.unwrap();
    broker
}

#[tokio::test]
async fn test_subscriptions_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("lss.sock");
    let db_path = dir.path().join("state.db");

    {
        let storage = Arc::new(SledStore::open(&db_path).unwrap());
        let broker = start_broker(&socket, storage).await;
        broker.register_publish_handler("t", None, None, None);

        let client = BrokerClient::new(&socket);
        client
            .subscribe(&SubscriptionRecord::new("t", "/tmp/peer.sock", "/cb"))
            .await
            .unwrap();
        broker.stop().await;
    }

    // A fresh broker over the same database sees the subscriber.
    let storage = Arc::new(SledStore::open(&db_path).unwrap());
    let broker = start_broker(&socket, storage).await;
    assert_eq!(
        broker.subscribers_of("t"),
        vec![Subscriber::new("/tmp/peer.sock", "/cb")]
    );
    broker.stop().await;
}

#[tokio::test]
async fn test_topic_created_at_load_before_registration() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("lss.sock");
    let db_path = dir.path().join("state.db");

    // Seed the persisted array before the broker ever runs, as if a
    // previous deployment wrote it.
    let storage = Arc::new(SledStore::open(&db_path).unwrap());
    storage
        .put(
            STORAGE_TABLE,
            STORAGE_KEY,
            r#"[{"id":"t","endpoint":"/tmp/a.sock","path":"/cb"}]"#,
        )
        .await
        .unwrap();

    let broker = start_broker(&socket, storage).await;

    // The topic exists at load, before any registerPublishHandler.
    assert_eq!(
        broker.subscribers_of("t"),
        vec![Subscriber::new("/tmp/a.sock", "/cb")]
    );

    // A subsequent registration must not clear the subscriber.
    broker.register_publish_handler("t", None, None, None);
    assert_eq!(broker.subscribers_of("t").len(), 1);

    broker.stop().await;
}

#[tokio::test]
async fn test_restored_subscriber_receives_publishes() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("lss.sock");
    let db_path = dir.path().join("state.db");

    let received: Arc<Mutex<Vec<Option<Value>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let peer = CallbackServer::new(dir.path().join("peer.sock"));
    peer.route("/cb", move |delivery| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push(delivery);
            Ok(Value::Null)
        }
    });
    peer.start().await.unwrap();

    let storage = Arc::new(SledStore::open(&db_path).unwrap());
    storage
        .put(
            STORAGE_TABLE,
            STORAGE_KEY,
            &serde_json::to_string(&vec![SubscriptionRecord::new(
                "t",
                peer.socket_path().display().to_string(),
                "/cb",
            )])
            .unwrap(),
        )
        .await
        .unwrap();

    let broker = start_broker(&socket, storage).await;
    broker.register_publish_handler("t", None, None, None);
    broker.publish_message("t", serde_json::json!({"n": 7})).unwrap();

    wait_until(|| !received.lock().unwrap().is_empty()).await;
    assert_eq!(
        *received.lock().unwrap(),
        vec![Some(serde_json::json!({"n": 7}))]
    );

    peer.stop().await;
    broker.stop().await;
}

#[tokio::test]
async fn test_garbage_persisted_state_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("lss.sock");
    let db_path = dir.path().join("state.db");

    let storage = Arc::new(SledStore::open(&db_path).unwrap());
    storage
        .put(STORAGE_TABLE, STORAGE_KEY, "{{{ not json")
        .await
        .unwrap();

    let broker = start_broker(&socket, storage).await;
    assert!(broker.subscribers_of("t").is_empty());
    broker.stop().await;
}
