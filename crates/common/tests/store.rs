//! Integration tests for the encrypted state store

mod common;

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

use ::common::store::{DurableRecord, Store, StoreError};

#[tokio::test]
async fn test_fresh_store_writes_state_file() {
    let (store, temp_dir) = common::setup_store().await;
    let path = common::state_path(&temp_dir);

    assert!(path.exists());
    assert_eq!(store.write_count(), 1);
    assert!(!store.is_dirty().await);

    let contents = std::fs::read_to_string(&path).unwrap();
    let record = DurableRecord::parse(&contents).unwrap();
    assert!(!record.meta.key.iv.is_empty());
    assert!(!record.meta.key.tag.is_empty());
    assert!(!record.meta.key.data.is_empty());

    // iv (12) + tag (16) + ciphertext of "{}"
    let payload = STANDARD.decode(&record.payload).unwrap();
    assert_eq!(payload.len(), 12 + 16 + 2);
}

#[tokio::test]
async fn test_durable_across_restart() {
    let (store, temp_dir) = common::setup_store().await;

    store.set("users.alice", json!({ "role": "admin" })).await;
    store.close().await.unwrap();

    let reopened = Store::open(common::store_config(common::state_path(&temp_dir)))
        .await
        .unwrap();
    assert_eq!(
        reopened.get("users.alice").await,
        Some(json!({ "role": "admin" }))
    );
    assert_eq!(reopened.get("users.alice.role").await, Some(json!("admin")));
}

#[tokio::test]
async fn test_path_semantics() {
    let (store, _temp) = common::setup_store().await;

    store.set("a.b.c", 5).await;
    assert_eq!(store.get("a.b").await, Some(json!({ "c": 5 })));
    assert!(store.has("a.b.c").await);

    assert!(store.delete("a.b.c").await);
    assert_eq!(store.get("a.b.c").await, None);
    assert!(!store.has("a.b.c").await);
    assert!(!store.delete("a.b.c").await);

    // reading through a missing segment does not create it
    assert_eq!(store.get("x.y.z").await, None);
    assert!(!store.has("x").await);
}

#[tokio::test]
async fn test_counters_and_lists() {
    let (store, temp_dir) = common::setup_store().await;

    assert_eq!(store.add("analytics.requests.all", 1.0).await, 1.0);
    assert_eq!(store.add("analytics.requests.all", 1.0).await, 2.0);
    assert_eq!(store.subtract("analytics.requests.all", 5.0).await, -3.0);

    store.set("name", "warden").await;
    assert_eq!(store.add("name", 2.0).await, 2.0);

    store.push("logs", json!({ "id": 1 })).await;
    let logs = store.push("logs", json!({ "id": 2 })).await;
    assert_eq!(logs.len(), 2);
    assert_eq!(store.get("logs.1.id").await, Some(json!(2)));

    store.close().await.unwrap();
    let reopened = Store::open(common::store_config(common::state_path(&temp_dir)))
        .await
        .unwrap();
    assert_eq!(reopened.get("analytics.requests.all").await, Some(json!(-3)));
    assert_eq!(
        reopened.get("logs").await,
        Some(json!([{ "id": 1 }, { "id": 2 }]))
    );
}

#[tokio::test]
async fn test_typed_get() {
    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct Entry {
        id: u64,
    }

    let (store, _temp) = common::setup_store().await;
    store.set("entry", json!({ "id": 7 })).await;

    let entry: Option<Entry> = store.get_as("entry").await.unwrap();
    assert_eq!(entry, Some(Entry { id: 7 }));

    store.set("broken", json!("seven")).await;
    let result: Result<Option<Entry>, StoreError> = store.get_as("broken").await;
    assert!(matches!(result, Err(StoreError::Json(_))));
}

#[tokio::test]
async fn test_mutations_are_coalesced() {
    let (store, temp_dir) = common::setup_store().await;
    assert_eq!(store.write_count(), 1);

    for i in 0..25 {
        store.set(&format!("items.{}", i), i).await;
    }
    assert!(store.is_dirty().await);

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(store.write_count(), 2);
    assert!(!store.is_dirty().await);

    // written by the timer, without close()
    let reopened = Store::open(common::store_config(common::state_path(&temp_dir)))
        .await
        .unwrap();
    assert_eq!(reopened.get("items.24").await, Some(json!(24)));
}

#[tokio::test]
async fn test_later_mutation_schedules_another_flush() {
    let (store, temp_dir) = common::setup_store().await;

    store.set("first", 1).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    store.set("second", 2).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(store.write_count(), 3);

    let reopened = Store::open(common::store_config(common::state_path(&temp_dir)))
        .await
        .unwrap();
    assert_eq!(reopened.get("first").await, Some(json!(1)));
    assert_eq!(reopened.get("second").await, Some(json!(2)));
}

#[tokio::test]
async fn test_flush_only_when_dirty() {
    let (store, _temp) = common::setup_store().await;

    store.flush().await.unwrap();
    assert_eq!(store.write_count(), 1);

    // reads and no-op deletes do not dirty the store
    store.get("missing").await;
    store.delete("missing").await;
    assert!(!store.is_dirty().await);

    // close always writes
    store.close().await.unwrap();
    assert_eq!(store.write_count(), 2);
}

#[tokio::test]
async fn test_close_flushes_pending_mutation() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let config = common::store_config(common::state_path(&temp_dir))
        .with_debounce(Duration::from_secs(60));
    let store = Store::open(config.clone()).await.unwrap();

    store.set("pending", true).await;
    store.close().await.unwrap();
    assert!(!store.is_dirty().await);

    let reopened = Store::open(config).await.unwrap();
    assert_eq!(reopened.get("pending").await, Some(json!(true)));
}

#[tokio::test]
async fn test_failed_flush_keeps_dirty() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let nested = temp_dir.path().join("nested");
    let config = common::store_config(nested.join("warden.db"))
        .with_debounce(Duration::from_secs(60));
    let store = Store::open(config.clone()).await.unwrap();

    // replace the parent directory with a plain file
    std::fs::remove_dir_all(&nested).unwrap();
    std::fs::write(&nested, b"in the way").unwrap();

    store.set("k", "v").await;
    let result = store.flush().await;
    assert!(matches!(result, Err(StoreError::Io(_))));
    assert!(store.is_dirty().await);

    std::fs::remove_file(&nested).unwrap();
    store.flush().await.unwrap();
    assert!(!store.is_dirty().await);

    let reopened = Store::open(config).await.unwrap();
    assert_eq!(reopened.get("k").await, Some(json!("v")));
}

#[tokio::test]
async fn test_foreign_machine_cannot_open() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let config = common::store_config(common::state_path(&temp_dir));

    let store = Store::open_with_keys(config.clone(), common::keys_for_host("host-a"))
        .await
        .unwrap();
    store.set("secret", "value").await;
    store.close().await.unwrap();

    let result = Store::open_with_keys(config.clone(), common::keys_for_host("host-b")).await;
    assert!(matches!(result, Err(StoreError::Integrity(_))));

    let reopened = Store::open_with_keys(config, common::keys_for_host("host-a"))
        .await
        .unwrap();
    assert_eq!(reopened.get("secret").await, Some(json!("value")));
}

#[tokio::test]
async fn test_tampered_payload_is_rejected() {
    let (store, temp_dir) = common::setup_store().await;
    let path = common::state_path(&temp_dir);
    store.set("balance", 100).await;
    store.close().await.unwrap();

    let mut file: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let mut payload = STANDARD
        .decode(file["payload"].as_str().unwrap())
        .unwrap();
    let last = payload.len() - 1;
    payload[last] ^= 0x01;
    file["payload"] = json!(STANDARD.encode(payload));
    std::fs::write(&path, serde_json::to_vec(&file).unwrap()).unwrap();

    let result = Store::open(common::store_config(path)).await;
    let err = result.unwrap_err();
    assert!(err.is_integrity(), "unexpected error: {}", err);
}

#[tokio::test]
async fn test_malformed_file_is_rejected() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = common::state_path(&temp_dir);
    std::fs::write(&path, b"{ not json").unwrap();

    let result = Store::open(common::store_config(path)).await;
    assert!(matches!(result, Err(StoreError::Format(_))));
}

#[tokio::test]
async fn test_empty_file_starts_fresh() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = common::state_path(&temp_dir);
    std::fs::write(&path, b"").unwrap();

    let store = Store::open(common::store_config(path.clone())).await.unwrap();
    assert_eq!(store.get("anything").await, None);
    assert!(DurableRecord::parse(&std::fs::read_to_string(&path).unwrap()).is_ok());
}

#[tokio::test]
async fn test_transaction_marks_dirty_only_on_change() {
    let (store, _temp) = common::setup_store().await;

    let seen = store.transaction(|doc| doc.has("nothing")).await;
    assert!(!seen);
    assert!(!store.is_dirty().await);

    store
        .transaction(|doc| {
            doc.set("a", json!(1));
            doc.add("b", 2.0);
        })
        .await;
    assert!(store.is_dirty().await);
    assert_eq!(store.get("b").await, Some(json!(2)));
}
