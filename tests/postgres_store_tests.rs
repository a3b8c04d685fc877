//! Runs against a real database when `TEST_DATABASE_URL` is set; otherwise
//! every test returns early.

use std::{sync::Arc, time::Duration};

use ad_rewards_server::store::{
    watch_collection, DocumentStore, PostgresStore, Precondition, StoreError, Write,
};
use futures::StreamExt;
use serde_json::json;
use serial_test::serial;
use uuid::Uuid;

async fn store() -> Option<PostgresStore> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let store = PostgresStore::connect(&url)
        .await
        .expect("Failed to connect to test database");
    store.migrate().await.expect("Failed to run migrations");
    Some(store)
}

fn insert(key: &str, value: serde_json::Value) -> Write {
    Write {
        key: key.to_string(),
        precondition: Precondition::Absent,
        value,
    }
}

#[tokio::test]
#[serial]
async fn test_commit_and_read_back() {
    let Some(store) = store().await else { return };
    let prefix = format!("test/{}/", Uuid::new_v4());

    store
        .commit(vec![
            insert(&format!("{}a", prefix), json!({"n": 1})),
            insert(&format!("{}b", prefix), json!({"n": 2})),
        ])
        .await
        .unwrap();

    let record = store.get(&format!("{}a", prefix)).await.unwrap().unwrap();
    assert_eq!(record.value, json!({"n": 1}));
    assert_eq!(record.version, 1);

    let listed = store.list(&prefix).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[1].value, json!({"n": 2}));
}

#[tokio::test]
#[serial]
async fn test_failed_precondition_applies_nothing() {
    let Some(store) = store().await else { return };
    let prefix = format!("test/{}/", Uuid::new_v4());
    let existing = format!("{}existing", prefix);
    let fresh = format!("{}fresh", prefix);

    store.commit(vec![insert(&existing, json!(1))]).await.unwrap();

    let result = store
        .commit(vec![
            insert(&fresh, json!(2)),
            Write {
                key: existing.clone(),
                precondition: Precondition::Version(7),
                value: json!(3),
            },
        ])
        .await;

    assert!(matches!(result, Err(StoreError::Conflict)));
    assert!(store.get(&fresh).await.unwrap().is_none());
    assert_eq!(store.get(&existing).await.unwrap().unwrap().value, json!(1));
}

#[tokio::test]
#[serial]
async fn test_versioned_update_bumps_version() {
    let Some(store) = store().await else { return };
    let key = format!("test/{}/counter", Uuid::new_v4());

    store.commit(vec![insert(&key, json!(0))]).await.unwrap();
    store
        .commit(vec![Write {
            key: key.clone(),
            precondition: Precondition::Version(1),
            value: json!(1),
        }])
        .await
        .unwrap();

    let record = store.get(&key).await.unwrap().unwrap();
    assert_eq!(record.version, 2);
    assert_eq!(record.value, json!(1));
}

#[tokio::test]
#[serial]
async fn test_list_treats_prefix_literally() {
    let Some(store) = store().await else { return };
    let prefix = format!("test/{}/", Uuid::new_v4());

    store
        .commit(vec![
            insert(&format!("{}a_b", prefix), json!(1)),
            insert(&format!("{}axb", prefix), json!(2)),
            insert(&format!("{}a%c", prefix), json!(3)),
        ])
        .await
        .unwrap();

    let underscore = store.list(&format!("{}a_", prefix)).await.unwrap();
    assert_eq!(underscore.len(), 1);
    assert_eq!(underscore[0].value, json!(1));

    let percent = store.list(&format!("{}a%", prefix)).await.unwrap();
    assert_eq!(percent.len(), 1);
    assert_eq!(percent[0].value, json!(3));
}

#[tokio::test]
#[serial]
async fn test_notifications_drive_subscriptions() {
    let Some(store) = store().await else { return };
    let store: Arc<dyn DocumentStore> = Arc::new(store);
    let prefix = format!("test/{}/", Uuid::new_v4());

    let mut snapshots = watch_collection::<i64, _>(store.clone(), prefix.clone(), |_| true);
    assert!(snapshots.next().await.unwrap().unwrap().is_empty());

    // The listener connects in the background.
    tokio::time::sleep(Duration::from_millis(200)).await;
    store.commit(vec![insert(&format!("{}x", prefix), json!(5))]).await.unwrap();

    let next = tokio::time::timeout(Duration::from_secs(5), snapshots.next())
        .await
        .expect("no notification received");
    assert_eq!(next.unwrap().unwrap(), vec![5]);

    store.close().await;
}
