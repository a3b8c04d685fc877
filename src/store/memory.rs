use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use super::{
    DocumentStore, Document, Precondition, StoreError, Versioned, Write, CHANGE_FEED_CAPACITY,
};

/// In-process store. Commits take the write lock, so a commit is atomic with
/// respect to every other reader and writer.
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, Versioned>>,
    changes: broadcast::Sender<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            records: RwLock::new(BTreeMap::new()),
            changes,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Versioned>, StoreError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<Document>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, record)| Document {
                key: key.clone(),
                value: record.value.clone(),
                version: record.version,
            })
            .collect())
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<(), StoreError> {
        let mut records = self.records.write().await;

        for write in &writes {
            let current = records.get(&write.key).map(|record| record.version);
            let holds = match write.precondition {
                Precondition::Absent => current.is_none(),
                Precondition::Version(expected) => current == Some(expected),
            };
            if !holds {
                return Err(StoreError::Conflict);
            }
        }

        let mut changed = Vec::with_capacity(writes.len());
        for write in writes {
            let version = records.get(&write.key).map_or(1, |record| record.version + 1);
            records.insert(
                write.key.clone(),
                Versioned {
                    value: write.value,
                    version,
                },
            );
            changed.push(write.key);
        }
        drop(records);

        for key in changed {
            // No subscribers is fine.
            let _ = self.changes.send(key);
        }
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(key: &str, precondition: Precondition, value: serde_json::Value) -> Write {
        Write {
            key: key.to_string(),
            precondition,
            value,
        }
    }

    #[tokio::test]
    async fn test_versions_increase_per_write() {
        let store = MemoryStore::new();
        store
            .commit(vec![write("a", Precondition::Absent, json!(1))])
            .await
            .unwrap();
        store
            .commit(vec![write("a", Precondition::Version(1), json!(2))])
            .await
            .unwrap();

        let record = store.get("a").await.unwrap().unwrap();
        assert_eq!(record.version, 2);
        assert_eq!(record.value, json!(2));
    }

    #[tokio::test]
    async fn test_failed_precondition_applies_nothing() {
        let store = MemoryStore::new();
        store
            .commit(vec![write("a", Precondition::Absent, json!(1))])
            .await
            .unwrap();

        let result = store
            .commit(vec![
                write("b", Precondition::Absent, json!("new")),
                write("a", Precondition::Version(7), json!("stale")),
            ])
            .await;

        assert!(matches!(result, Err(StoreError::Conflict)));
        assert!(store.get("b").await.unwrap().is_none());
        assert_eq!(store.get("a").await.unwrap().unwrap().value, json!(1));
    }

    #[tokio::test]
    async fn test_insert_requires_absent_key() {
        let store = MemoryStore::new();
        store
            .commit(vec![write("a", Precondition::Absent, json!(1))])
            .await
            .unwrap();

        let again = store
            .commit(vec![write("a", Precondition::Absent, json!(2))])
            .await;
        assert!(matches!(again, Err(StoreError::Conflict)));
    }

    #[tokio::test]
    async fn test_list_is_prefix_scoped() {
        let store = MemoryStore::new();
        store
            .commit(vec![
                write("adHistory/u1/a", Precondition::Absent, json!(1)),
                write("adHistory/u1/b", Precondition::Absent, json!(2)),
                write("adHistory/u2/a", Precondition::Absent, json!(3)),
                write("users/u1", Precondition::Absent, json!(4)),
            ])
            .await
            .unwrap();

        let docs = store.list("adHistory/u1/").await.unwrap();
        let keys: Vec<_> = docs.iter().map(|doc| doc.key.as_str()).collect();
        assert_eq!(keys, vec!["adHistory/u1/a", "adHistory/u1/b"]);
    }

    #[tokio::test]
    async fn test_commit_publishes_changed_keys() {
        let store = MemoryStore::new();
        let mut changes = store.changes();

        store
            .commit(vec![
                write("x", Precondition::Absent, json!(1)),
                write("y", Precondition::Absent, json!(2)),
            ])
            .await
            .unwrap();

        assert_eq!(changes.recv().await.unwrap(), "x");
        assert_eq!(changes.recv().await.unwrap(), "y");
    }
}
