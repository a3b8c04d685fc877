use std::sync::Arc;

use futures::{
    stream::{self, BoxStream},
    StreamExt,
};
use serde::de::DeserializeOwned;
use tokio::sync::broadcast::{self, error::RecvError};

use super::{DocumentStore, StoreError};

struct Feed {
    store: Arc<dyn DocumentStore>,
    changes: broadcast::Receiver<String>,
    scope: String,
    exact: bool,
    primed: bool,
}

impl Feed {
    fn covers(&self, key: &str) -> bool {
        if self.exact {
            key == self.scope
        } else {
            key.starts_with(&self.scope)
        }
    }

    /// Waits until something under the scope changed. `false` once the store
    /// is gone.
    async fn next_change(&mut self) -> bool {
        loop {
            match self.changes.recv().await {
                Ok(key) if self.covers(&key) => return true,
                Ok(_) => continue,
                // Missed events; a fresh snapshot covers them.
                Err(RecvError::Lagged(_)) => return true,
                Err(RecvError::Closed) => return false,
            }
        }
    }
}

/// Full snapshots of every record under `prefix` that matches `predicate`:
/// one immediately, then one after each change under the prefix. Dropping
/// the stream detaches the subscriber.
pub fn watch_collection<T, P>(
    store: Arc<dyn DocumentStore>,
    prefix: impl Into<String>,
    predicate: P,
) -> BoxStream<'static, Result<Vec<T>, StoreError>>
where
    T: DeserializeOwned + Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    let feed = Feed {
        changes: store.changes(),
        store,
        scope: prefix.into(),
        exact: false,
        primed: false,
    };

    stream::unfold(feed, move |mut feed| {
        let predicate = predicate.clone();
        async move {
            if feed.primed && !feed.next_change().await {
                return None;
            }
            feed.primed = true;

            let snapshot = match feed.store.list(&feed.scope).await {
                Ok(docs) => docs
                    .into_iter()
                    .map(|doc| {
                        serde_json::from_value::<T>(doc.value)
                            .map_err(|source| StoreError::Corrupt { key: doc.key, source })
                    })
                    .filter(|item| item.as_ref().map_or(true, |value| (*predicate)(value)))
                    .collect::<Result<Vec<T>, StoreError>>(),
                Err(e) => Err(e),
            };
            Some((snapshot, feed))
        }
    })
    .boxed()
}

/// Current value of one record (or `None` while absent), re-sent on every
/// change to it.
pub fn watch_document<T>(
    store: Arc<dyn DocumentStore>,
    key: impl Into<String>,
) -> BoxStream<'static, Result<Option<T>, StoreError>>
where
    T: DeserializeOwned + Send + 'static,
{
    let key = key.into();
    let feed = Feed {
        changes: store.changes(),
        store,
        scope: key,
        exact: true,
        primed: false,
    };

    stream::unfold(feed, |mut feed| async move {
        if feed.primed && !feed.next_change().await {
            return None;
        }
        feed.primed = true;

        let value = match feed.store.get(&feed.scope).await {
            Ok(Some(record)) => serde_json::from_value::<T>(record.value)
                .map(Some)
                .map_err(|source| StoreError::Corrupt {
                    key: feed.scope.clone(),
                    source,
                }),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        Some((value, feed))
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Precondition, Write};
    use serde_json::json;

    async fn put(store: &MemoryStore, key: &str, value: serde_json::Value) {
        store
            .commit(vec![Write {
                key: key.to_string(),
                precondition: Precondition::Absent,
                value,
            }])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_collection_snapshots_follow_changes() {
        let store = Arc::new(MemoryStore::new());
        put(&store, "items/a", json!(1)).await;

        let mut snapshots = watch_collection::<i64, _>(store.clone(), "items/", |v| *v > 0);
        assert_eq!(snapshots.next().await.unwrap().unwrap(), vec![1]);

        put(&store, "other/x", json!(9)).await;
        put(&store, "items/b", json!(-5)).await;
        assert_eq!(snapshots.next().await.unwrap().unwrap(), vec![1]);

        put(&store, "items/c", json!(3)).await;
        assert_eq!(snapshots.next().await.unwrap().unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_dropping_stream_detaches_subscriber() {
        let store = Arc::new(MemoryStore::new());
        let snapshots = watch_collection::<i64, _>(store.clone(), "items/", |_| true);
        drop(snapshots);

        // Publishing with no receivers left must not fail the commit.
        put(&store, "items/a", json!(1)).await;
        assert_eq!(store.list("items/").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_document_watch_reports_absence_then_value() {
        let store = Arc::new(MemoryStore::new());
        let mut updates = watch_document::<i64>(store.clone(), "users/a");

        assert_eq!(updates.next().await.unwrap().unwrap(), None);
        put(&store, "users/a", json!(7)).await;
        assert_eq!(updates.next().await.unwrap().unwrap(), Some(7));
    }
}
