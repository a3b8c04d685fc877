use std::{collections::BTreeMap, future::Future, sync::Arc, time::Duration};

use rand::Rng;
use serde::{de::DeserializeOwned, Serialize};

use super::{DocumentStore, Precondition, StoreError, Write};
use crate::{
    errors::{AppError, Result},
    services::metrics::MetricsService,
};

/// Optimistic unit of work: reads remember the version they saw, writes are
/// buffered, and `commit` hands the whole write set to the store with those
/// versions as preconditions.
pub struct Transaction {
    store: Arc<dyn DocumentStore>,
    seen: BTreeMap<String, Option<u64>>,
    writes: BTreeMap<String, Write>,
}

impl Transaction {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            seen: BTreeMap::new(),
            writes: BTreeMap::new(),
        }
    }

    pub async fn get<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        let record = self.store.get(key).await?;
        self.seen
            .insert(key.to_string(), record.as_ref().map(|r| r.version));

        record
            .map(|r| {
                serde_json::from_value(r.value).map_err(|source| StoreError::Corrupt {
                    key: key.to_string(),
                    source,
                })
            })
            .transpose()
            .map_err(AppError::from)
    }

    /// Every record under `prefix`. Listings are not tracked, so they never
    /// fail a commit; update only what was read with [`Transaction::get`].
    pub async fn list<T: DeserializeOwned>(&mut self, prefix: &str) -> Result<Vec<T>> {
        let documents = self.store.list(prefix).await?;

        documents
            .into_iter()
            .map(|doc| {
                serde_json::from_value(doc.value)
                    .map_err(|source| StoreError::Corrupt { key: doc.key, source }.into())
            })
            .collect()
    }

    /// Creates a record that must not exist at commit time.
    pub fn insert<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        self.stage(key, Precondition::Absent, value)
    }

    /// Replaces a record read earlier in this transaction. Fails the commit
    /// if anyone else wrote it in between.
    pub fn update<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let precondition = match self.seen.get(key) {
            Some(Some(version)) => Precondition::Version(*version),
            Some(None) => Precondition::Absent,
            None => return Err(StoreError::NotRead(key.to_string()).into()),
        };
        self.stage(key, precondition, value)
    }

    fn stage<T: Serialize>(&mut self, key: &str, precondition: Precondition, value: &T) -> Result<()> {
        let value = serde_json::to_value(value).map_err(StoreError::from)?;
        self.writes.insert(
            key.to_string(),
            Write {
                key: key.to_string(),
                precondition,
                value,
            },
        );
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub async fn commit(self) -> Result<()> {
        if self.writes.is_empty() {
            return Ok(());
        }
        let writes = self.writes.into_values().collect();
        self.store.commit(writes).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(20),
            attempt_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1 << attempt.min(8));
        let jitter_ms = self.base_delay.as_millis().max(1) as u64;
        exp + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    }
}

/// Runs transaction attempts until one commits, a business rule rejects the
/// operation, or the retry budget runs out.
#[derive(Clone)]
pub struct TransactionRunner {
    store: Arc<dyn DocumentStore>,
    policy: RetryPolicy,
    metrics: Arc<MetricsService>,
}

impl TransactionRunner {
    pub fn new(store: Arc<dyn DocumentStore>, policy: RetryPolicy, metrics: Arc<MetricsService>) -> Self {
        Self {
            store,
            policy,
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// `attempt` receives a fresh [`Transaction`] each time and must re-read
    /// everything it depends on; it may run more than once.
    pub async fn run<F, Fut, R>(&self, operation: &'static str, mut attempt: F) -> Result<R>
    where
        F: FnMut(Transaction) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let mut last_failure = String::new();

        for n in 0..self.policy.max_attempts {
            let tx = Transaction::new(self.store.clone());
            let outcome = tokio::time::timeout(self.policy.attempt_timeout, attempt(tx)).await;

            match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(AppError::Store(e))) if e.is_transient() => {
                    last_failure = e.to_string();
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    last_failure = format!("attempt timed out after {:?}", self.policy.attempt_timeout);
                }
            }

            if n + 1 < self.policy.max_attempts {
                self.metrics.record_transaction_retry(operation);
                tracing::warn!(
                    operation,
                    attempt = n + 1,
                    "Transaction attempt failed, retrying: {}",
                    last_failure
                );
                tokio::time::sleep(self.policy.backoff(n)).await;
            }
        }

        Err(AppError::StoreUnavailable(format!(
            "{} gave up after {} attempts: {}",
            operation, self.policy.max_attempts, last_failure
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, MockDocumentStore, Versioned};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            attempt_timeout: Duration::from_millis(200),
        }
    }

    fn runner(store: Arc<dyn DocumentStore>, max_attempts: u32) -> TransactionRunner {
        TransactionRunner::new(store, quick_policy(max_attempts), Arc::new(MetricsService::new()))
    }

    #[tokio::test]
    async fn test_update_without_read_is_rejected() {
        let mut tx = Transaction::new(Arc::new(MemoryStore::new()));
        let result = tx.update("users/x", &json!({}));
        assert!(matches!(result, Err(AppError::Store(StoreError::NotRead(_)))));
    }

    #[tokio::test]
    async fn test_stale_read_conflicts() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let mut seed = Transaction::new(store.clone());
        seed.insert("counter", &json!(0)).unwrap();
        seed.commit().await.unwrap();

        let mut first = Transaction::new(store.clone());
        let mut second = Transaction::new(store.clone());
        let a: i64 = first.get("counter").await.unwrap().unwrap();
        let b: i64 = second.get("counter").await.unwrap().unwrap();

        first.update("counter", &(a + 1)).unwrap();
        second.update("counter", &(b + 1)).unwrap();
        first.commit().await.unwrap();

        let result = second.commit().await;
        assert!(matches!(result, Err(AppError::Store(StoreError::Conflict))));
    }

    #[tokio::test]
    async fn test_conflicts_are_retried_until_commit() {
        let mut mock = MockDocumentStore::new();
        let commits = Arc::new(AtomicU32::new(0));
        let seen = commits.clone();

        mock.expect_get().returning(|_| {
            Ok(Some(Versioned {
                value: json!(1),
                version: 1,
            }))
        });
        mock.expect_commit().returning(move |_| {
            if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StoreError::Conflict)
            } else {
                Ok(())
            }
        });

        let result = runner(Arc::new(mock), 5)
            .run("test", |mut tx| async move {
                let value: i64 = tx.get("k").await?.unwrap_or_default();
                tx.update("k", &(value + 1))?;
                tx.commit().await?;
                Ok(value + 1)
            })
            .await
            .unwrap();

        assert_eq!(result, 2);
        assert_eq!(commits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_store_unavailable() {
        let mut mock = MockDocumentStore::new();
        mock.expect_get()
            .returning(|_| Err(StoreError::Unavailable("connection refused".to_string())));

        let result: Result<()> = runner(Arc::new(mock), 3)
            .run("test", |mut tx| async move {
                tx.get::<i64>("k").await?;
                Ok(())
            })
            .await;

        match result {
            Err(AppError::StoreUnavailable(msg)) => assert!(msg.contains("3 attempts")),
            other => panic!("expected StoreUnavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_business_errors_are_not_retried() {
        let attempts = AtomicU32::new(0);

        let result: Result<()> = runner(Arc::new(MemoryStore::new()), 5)
            .run("test", |_tx| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(AppError::QuotaExceeded { limit: 20 }) }
            })
            .await;

        assert!(matches!(result, Err(AppError::QuotaExceeded { limit: 20 })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_attempt_times_out() {
        let result: Result<()> = runner(Arc::new(MemoryStore::new()), 2)
            .run("test", |_tx| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(AppError::StoreUnavailable(_))));
    }
}
