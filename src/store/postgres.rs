use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{
    postgres::{PgListener, PgPoolOptions},
    PgPool, Row,
};
use tokio::{sync::broadcast, task::JoinHandle};

use super::{
    DocumentStore, Document, Precondition, StoreError, Versioned, Write, CHANGE_FEED_CAPACITY,
};

const CHANGE_CHANNEL: &str = "document_changes";

/// Documents live in one JSONB table; each commit is a single SQL
/// transaction of conditional writes, and `NOTIFY` carries the change feed.
pub struct PostgresStore {
    pool: PgPool,
    changes: broadcast::Sender<String>,
    listener: JoinHandle<()>,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: PgPool) -> Result<Self, StoreError> {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        let listener = tokio::spawn(forward_notifications(pool.clone(), changes.clone()));

        Ok(Self {
            pool,
            changes,
            listener,
        })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Drop for PostgresStore {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn forward_notifications(pool: PgPool, changes: broadcast::Sender<String>) {
    loop {
        match listen(&pool, &changes).await {
            Ok(()) => return,
            Err(e) => {
                tracing::warn!("Change feed listener failed, reconnecting: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

async fn listen(pool: &PgPool, changes: &broadcast::Sender<String>) -> Result<(), sqlx::Error> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(CHANGE_CHANNEL).await?;

    loop {
        let notification = listener.recv().await?;
        let _ = changes.send(notification.payload().to_string());
    }
}

/// `LIKE` pattern matching keys that start with `prefix` literally.
fn prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn to_version(raw: i64) -> u64 {
    raw.max(0) as u64
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn get(&self, key: &str) -> Result<Option<Versioned>, StoreError> {
        let row = sqlx::query("SELECT value, version FROM documents WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(Versioned {
                value: row.try_get::<Value, _>("value")?,
                version: to_version(row.try_get::<i64, _>("version")?),
            })
        })
        .transpose()
    }

    async fn list(&self, prefix: &str) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query(
            "SELECT key, value, version FROM documents \
             WHERE key LIKE $1 ESCAPE '\\' ORDER BY key",
        )
        .bind(prefix_pattern(prefix))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(Document {
                    key: row.try_get("key")?,
                    value: row.try_get::<Value, _>("value")?,
                    version: to_version(row.try_get::<i64, _>("version")?),
                })
            })
            .collect()
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for write in &writes {
            let result = match write.precondition {
                Precondition::Absent => {
                    sqlx::query(
                        "INSERT INTO documents (key, value, version) VALUES ($1, $2, 1) \
                         ON CONFLICT (key) DO NOTHING",
                    )
                    .bind(&write.key)
                    .bind(&write.value)
                    .execute(&mut *tx)
                    .await?
                }
                Precondition::Version(expected) => {
                    sqlx::query(
                        "UPDATE documents SET value = $2, version = version + 1, updated_at = NOW() \
                         WHERE key = $1 AND version = $3",
                    )
                    .bind(&write.key)
                    .bind(&write.value)
                    .bind(expected as i64)
                    .execute(&mut *tx)
                    .await?
                }
            };

            if result.rows_affected() != 1 {
                tx.rollback().await?;
                return Err(StoreError::Conflict);
            }
        }

        for write in &writes {
            sqlx::query("SELECT pg_notify($1, $2)")
                .bind(CHANGE_CHANNEL)
                .bind(&write.key)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) {
        self.listener.abort();
        self.pool.close().await;
    }
}
