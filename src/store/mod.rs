//! Document store abstraction.
//!
//! Records are JSON documents addressed by slash-separated keys
//! (`users/{uid}`, `withdrawals/{id}`, ...). Every record carries a version
//! that increases on each write; [`DocumentStore::commit`] applies a set of
//! writes atomically only if every precondition still holds. That commit is
//! the single serialization point for all balance mutations.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

pub mod memory;
pub mod postgres;
pub mod subscription;
pub mod transaction;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use subscription::{watch_collection, watch_document};
pub use transaction::{RetryPolicy, Transaction, TransactionRunner};

/// Capacity of the change feed; slow subscribers that fall further behind
/// re-read their snapshot instead of replaying.
pub const CHANGE_FEED_CAPACITY: usize = 1024;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Write conflict: a record changed since it was read")]
    Conflict,

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Record {key} is not a valid document: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record {0} must be read inside the transaction before it is updated")]
    NotRead(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(e.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

impl StoreError {
    /// Errors that a fresh attempt may not hit again.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Conflict | StoreError::Unavailable(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub value: Value,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub key: String,
    pub value: Value,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// The key must not exist yet.
    Absent,
    /// The key must still be at this version.
    Version(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    pub key: String,
    pub precondition: Precondition,
    pub value: Value,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Versioned>, StoreError>;

    /// All records whose key starts with `prefix`, in key order.
    async fn list(&self, prefix: &str) -> Result<Vec<Document>, StoreError>;

    /// Applies every write or none of them. Returns [`StoreError::Conflict`]
    /// when any precondition no longer holds.
    async fn commit(&self, writes: Vec<Write>) -> Result<(), StoreError>;

    /// Feed of keys changed by successful commits.
    fn changes(&self) -> broadcast::Receiver<String>;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn close(&self);
}
