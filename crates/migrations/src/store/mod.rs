//! Data store abstraction
//!
//! The engine only needs a small document-store surface: enumerate, read and
//! write JSON documents keyed by `(collection, key)`, a uniqueness-constrained
//! insert for the ledger, and an advisory lock primitive.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::error::ConnectionError;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Result type alias for data store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a data store
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness-constrained insert hit an existing key
    #[error("Document '{key}' already exists in collection '{collection}'")]
    Duplicate { collection: String, key: String },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Data store connection is closed")]
    Closed,
}

impl StoreError {
    /// Whether this error is a uniqueness violation
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// A stored JSON document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub key: String,
    pub body: Value,
}

/// Driver-agnostic persistence used by migrations and the ledger
#[async_trait]
pub trait DataStore: Send + Sync {
    /// All documents in a collection, ordered by key
    async fn find_all(&self, collection: &str) -> StoreResult<Vec<Document>>;

    /// A single document, if present
    async fn find_one(&self, collection: &str, key: &str) -> StoreResult<Option<Document>>;

    /// Insert a new document; fails with [`StoreError::Duplicate`] if the key exists
    async fn insert(&self, collection: &str, key: &str, body: Value) -> StoreResult<()>;

    /// Insert or replace a document
    async fn put(&self, collection: &str, key: &str, body: Value) -> StoreResult<()>;

    /// Delete a document, returning whether it existed
    async fn delete(&self, collection: &str, key: &str) -> StoreResult<bool>;

    /// Try to take the named advisory lock without waiting
    async fn try_lock(&self, lock_key: &str) -> StoreResult<bool>;

    /// Release the named advisory lock
    async fn unlock(&self, lock_key: &str) -> StoreResult<()>;

    /// Release the underlying connections. Safe to call more than once.
    async fn close(&self) -> StoreResult<()>;
}

/// Open a data store for a connection string
///
/// `memory://` gives a process-local store; `postgres://` and `postgresql://`
/// connect to PostgreSQL.
pub async fn connect(url: &str) -> Result<Arc<dyn DataStore>, ConnectionError> {
    let (scheme, _) = url.split_once("://").ok_or_else(|| ConnectionError::InvalidUrl {
        message: format!("'{}' has no scheme", url),
    })?;

    match scheme {
        "memory" => {
            tracing::debug!("Using in-memory data store");
            Ok(Arc::new(MemoryStore::new()))
        }
        "postgres" | "postgresql" => Ok(Arc::new(PgStore::connect(url).await?)),
        other => Err(ConnectionError::UnsupportedScheme {
            scheme: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_memory() {
        let store = connect("memory://").await.unwrap();
        store.put("portfolios", "p1", serde_json::json!({})).await.unwrap();
        assert_eq!(store.find_all("portfolios").await.unwrap().len(), 1);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_scheme() {
        let err = connect("mongodb://localhost:27017/folio").await.err().unwrap();
        assert!(matches!(err, ConnectionError::UnsupportedScheme { scheme } if scheme == "mongodb"));

        let err = connect("localhost/folio").await.err().unwrap();
        assert!(matches!(err, ConnectionError::InvalidUrl { .. }));
    }
}
