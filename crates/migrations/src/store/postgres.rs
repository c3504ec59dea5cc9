//! PostgreSQL data store
//!
//! Documents live in a single JSONB table keyed by `(collection, key)`. The
//! primary key gives the ledger its uniqueness guarantee. Advisory locks are
//! session scoped in PostgreSQL, so a held lock pins one pooled connection
//! until it is released.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, PgPool, Postgres, Row};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{DataStore, Document, StoreError, StoreResult};
use crate::error::ConnectionError;

/// Table holding every document
pub const DOCUMENTS_TABLE: &str = "folio_documents";

const UNIQUE_VIOLATION: &str = "23505";

/// [`DataStore`] backed by PostgreSQL through `sqlx`
pub struct PgStore {
    pool: PgPool,
    lock_connections: Mutex<HashMap<String, PoolConnection<Postgres>>>,
}

impl PgStore {
    /// Connect and make sure the documents table exists
    pub async fn connect(database_url: &str) -> Result<Self, ConnectionError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(|e| ConnectionError::Unreachable {
                message: e.to_string(),
            })?;

        let store = Self::from_pool(pool);
        store
            .ensure_documents_table()
            .await
            .map_err(|e| ConnectionError::Unreachable {
                message: format!("Failed to create {}: {}", DOCUMENTS_TABLE, e),
            })?;

        tracing::debug!("Connected to PostgreSQL data store");
        Ok(store)
    }

    /// Wrap an existing pool; the caller is responsible for the table
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            lock_connections: Mutex::new(HashMap::new()),
        }
    }

    /// Get the database pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the documents table if it does not exist
    pub async fn ensure_documents_table(&self) -> StoreResult<()> {
        sqlx::query(&create_documents_table_sql())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.pool.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl DataStore for PgStore {
    async fn find_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        self.ensure_open()?;
        let sql = format!(
            "SELECT key, body FROM {} WHERE collection = $1 ORDER BY key",
            DOCUMENTS_TABLE
        );
        let rows = sqlx::query(&sql)
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> StoreResult<Document> {
                Ok(Document {
                    key: row.try_get("key")?,
                    body: row.try_get("body")?,
                })
            })
            .collect()
    }

    async fn find_one(&self, collection: &str, key: &str) -> StoreResult<Option<Document>> {
        self.ensure_open()?;
        let sql = format!(
            "SELECT body FROM {} WHERE collection = $1 AND key = $2",
            DOCUMENTS_TABLE
        );
        let row = sqlx::query(&sql)
            .bind(collection)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Document {
                key: key.to_string(),
                body: row.try_get("body")?,
            })),
            None => Ok(None),
        }
    }

    async fn insert(&self, collection: &str, key: &str, body: Value) -> StoreResult<()> {
        self.ensure_open()?;
        let sql = format!(
            "INSERT INTO {} (collection, key, body) VALUES ($1, $2, $3)",
            DOCUMENTS_TABLE
        );
        sqlx::query(&sql)
            .bind(collection)
            .bind(key)
            .bind(body)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Duplicate {
                        collection: collection.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    StoreError::from(e)
                }
            })?;
        Ok(())
    }

    async fn put(&self, collection: &str, key: &str, body: Value) -> StoreResult<()> {
        self.ensure_open()?;
        let sql = format!(
            "INSERT INTO {} (collection, key, body) VALUES ($1, $2, $3) \
             ON CONFLICT (collection, key) DO UPDATE SET body = EXCLUDED.body",
            DOCUMENTS_TABLE
        );
        sqlx::query(&sql)
            .bind(collection)
            .bind(key)
            .bind(body)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        let sql = format!(
            "DELETE FROM {} WHERE collection = $1 AND key = $2",
            DOCUMENTS_TABLE
        );
        let result = sqlx::query(&sql)
            .bind(collection)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn try_lock(&self, lock_key: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        let mut held = self.lock_connections.lock().await;
        if held.contains_key(lock_key) {
            return Ok(false);
        }

        let mut conn = self.pool.acquire().await?;
        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock(hashtext($1))")
            .bind(lock_key)
            .fetch_one(&mut *conn)
            .await?;

        if acquired {
            held.insert(lock_key.to_string(), conn);
        }
        Ok(acquired)
    }

    async fn unlock(&self, lock_key: &str) -> StoreResult<()> {
        let conn = self.lock_connections.lock().await.remove(lock_key);
        let Some(mut conn) = conn else {
            return Ok(());
        };

        let unlocked = sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock(hashtext($1))")
            .bind(lock_key)
            .fetch_one(&mut *conn)
            .await;

        if let Err(e) = unlocked {
            // The session may still hold the lock; end it rather than pool it
            if let Err(close_err) = conn.detach().close().await {
                tracing::warn!(lock = %lock_key, error = %close_err, "Failed to close lock session");
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        // Lock connections go back to the pool and are closed with it, which
        // drops any advisory lock still held.
        self.lock_connections.lock().await.clear();
        self.pool.close().await;
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

/// SQL to create the documents table
pub fn create_documents_table_sql() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    \
            collection TEXT NOT NULL,\n    \
            key TEXT NOT NULL,\n    \
            body JSONB NOT NULL,\n    \
            PRIMARY KEY (collection, key)\n\
        )",
        DOCUMENTS_TABLE
    )
}
