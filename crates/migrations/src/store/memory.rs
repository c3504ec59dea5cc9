//! Process-local data store
//!
//! Backs tests and `memory://` runs. Nothing survives the process.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};

use super::{DataStore, Document, StoreError, StoreResult};

type Collection = BTreeMap<String, Value>;

/// In-memory [`DataStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    locks: Mutex<HashSet<String>>,
    writes: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful document writes (insert, put, delete) so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Whether the named advisory lock is currently held
    pub async fn is_locked(&self, lock_key: &str) -> bool {
        self.locks.lock().await.contains(lock_key)
    }

    /// Whether [`DataStore::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn find_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        self.ensure_open()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(key, body)| Document {
                        key: key.clone(),
                        body: body.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_one(&self, collection: &str, key: &str) -> StoreResult<Option<Document>> {
        self.ensure_open()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(key))
            .map(|body| Document {
                key: key.to_string(),
                body: body.clone(),
            }))
    }

    async fn insert(&self, collection: &str, key: &str, body: Value) -> StoreResult<()> {
        self.ensure_open()?;
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(key) {
            return Err(StoreError::Duplicate {
                collection: collection.to_string(),
                key: key.to_string(),
            });
        }
        docs.insert(key.to_string(), body);
        self.record_write();
        Ok(())
    }

    async fn put(&self, collection: &str, key: &str, body: Value) -> StoreResult<()> {
        self.ensure_open()?;
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), body);
        self.record_write();
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        let mut collections = self.collections.write().await;
        let removed = collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(key))
            .is_some();
        if removed {
            self.record_write();
        }
        Ok(removed)
    }

    async fn try_lock(&self, lock_key: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        Ok(self.locks.lock().await.insert(lock_key.to_string()))
    }

    async fn unlock(&self, lock_key: &str) -> StoreResult<()> {
        self.ensure_open()?;
        self.locks.lock().await.remove(lock_key);
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.locks.lock().await.clear();
        Ok(())
    }
}
