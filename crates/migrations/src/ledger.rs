//! Migration Ledger - durable record of applied migrations
//!
//! One document per applied migration, keyed by migration name. Every read
//! goes to the data store; nothing is cached between calls.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use crate::definitions::LedgerEntry;
use crate::error::{MigrationError, MigrationResult};
use crate::store::{DataStore, StoreError};

/// Ledger over a collection of the data store
pub struct Ledger<'a> {
    store: &'a dyn DataStore,
    collection: &'a str,
}

impl<'a> Ledger<'a> {
    /// Ledger stored in `collection`
    pub fn new(store: &'a dyn DataStore, collection: &'a str) -> Self {
        Self { store, collection }
    }

    /// Collection holding ledger entries
    pub fn collection(&self) -> &str {
        self.collection
    }

    /// Names of every applied migration
    pub async fn applied_names(&self) -> MigrationResult<HashSet<String>> {
        let documents = self
            .store
            .find_all(self.collection)
            .await
            .map_err(MigrationError::LedgerRead)?;
        Ok(documents.into_iter().map(|doc| doc.key).collect())
    }

    /// All ledger entries, sorted by name
    pub async fn entries(&self) -> MigrationResult<Vec<LedgerEntry>> {
        let documents = self
            .store
            .find_all(self.collection)
            .await
            .map_err(MigrationError::LedgerRead)?;

        documents
            .into_iter()
            .map(|doc| {
                serde_json::from_value(doc.body)
                    .map_err(|e| MigrationError::LedgerRead(StoreError::Serialization(e)))
            })
            .collect()
    }

    /// Applied names with their timestamps, sorted by name
    ///
    /// Membership comes from the document keys, as in [`Ledger::applied_names`].
    /// An entry whose body does not decode is still applied, with no timestamp.
    pub async fn applied_times(
        &self,
    ) -> MigrationResult<BTreeMap<String, Option<DateTime<Utc>>>> {
        let documents = self
            .store
            .find_all(self.collection)
            .await
            .map_err(MigrationError::LedgerRead)?;

        Ok(documents
            .into_iter()
            .map(|doc| {
                let applied_at = match serde_json::from_value::<LedgerEntry>(doc.body) {
                    Ok(entry) => Some(entry.applied_at),
                    Err(e) => {
                        tracing::warn!(migration = %doc.key, error = %e, "Unreadable ledger entry");
                        None
                    }
                };
                (doc.key, applied_at)
            })
            .collect())
    }

    /// Record a migration as applied now
    ///
    /// Recording the same name twice fails with a uniqueness violation.
    pub async fn record_applied(&self, name: &str) -> MigrationResult<()> {
        self.record(&LedgerEntry::now(name, None)).await
    }

    /// Record a prepared entry
    pub async fn record(&self, entry: &LedgerEntry) -> MigrationResult<()> {
        let ledger_write = |source: StoreError| MigrationError::LedgerWrite {
            name: entry.name.clone(),
            source,
        };

        let body = serde_json::to_value(entry).map_err(|e| ledger_write(e.into()))?;
        self.store
            .insert(self.collection, &entry.name, body)
            .await
            .map_err(ledger_write)?;

        tracing::debug!(migration = %entry.name, "Recorded migration in ledger");
        Ok(())
    }

    /// Remove a migration's entry; fails if it is not recorded
    pub async fn remove_applied(&self, name: &str) -> MigrationResult<()> {
        let removed = self
            .store
            .delete(self.collection, name)
            .await
            .map_err(|source| MigrationError::LedgerWrite {
                name: name.to_string(),
                source,
            })?;

        if !removed {
            return Err(MigrationError::LedgerWrite {
                name: name.to_string(),
                source: StoreError::Backend(format!(
                    "no ledger entry for '{}' in '{}'",
                    name, self.collection
                )),
            });
        }

        tracing::debug!(migration = %name, "Removed migration from ledger");
        Ok(())
    }
}
