//! Migration Definitions - Core types for the migration engine
//!
//! Defines the `Migration` trait implemented by every registered change, the
//! ledger entry persisted for each applied migration, and the configuration
//! and result types shared by the runner and rollback executor.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::store::DataStore;

/// A named, ordered unit of change to the persisted data
///
/// `name` is the sole key used to match a definition against the ledger and
/// determines ordering, so it must be sortable in creation order
/// (e.g. `007_add_portfolio_currency`).
#[async_trait]
pub trait Migration: Send + Sync {
    /// Unique, immutable migration name
    fn name(&self) -> &str;

    /// Apply the change. Runs at most once per name.
    async fn apply(&self, store: &dyn DataStore) -> anyhow::Result<()>;

    /// Whether this migration provides a [`Migration::revert`] step
    fn is_reversible(&self) -> bool {
        false
    }

    /// Undo what [`Migration::apply`] did
    async fn revert(&self, _store: &dyn DataStore) -> anyhow::Result<()> {
        anyhow::bail!("migration '{}' is one-way", self.name())
    }
}

/// Ledger record of a successfully applied migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Migration name
    pub name: String,
    /// When the migration was applied
    #[serde(rename = "appliedAt", alias = "applied_at")]
    pub applied_at: DateTime<Utc>,
    /// How long `apply` took, if recorded
    #[serde(
        rename = "durationMs",
        alias = "duration_ms",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub duration_ms: Option<i64>,
}

impl LedgerEntry {
    /// Entry stamped with the current time
    pub fn now(name: impl Into<String>, duration_ms: Option<i64>) -> Self {
        Self {
            name: name.into(),
            applied_at: Utc::now(),
            duration_ms,
        }
    }
}

/// Configuration for the migration engine
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Collection holding ledger entries
    pub ledger_collection: String,
    /// Advisory lock key guarding `migrate` and `rollback`
    pub lock_key: String,
    /// How long to wait for the advisory lock
    pub lock_timeout: Duration,
    /// Take the advisory lock around writes
    pub use_lock: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            ledger_collection: "migrations".to_string(),
            lock_key: "folio_migrations".to_string(),
            lock_timeout: Duration::from_secs(60),
            use_lock: true,
        }
    }
}

impl MigrationConfig {
    /// Use a different ledger collection
    pub fn with_ledger_collection(mut self, collection: impl Into<String>) -> Self {
        self.ledger_collection = collection.into();
        self
    }

    /// Wait at most `timeout` for the advisory lock
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Run without the advisory lock
    pub fn without_lock(mut self) -> Self {
        self.use_lock = false;
        self
    }
}

/// Result of running migrations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrateResult {
    /// Names applied by this run, in order
    pub applied: Vec<String>,
    /// Number of migrations that were already applied
    pub skipped: usize,
    /// Total execution time in milliseconds
    pub elapsed_ms: u128,
}

impl MigrateResult {
    /// Whether the run applied nothing
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    struct OneWay;

    #[async_trait]
    impl Migration for OneWay {
        fn name(&self) -> &str {
            "001_one_way"
        }

        async fn apply(&self, _store: &dyn DataStore) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_default_revert_is_refused() {
        let store = MemoryStore::new();
        assert!(!OneWay.is_reversible());

        let err = OneWay.revert(&store).await.unwrap_err();
        assert!(err.to_string().contains("001_one_way"));
    }

    #[test]
    fn test_ledger_entry_serialization() {
        let entry = LedgerEntry::now("001_one_way", None);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["name"], "001_one_way");
        assert!(json.get("appliedAt").is_some());
        assert!(json.get("durationMs").is_none());

        let back: LedgerEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_ledger_entry_reads_snake_case_fields() {
        let entry: LedgerEntry = serde_json::from_value(serde_json::json!({
            "name": "001_one_way",
            "applied_at": "2024-01-01T00:00:00Z",
            "duration_ms": 40,
        }))
        .unwrap();
        assert_eq!(entry.applied_at.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(entry.duration_ms, Some(40));
    }

    #[test]
    fn test_config_builders() {
        let config = MigrationConfig::default()
            .with_ledger_collection("schema_history")
            .with_lock_timeout(Duration::from_secs(5))
            .without_lock();
        assert_eq!(config.ledger_collection, "schema_history");
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
        assert!(!config.use_lock);
    }
}
