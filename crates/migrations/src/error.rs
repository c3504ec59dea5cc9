//! Error types for the migration engine

use crate::store::StoreError;
use thiserror::Error;

/// Boxed cause carried by failures raised from migration code
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Errors raised by the runner, rollback executor, ledger and source
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The migration source could not produce a valid, ordered list
    #[error("Migration discovery failed: {message}")]
    Discovery { message: String },

    /// Reading or writing the ledger failed
    #[error("Ledger write failed for '{name}': {source}")]
    LedgerWrite {
        name: String,
        #[source]
        source: StoreError,
    },

    /// Reading the ledger failed
    #[error("Ledger read failed: {0}")]
    LedgerRead(#[source] StoreError),

    /// A migration's apply step (or its ledger record) failed; `applied` holds
    /// the migrations this run applied before it
    #[error("Migration '{name}' failed after applying {applied:?}: {cause}")]
    MigrationFailed {
        name: String,
        applied: Vec<String>,
        #[source]
        cause: BoxError,
    },

    /// No migration with this name exists in the source
    #[error("Migration '{name}' not found")]
    NotFound { name: String },

    /// The migration has no revert step
    #[error("Migration '{name}' is one-way and cannot be rolled back")]
    NoRevert { name: String },

    /// The migration exists but is not recorded as applied
    #[error("Migration '{name}' is not applied")]
    NotApplied { name: String },

    /// The revert step failed; the ledger entry is left in place
    #[error("Rollback of migration '{name}' failed: {cause}")]
    RollbackFailed {
        name: String,
        #[source]
        cause: BoxError,
    },

    /// Another process holds the migration lock
    #[error(
        "Timed out after {timeout_secs}s waiting for migration lock '{key}'. \
         Another process may be running migrations."
    )]
    LockTimeout { key: String, timeout_secs: u64 },

    #[error("Data store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl MigrationError {
    /// Create a discovery error
    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery {
            message: message.into(),
        }
    }

    /// Names applied before the failure, for errors that carry partial progress
    pub fn applied_before_failure(&self) -> &[String] {
        match self {
            Self::MigrationFailed { applied, .. } => applied,
            _ => &[],
        }
    }
}

/// Data store unreachable or connection string unusable
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Unsupported connection string scheme '{scheme}' (expected postgres:// or memory://)")]
    UnsupportedScheme { scheme: String },

    #[error("Invalid connection string: {message}")]
    InvalidUrl { message: String },

    #[error("Failed to connect to data store: {message}")]
    Unreachable { message: String },
}
