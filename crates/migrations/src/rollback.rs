//! Migration Rollback - reverts one applied migration by name
//!
//! The revert step runs first; the ledger entry is removed only once it has
//! succeeded, so a failed rollback leaves the migration recorded as applied
//! and can be retried.

use crate::error::{MigrationError, MigrationResult};
use crate::lock::MigrationLock;
use crate::runner::Migrator;

impl Migrator {
    /// Revert the named migration and remove it from the ledger
    ///
    /// # Errors
    ///
    /// - `NotFound` if no migration with this name is registered
    /// - `NoRevert` if the migration is one-way
    /// - `NotApplied` if the ledger has no entry for it
    /// - `RollbackFailed` if the revert step fails (the ledger is left untouched)
    /// - `LedgerWrite` if the entry cannot be removed after a successful revert
    pub async fn rollback(&self, name: &str) -> MigrationResult<()> {
        let migration = self
            .source()
            .find(name)?
            .ok_or_else(|| MigrationError::NotFound {
                name: name.to_string(),
            })?;

        if !migration.is_reversible() {
            return Err(MigrationError::NoRevert {
                name: name.to_string(),
            });
        }

        let work = async {
            if !self.ledger().applied_names().await?.contains(name) {
                return Err(MigrationError::NotApplied {
                    name: name.to_string(),
                });
            }

            tracing::info!(migration = %name, "Rolling back migration");
            if let Err(e) = migration.revert(self.store()).await {
                tracing::error!(migration = %name, error = %e, "Rollback failed");
                return Err(MigrationError::RollbackFailed {
                    name: name.to_string(),
                    cause: e.into(),
                });
            }

            self.ledger().remove_applied(name).await?;
            tracing::info!(migration = %name, "Rolled back migration");
            Ok::<(), MigrationError>(())
        };

        if self.config().use_lock {
            MigrationLock::run(
                self.store(),
                &self.config().lock_key,
                self.config().lock_timeout,
                work,
            )
            .await
        } else {
            work.await
        }
    }
}
