//! Migration Runner - applies pending migrations in order
//!
//! Pending migrations are applied one at a time in source order. Each success
//! is recorded in the ledger before the next migration starts; the first
//! failure stops the run and keeps what was applied before it, so running
//! `migrate` again resumes at the failed migration.

use std::sync::Arc;
use std::time::Instant;

use crate::definitions::{LedgerEntry, MigrateResult, Migration, MigrationConfig};
use crate::error::{MigrationError, MigrationResult};
use crate::ledger::Ledger;
use crate::lock::MigrationLock;
use crate::source::MigrationSource;
use crate::store::DataStore;

/// Pending migrations in source order, plus the number already applied
pub(crate) struct Plan {
    pub(crate) pending: Vec<Arc<dyn Migration>>,
    pub(crate) skipped: usize,
}

/// Migration engine over one data store handle and one source
pub struct Migrator {
    store: Arc<dyn DataStore>,
    source: Arc<dyn MigrationSource>,
    config: MigrationConfig,
}

impl Migrator {
    /// Create a migrator
    pub fn new(
        store: Arc<dyn DataStore>,
        source: Arc<dyn MigrationSource>,
        config: MigrationConfig,
    ) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    /// Get the data store
    pub fn store(&self) -> &dyn DataStore {
        self.store.as_ref()
    }

    /// Get the migration source
    pub fn source(&self) -> &dyn MigrationSource {
        self.source.as_ref()
    }

    /// Get the configuration
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Ledger over the configured collection
    pub fn ledger(&self) -> Ledger<'_> {
        Ledger::new(self.store.as_ref(), &self.config.ledger_collection)
    }

    /// Names of migrations not yet applied, in source order
    pub async fn pending(&self) -> MigrationResult<Vec<String>> {
        let plan = self.plan().await?;
        Ok(plan
            .pending
            .iter()
            .map(|m| m.name().to_string())
            .collect())
    }

    /// Apply every pending migration
    pub async fn migrate(&self) -> MigrationResult<MigrateResult> {
        self.run_pending(None).await
    }

    /// Apply at most `steps` pending migrations
    pub async fn migrate_steps(&self, steps: usize) -> MigrationResult<MigrateResult> {
        self.run_pending(Some(steps)).await
    }

    async fn run_pending(&self, steps: Option<usize>) -> MigrationResult<MigrateResult> {
        let start = Instant::now();

        // Checked without the lock first so an up-to-date store sees no writes
        let plan = self.plan().await?;
        if plan.pending.is_empty() {
            tracing::info!(skipped = plan.skipped, "No pending migrations");
            return Ok(MigrateResult {
                applied: Vec::new(),
                skipped: plan.skipped,
                elapsed_ms: start.elapsed().as_millis(),
            });
        }

        if !self.config.use_lock {
            return self.apply_plan(plan, steps, start).await;
        }

        MigrationLock::run(
            self.store.as_ref(),
            &self.config.lock_key,
            self.config.lock_timeout,
            async {
                // Another process may have applied some while we waited
                let plan = self.plan().await?;
                self.apply_plan(plan, steps, start).await
            },
        )
        .await
    }

    pub(crate) async fn plan(&self) -> MigrationResult<Plan> {
        let all = self.source.list()?;
        let applied = self.ledger().applied_names().await?;

        let (done, pending): (Vec<_>, Vec<_>) = all
            .into_iter()
            .partition(|m| applied.contains(m.name()));

        Ok(Plan {
            pending,
            skipped: done.len(),
        })
    }

    async fn apply_plan(
        &self,
        plan: Plan,
        steps: Option<usize>,
        start: Instant,
    ) -> MigrationResult<MigrateResult> {
        let ledger = self.ledger();
        let mut applied = Vec::new();

        for migration in plan.pending.iter().take(steps.unwrap_or(usize::MAX)) {
            let name = migration.name().to_string();
            tracing::info!(migration = %name, "Applying migration");
            let started = Instant::now();

            if let Err(e) = migration.apply(self.store.as_ref()).await {
                tracing::error!(migration = %name, error = %e, applied = ?applied, "Migration failed");
                return Err(MigrationError::MigrationFailed {
                    name,
                    applied,
                    cause: e.into(),
                });
            }

            let duration_ms = i64::try_from(started.elapsed().as_millis()).ok();
            if let Err(e) = ledger.record(&LedgerEntry::now(&name, duration_ms)).await {
                tracing::error!(migration = %name, error = %e, "Applied migration could not be recorded");
                return Err(MigrationError::MigrationFailed {
                    name,
                    applied,
                    cause: Box::new(e),
                });
            }

            tracing::info!(migration = %name, duration_ms = ?duration_ms, "Applied migration");
            applied.push(name);
        }

        Ok(MigrateResult {
            applied,
            skipped: plan.skipped,
            elapsed_ms: start.elapsed().as_millis(),
        })
    }
}
