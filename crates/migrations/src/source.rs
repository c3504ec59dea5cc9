//! Migration Source - ordered enumeration of known migrations
//!
//! Migrations are registered explicitly in a [`Manifest`] rather than found by
//! scanning the filesystem; the manifest sorts them by name on every `list()`.

use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use crate::definitions::Migration;
use crate::error::{MigrationError, MigrationResult};

/// Enumerates all known migrations in deterministic order
pub trait MigrationSource: Send + Sync {
    /// Every definition, sorted in application order
    fn list(&self) -> MigrationResult<Vec<Arc<dyn Migration>>>;

    /// Look up a definition by name
    fn find(&self, name: &str) -> MigrationResult<Option<Arc<dyn Migration>>> {
        Ok(self.list()?.into_iter().find(|m| m.name() == name))
    }
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\d{3,}[_-][a-z0-9][a-z0-9_-]*$").expect("migration name pattern is valid")
    })
}

/// Check that a name has a zero-padded sequence prefix and a lowercase description
pub fn validate_name(name: &str) -> MigrationResult<()> {
    if name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(MigrationError::discovery(format!(
            "invalid migration name '{}': expected a zero-padded sequence and description, e.g. 001_add_portfolio_currency",
            name
        )))
    }
}

/// Statically registered list of migrations
#[derive(Default, Clone)]
pub struct Manifest {
    migrations: Vec<Arc<dyn Migration>>,
}

impl Manifest {
    /// Create an empty manifest
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a migration
    pub fn register<M: Migration + 'static>(mut self, migration: M) -> Self {
        self.migrations.push(Arc::new(migration));
        self
    }

    /// Register an already shared migration

    /// Number of registered migrations
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl MigrationSource for Manifest {
    fn list(&self) -> MigrationResult<Vec<Arc<dyn Migration>>> {
        let mut seen = HashSet::new();
        for migration in &self.migrations {
            validate_name(migration.name())?;
            if !seen.insert(migration.name()) {
                return Err(MigrationError::discovery(format!(
                    "migration '{}' is registered more than once",
                    migration.name()
                )));
            }
        }

        let mut migrations = self.migrations.clone();
        migrations.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(migrations)
    }
}

impl std::fmt::Debug for Manifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.migrations.iter().map(|m| m.name()))
            .finish()
    }
}
