//! Migration status reporting

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::error::MigrationResult;
use crate::runner::Migrator;

/// Status of one registered migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    pub name: String,
    pub applied: bool,
    /// When it was applied, if it has been
    pub applied_at: Option<DateTime<Utc>>,
}

/// Applied/pending state of every registered migration
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    /// One row per registered migration, in source order
    pub rows: Vec<StatusRow>,
    /// Ledger entries whose migration is no longer registered
    pub unknown_applied: Vec<String>,
}

impl StatusReport {
    /// Number of applied migrations
    pub fn applied_count(&self) -> usize {
        self.rows.iter().filter(|r| r.applied).count()
    }

    /// Number of pending migrations
    pub fn pending_count(&self) -> usize {
        self.rows.len() - self.applied_count()
    }

    /// Check if all migrations are applied
    pub fn is_up_to_date(&self) -> bool {
        self.pending_count() == 0
    }

    /// Names of pending migrations, in source order
    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().filter(|r| !r.applied).map(|r| r.name.as_str())
    }
}

impl Migrator {
    /// Cross-reference the source and the ledger. Read only.
    pub async fn status(&self) -> MigrationResult<StatusReport> {
        let all = self.source().list()?;
        let applied = self.ledger().applied_times().await?;

        let rows: Vec<StatusRow> = all
            .iter()
            .map(|m| StatusRow {
                name: m.name().to_string(),
                applied: applied.contains_key(m.name()),
                applied_at: applied.get(m.name()).copied().flatten(),
            })
            .collect();

        let known: HashSet<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        let unknown_applied = applied
            .keys()
            .filter(|name| !known.contains(name.as_str()))
            .cloned()
            .collect();

        Ok(StatusReport {
            rows,
            unknown_applied,
        })
    }
}
