//! `migrate`, `rollback` and `status` command handlers
//!
//! Handlers print to the writer they are given and return the engine error
//! unchanged; `main` turns errors into the exit code.

use std::io::Write;

use folio_migrations::{MigrationError, Migrator};

pub async fn run(migrator: &Migrator, steps: Option<usize>, out: &mut impl Write) -> anyhow::Result<()> {
    let result = match steps {
        Some(steps) => migrator.migrate_steps(steps).await,
        None => migrator.migrate().await,
    };

    let result = match result {
        Ok(result) => result,
        Err(err) => {
            let applied = err.applied_before_failure();
            if !applied.is_empty() {
                writeln!(out, "Applied before failure:")?;
                for name in applied {
                    writeln!(out, "  {}", name)?;
                }
            }
            return Err(err.into());
        }
    };

    if result.is_noop() {
        writeln!(out, "Nothing to migrate ({} already applied)", result.skipped)?;
        return Ok(());
    }

    for name in &result.applied {
        writeln!(out, "Applied migration: {}", name)?;
    }
    writeln!(
        out,
        "Applied {} migration(s) in {}ms",
        result.applied.len(),
        result.elapsed_ms
    )?;
    Ok(())
}

pub async fn rollback(migrator: &Migrator, name: &str, out: &mut impl Write) -> anyhow::Result<()> {
    migrator.rollback(name).await?;
    writeln!(out, "Rolled back migration: {}", name)?;
    Ok(())
}

pub async fn status(migrator: &Migrator, out: &mut impl Write) -> anyhow::Result<()> {
    let report = migrator.status().await?;

    writeln!(out, "Migration Status:")?;
    writeln!(out, "================")?;

    if report.rows.is_empty() {
        writeln!(out, "No migrations registered")?;
        return Ok(());
    }

    let width = report.rows.iter().map(|r| r.name.len()).max().unwrap_or(0);
    for row in &report.rows {
        let state = if row.applied { "Applied" } else { "Pending" };
        match row.applied_at {
            Some(at) => writeln!(
                out,
                "  {:<width$}  {:<7}  {}",
                row.name,
                state,
                at.format("%Y-%m-%d %H:%M:%S UTC"),
                width = width
            )?,
            None => writeln!(out, "  {:<width$}  {}", row.name, state, width = width)?,
        }
    }

    writeln!(
        out,
        "\n{} applied, {} pending",
        report.applied_count(),
        report.pending_count()
    )?;

    if !report.unknown_applied.is_empty() {
        writeln!(out, "\nApplied but no longer registered:")?;
        for name in &report.unknown_applied {
            writeln!(out, "  {}", name)?;
        }
    }

    Ok(())
}

/// Short label for the error kind, used in logs
pub fn error_kind(err: &anyhow::Error) -> &'static str {
    match err.downcast_ref::<MigrationError>() {
        Some(MigrationError::Discovery { .. }) => "discovery",
        Some(MigrationError::MigrationFailed { .. }) => "migration_failed",
        Some(MigrationError::NotFound { .. }) => "not_found",
        Some(MigrationError::NoRevert { .. }) => "no_revert",
        Some(MigrationError::NotApplied { .. }) => "not_applied",
        Some(MigrationError::RollbackFailed { .. }) => "rollback_failed",
        Some(MigrationError::LockTimeout { .. }) => "lock_timeout",
        Some(MigrationError::Connection(_)) => "connection",
        Some(_) => "store",
        None => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use folio_migrations::{DataStore, Manifest, MemoryStore, Migration, MigrationConfig};
    use std::sync::Arc;

    struct Step {
        name: &'static str,
        fails: bool,
    }

    #[async_trait]
    impl Migration for Step {
        fn name(&self) -> &str {
            self.name
        }

        async fn apply(&self, _store: &dyn DataStore) -> anyhow::Result<()> {
            if self.fails {
                anyhow::bail!("holdings table is locked");
            }
            Ok(())
        }

        fn is_reversible(&self) -> bool {
            true
        }

        async fn revert(&self, _store: &dyn DataStore) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn migrator(steps: Vec<Step>) -> Migrator {
        let manifest = steps.into_iter().fold(Manifest::new(), Manifest::register);
        Migrator::new(
            Arc::new(MemoryStore::new()),
            Arc::new(manifest),
            MigrationConfig::default(),
        )
    }

    fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn test_run_prints_applied() {
        let migrator = migrator(vec![
            Step { name: "001_a", fails: false },
            Step { name: "002_b", fails: false },
        ]);

        let mut buf = Vec::new();
        run(&migrator, None, &mut buf).await.unwrap();
        let text = output(buf);
        assert!(text.contains("Applied migration: 001_a\nApplied migration: 002_b\n"));

        let mut buf = Vec::new();
        run(&migrator, None, &mut buf).await.unwrap();
        assert!(output(buf).starts_with("Nothing to migrate (2 already applied)"));
    }

    #[tokio::test]
    async fn test_run_failure_lists_prior_progress() {
        let migrator = migrator(vec![
            Step { name: "001_a", fails: false },
            Step { name: "002_b", fails: true },
        ]);

        let mut buf = Vec::new();
        let err = run(&migrator, None, &mut buf).await.unwrap_err();
        assert_eq!(error_kind(&err), "migration_failed");
        assert!(err.to_string().contains("002_b"));
        assert_eq!(output(buf), "Applied before failure:\n  001_a\n");
    }

    #[tokio::test]
    async fn test_status_table() {
        let migrator = migrator(vec![
            Step { name: "001_a", fails: false },
            Step { name: "002_b", fails: false },
        ]);
        migrator.migrate_steps(1).await.unwrap();

        let mut buf = Vec::new();
        status(&migrator, &mut buf).await.unwrap();
        let text = output(buf);
        assert!(text.contains("001_a  Applied"));
        assert!(text.contains("002_b  Pending"));
        assert!(text.contains("1 applied, 1 pending"));
    }

    #[tokio::test]
    async fn test_rollback_unknown_name() {
        let migrator = migrator(vec![Step { name: "001_a", fails: false }]);

        let mut buf = Vec::new();
        let err = rollback(&migrator, "404_missing", &mut buf).await.unwrap_err();
        assert_eq!(error_kind(&err), "not_found");
        assert!(buf.is_empty());
    }
}
