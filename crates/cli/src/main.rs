mod commands;
mod migrations;

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use folio_core::{init_logging, AppConfig, AppConfigTrait, LoggingConfig};
use folio_migrations::{connect, DataStore, MigrationConfig, Migrator};

use commands::migrate;

#[derive(Parser)]
#[command(name = "folio")]
#[command(version, about = "Data migrations for the folio portfolio store")]
struct Cli {
    /// Connection string, overrides DATABASE_URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations in order
    Migrate {
        /// Apply at most this many migrations
        #[arg(long)]
        steps: Option<usize>,
    },

    /// Revert one applied migration
    Rollback {
        /// Migration name, e.g. 002_rename_asset_ticker_to_symbol
        name: Option<String>,
    },

    /// Show applied and pending migrations
    Status,
}

async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    // Fail before connecting when the name is missing
    if let Commands::Rollback { name: None } = cli.command {
        anyhow::bail!("rollback requires a migration name");
    }

    tracing::info!(
        environment = %config.environment,
        database = %config.redacted_database_url(),
        "Connecting to data store"
    );
    let store = connect(&config.database_url).await?;

    execute(cli.command, store, &config, &mut std::io::stdout().lock()).await
}

/// Run one command against `store`, then close it whatever the outcome
async fn execute(
    command: Commands,
    store: Arc<dyn DataStore>,
    config: &AppConfig,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let migrator = Migrator::new(
        store.clone(),
        Arc::new(migrations::manifest()),
        MigrationConfig::default()
            .with_ledger_collection(config.migrations_collection.clone())
            .with_lock_timeout(Duration::from_secs(config.lock_timeout_secs)),
    );

    let outcome = match command {
        Commands::Migrate { steps } => migrate::run(&migrator, steps, out).await,
        Commands::Rollback { name: Some(name) } => migrate::rollback(&migrator, &name, out).await,
        Commands::Rollback { name: None } => {
            Err(anyhow::anyhow!("rollback requires a migration name"))
        }
        Commands::Status => migrate::status(&migrator, out).await,
    };
    let flushed = out.flush();

    if let Err(e) = store.close().await {
        tracing::warn!(error = %e, "Failed to close data store");
    }

    // The command's own error wins over a failed flush
    outcome?;
    flushed?;
    Ok(())
}

fn load_config(database_url: Option<String>) -> anyhow::Result<AppConfig> {
    let config = AppConfig::from_env()?;
    let Some(url) = database_url else {
        return Ok(config);
    };

    let config = config.with_database_url(url);
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let mut cli = Cli::parse();

    let config = match load_config(cli.database_url.take()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(LoggingConfig::from_app_config(&config)) {
        eprintln!("Error: failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    let mut sources: Vec<_> = config.config_sources().into_iter().collect();
    sources.sort_by(|a, b| a.0.cmp(&b.0));
    for (field, source) in sources {
        tracing::debug!(field = %field, source = %source, "Configuration value");
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(kind = migrate::error_kind(&e), error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_migrations::MemoryStore;

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::parse_from(["folio", "migrate", "--steps", "2"]);
        assert!(matches!(cli.command, Commands::Migrate { steps: Some(2) }));

        let cli = Cli::parse_from(["folio", "status", "--database-url", "memory://"]);
        assert_eq!(cli.database_url.as_deref(), Some("memory://"));
        assert!(matches!(cli.command, Commands::Status));

        let cli = Cli::parse_from(["folio", "rollback"]);
        assert!(matches!(cli.command, Commands::Rollback { name: None }));
    }

    #[tokio::test]
    async fn test_rollback_without_name_fails() {
        let cli = Cli::parse_from(["folio", "rollback"]);
        let err = run(cli, AppConfig::testing()).await.unwrap_err();
        assert!(err.to_string().contains("requires a migration name"));
    }

    /// Writer that fails like a closed pipe
    struct ClosedPipe {
        fail_writes: bool,
    }

    impl Write for ClosedPipe {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.fail_writes {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "write: broken pipe",
                ));
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "flush: broken pipe",
            ))
        }
    }

    #[tokio::test]
    async fn test_execute_migrates_and_closes_store() {
        let store = Arc::new(MemoryStore::new());

        let mut buf = Vec::new();
        execute(
            Commands::Migrate { steps: None },
            store.clone(),
            &AppConfig::testing(),
            &mut buf,
        )
        .await
        .unwrap();

        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Applied migration: 001_backfill_portfolio_currency"));
        assert!(text.contains("Applied migration: 003_normalize_transaction_types"));
        assert!(store.is_closed());
    }

    #[tokio::test]
    async fn test_execute_closes_store_when_output_fails() {
        let store = Arc::new(MemoryStore::new());
        let mut out = ClosedPipe { fail_writes: true };

        let err = execute(Commands::Status, store.clone(), &AppConfig::testing(), &mut out)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("write: broken pipe"));
        assert!(store.is_closed());
    }

    #[tokio::test]
    async fn test_execute_reports_flush_failure_after_success() {
        let store = Arc::new(MemoryStore::new());
        let mut out = ClosedPipe { fail_writes: false };

        let err = execute(Commands::Status, store.clone(), &AppConfig::testing(), &mut out)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("flush: broken pipe"));
        assert!(store.is_closed());
    }
}
