//! # Structured Logging
//!
//! `tracing` bootstrap for the folio binaries. Output goes to stderr so that
//! command output on stdout (migration tables, applied names) stays clean.

use crate::config::{AppConfig, Environment};
use std::io;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "warn")
    pub level: String,
    /// Enable JSON structured logging (vs plain text)
    pub json_format: bool,
    /// Include the event target in each line
    pub include_target: bool,
    /// Environment filter (supports directives like "folio_migrations=debug,sqlx=warn")
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_target: false,
            env_filter: None,
        }
    }
}

impl LoggingConfig {
    /// Create production logging configuration
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            json_format: true,
            include_target: true,
            env_filter: Some("folio=info,folio_migrations=info,sqlx=warn".to_string()),
        }
    }

    /// Create development logging configuration
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            json_format: false,
            include_target: true,
            env_filter: Some("folio=debug,folio_migrations=debug,sqlx=warn".to_string()),
        }
    }

    /// Create test logging configuration (minimal output)
    pub fn test() -> Self {
        Self {
            level: "error".to_string(),
            json_format: false,
            include_target: false,
            env_filter: Some("folio_migrations=error".to_string()),
        }
    }

    /// Derive logging settings from the application configuration
    pub fn from_app_config(config: &AppConfig) -> Self {
        let base = match config.environment {
            Environment::Production => Self::production(),
            Environment::Testing => Self::test(),
            Environment::Development => Self::development(),
        };
        base.with_level(&config.log_level)
    }

    /// Set the level; drops the per-crate filter so the level applies everywhere
    pub fn with_level(mut self, level: &str) -> Self {
        if self.level != level {
            self.level = level.to_string();
            self.env_filter = None;
        }
        self
    }

    /// Filter directive that `init_logging` falls back to when `RUST_LOG` is unset
    pub fn filter_directive(&self) -> &str {
        self.env_filter.as_deref().unwrap_or(&self.level)
    }
}

/// Initialize structured logging for the process
pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter_directive()))?;

    if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                Layer::new()
                    .with_writer(io::stderr)
                    .with_target(config.include_target)
                    .json(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                Layer::new()
                    .with_writer(io::stderr)
                    .with_target(config.include_target),
            )
            .try_init()?;
    }

    tracing::debug!(
        target: "folio::logging",
        "Structured logging initialized (level: {}, format: {})",
        config.level,
        if config.json_format { "JSON" } else { "text" }
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_follows_environment() {
        let mut app = AppConfig::new();
        app.environment = Environment::Production;
        app.log_level = "info".to_string();

        let logging = LoggingConfig::from_app_config(&app);
        assert!(logging.json_format);
        assert_eq!(
            logging.filter_directive(),
            "folio=info,folio_migrations=info,sqlx=warn"
        );
    }

    #[test]
    fn test_explicit_level_overrides_filter() {
        let logging = LoggingConfig::development().with_level("trace");
        assert_eq!(logging.filter_directive(), "trace");

        let logging = LoggingConfig::development().with_level("debug");
        assert!(logging.filter_directive().contains("folio_migrations=debug"));
    }
}
