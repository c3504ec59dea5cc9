use crate::config::{ConfigError, ConfigSource, ConfigValidator, RangeValidator, UrlValidator};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

/// Connection string used when `DATABASE_URL` is unset
pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost:5432/folio";

/// Ledger collection used when `MIGRATIONS_COLLECTION` is unset
pub const DEFAULT_MIGRATIONS_COLLECTION: &str = "migrations";

/// Seconds to wait for the migration lock when `MIGRATION_LOCK_TIMEOUT_SECS` is unset
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 60;

/// Configuration trait for application configuration
pub trait AppConfigTrait: Sized {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self, ConfigError>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError>;

    /// Get configuration source information for debugging
    fn config_sources(&self) -> HashMap<String, ConfigSource>;
}

/// Environment enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue {
                field: "environment".to_string(),
                value: s.to_string(),
                expected: "development, testing, or production".to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env_str = match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Production => "production",
        };
        write!(f, "{}", env_str)
    }
}

impl Environment {
    /// Check if environment is production
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Default log level for the environment
    pub fn default_log_level(&self) -> &'static str {
        match self {
            Environment::Development => "debug",
            Environment::Testing => "warn",
            Environment::Production => "info",
        }
    }
}

/// Runtime configuration for the folio tooling
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub database_url: String,
    pub log_level: String,
    pub migrations_collection: String,
    pub lock_timeout_secs: u64,
    database_url_overridden: bool,
}

impl AppConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self {
            environment: Environment::Development,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            log_level: Environment::Development.default_log_level().to_string(),
            migrations_collection: DEFAULT_MIGRATIONS_COLLECTION.to_string(),
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
            database_url_overridden: false,
        }
    }

    /// Create configuration for testing
    pub fn testing() -> Self {
        Self {
            environment: Environment::Testing,
            database_url: "memory://".to_string(),
            log_level: Environment::Testing.default_log_level().to_string(),
            ..Self::new()
        }
    }

    /// Replace the connection string, e.g. from a `--database-url` flag
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self.database_url_overridden = true;
        self
    }

    /// Connection string with any password masked, safe for logs
    pub fn redacted_database_url(&self) -> String {
        redact_url(&self.database_url)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AppConfigTrait for AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new();

        if let Ok(env_str) = env::var("FOLIO_ENV") {
            config.environment = env_str.parse()?;
        }
        config.log_level = config.environment.default_log_level().to_string();

        if let Ok(url) = env::var("DATABASE_URL") {
            config.database_url = url;
        }

        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.log_level = log_level.to_lowercase();
        }

        if let Ok(collection) = env::var("MIGRATIONS_COLLECTION") {
            config.migrations_collection = collection;
        }

        if let Ok(timeout_str) = env::var("MIGRATION_LOCK_TIMEOUT_SECS") {
            config.lock_timeout_secs =
                timeout_str.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "lock_timeout_secs".to_string(),
                    value: timeout_str,
                    expected: "whole number of seconds".to_string(),
                })?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        UrlValidator::database_url().validate(self.database_url.as_str())?;

        RangeValidator {
            field: "lock_timeout_secs",
            min: 1,
            max: 3600,
        }
        .validate(&self.lock_timeout_secs)?;

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "log_level".to_string(),
                value: self.log_level.clone(),
                expected: format!("one of: {}", valid_levels.join(", ")),
            });
        }

        if self.migrations_collection.trim().is_empty() {
            return Err(ConfigError::missing_required(
                "migrations_collection",
                "MIGRATIONS_COLLECTION must name a collection when set",
            ));
        }

        if self.environment.is_production() && self.database_url.starts_with("memory://") {
            return Err(ConfigError::validation_failed(
                "the in-memory store cannot be used in production",
            ));
        }

        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = HashMap::new();

        sources.insert("environment".to_string(), env_source("FOLIO_ENV", "development"));

        sources.insert(
            "database_url".to_string(),
            if self.database_url_overridden {
                ConfigSource::Programmatic
            } else {
                env_source("DATABASE_URL", DEFAULT_DATABASE_URL)
            },
        );

        sources.insert(
            "log_level".to_string(),
            env_source("LOG_LEVEL", self.environment.default_log_level()),
        );

        sources.insert(
            "migrations_collection".to_string(),
            env_source("MIGRATIONS_COLLECTION", DEFAULT_MIGRATIONS_COLLECTION),
        );

        sources.insert(
            "lock_timeout_secs".to_string(),
            env_source("MIGRATION_LOCK_TIMEOUT_SECS", "60"),
        );

        sources
    }
}

fn env_source(var: &str, default: &str) -> ConfigSource {
    if env::var(var).is_ok() {
        ConfigSource::EnvVar(var.to_string())
    } else {
        ConfigSource::Default(default.to_string())
    }
}

fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.split_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{}://{}:****@{}", scheme, user, host),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 5] = [
        "FOLIO_ENV",
        "DATABASE_URL",
        "LOG_LEVEL",
        "MIGRATIONS_COLLECTION",
        "MIGRATION_LOCK_TIMEOUT_SECS",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_when_env_unset() {
        clear_env();
        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.migrations_collection, "migrations");
        assert_eq!(config.lock_timeout_secs, 60);
        assert_eq!(config.log_level, "debug");
        assert!(matches!(
            config.config_sources()["database_url"],
            ConfigSource::Default(_)
        ));
    }

    #[test]
    #[serial]
    fn test_reads_environment() {
        clear_env();
        env::set_var("FOLIO_ENV", "production");
        env::set_var("DATABASE_URL", "postgres://app:secret@db:5432/folio");
        env::set_var("MIGRATION_LOCK_TIMEOUT_SECS", "15");

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.lock_timeout_secs, 15);
        assert_eq!(
            config.redacted_database_url(),
            "postgres://app:****@db:5432/folio"
        );
        assert_eq!(
            config.config_sources()["database_url"],
            ConfigSource::EnvVar("DATABASE_URL".to_string())
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_lock_timeout() {
        clear_env();
        env::set_var("MIGRATION_LOCK_TIMEOUT_SECS", "soon");
        let err = AppConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "lock_timeout_secs"));

        env::set_var("MIGRATION_LOCK_TIMEOUT_SECS", "0");
        assert!(AppConfig::from_env().is_err());
        clear_env();
    }

    #[test]
    fn test_memory_store_rejected_in_production() {
        let mut config = AppConfig::testing();
        assert!(config.validate().is_ok());
        config.environment = Environment::Production;
        config.log_level = "info".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_override_marks_programmatic_source() {
        let config = AppConfig::new().with_database_url("memory://");
        assert_eq!(config.database_url, "memory://");
        assert_eq!(
            config.config_sources()["database_url"],
            ConfigSource::Programmatic
        );
    }

    #[test]
    fn test_redaction_leaves_passwordless_urls() {
        assert_eq!(redact_url("memory://"), "memory://");
        assert_eq!(
            redact_url("postgres://localhost:5432/folio"),
            "postgres://localhost:5432/folio"
        );
        assert_eq!(redact_url("postgres://app@db/folio"), "postgres://app@db/folio");
    }
}
