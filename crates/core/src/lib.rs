pub mod config;
pub mod logging;

pub use config::validation::ConfigError;
pub use config::{AppConfig, AppConfigTrait, ConfigSource, Environment};
pub use logging::{init_logging, LoggingConfig};
