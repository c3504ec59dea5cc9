use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration validation failed: {message}")]
    ValidationFailed { message: String },
}

impl ConfigError {
    /// Create a missing required field error
    pub fn missing_required(field: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingRequired {
            field: field.into(),
            hint: hint.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    /// Create a validation failed error
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }
}

/// Trait for validating configuration values
pub trait ConfigValidator<T: ?Sized> {
    /// Validate a configuration value
    fn validate(&self, value: &T) -> Result<(), ConfigError>;
}

/// Connection-string validator
pub struct UrlValidator {
    pub field: &'static str,
    pub schemes: Vec<String>,
}

impl UrlValidator {
    /// Validator for data store connection strings
    pub fn database_url() -> Self {
        Self {
            field: "database_url",
            schemes: vec![
                "postgres".to_string(),
                "postgresql".to_string(),
                "memory".to_string(),
            ],
        }
    }
}

impl ConfigValidator<str> for UrlValidator {
    fn validate(&self, value: &str) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::invalid_value(self.field, value, "non-empty URL"));
        }

        let has_valid_scheme = self
            .schemes
            .iter()
            .any(|scheme| value.starts_with(&format!("{}://", scheme)));

        if !has_valid_scheme {
            return Err(ConfigError::invalid_value(
                self.field,
                value,
                format!("URL with scheme: {}", self.schemes.join(", ")),
            ));
        }

        Ok(())
    }
}

/// Numeric range validator
pub struct RangeValidator {
    pub field: &'static str,
    pub min: u64,
    pub max: u64,
}

impl ConfigValidator<u64> for RangeValidator {
    fn validate(&self, value: &u64) -> Result<(), ConfigError> {
        if *value < self.min || *value > self.max {
            return Err(ConfigError::invalid_value(
                self.field,
                value.to_string(),
                format!("value between {} and {}", self.min, self.max),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_url_schemes() {
        let validator = UrlValidator::database_url();
        assert!(validator.validate("postgres://localhost:5432/folio").is_ok());
        assert!(validator.validate("postgresql://user@db/folio").is_ok());
        assert!(validator.validate("memory://").is_ok());

        let err = validator.validate("mysql://localhost/folio").unwrap_err();
        assert!(err.to_string().contains("database_url"));
        assert!(validator.validate("   ").is_err());
    }

    #[test]
    fn test_range_validator() {
        let validator = RangeValidator {
            field: "lock_timeout_secs",
            min: 1,
            max: 3600,
        };
        assert!(validator.validate(&60).is_ok());
        assert!(validator.validate(&0).is_err());
        assert!(validator.validate(&3601).is_err());
    }
}
