//! Configuration error types and validation traits.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Error indicating that no fold was selected.
    #[error("fold list must not be empty")]
    EmptyFoldList,

    /// Error indicating that the same fold was selected twice.
    #[error("fold {fold} is listed more than once")]
    DuplicateFold { fold: u32 },

    /// Error indicating that a per-class table disagrees with the class list.
    #[error("{table} has {actual} entries but there are {expected} classes")]
    ClassCountMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    /// Error indicating that a configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Error indicating that a delimited value could not be parsed.
    #[error("cannot parse {field} from '{value}': {reason}")]
    Parse {
        field: String,
        value: String,
        reason: String,
    },
}

/// A trait for validating configuration parameters.
///
/// Implementors provide [`validate`](ConfigValidator::validate) and
/// [`get_defaults`](ConfigValidator::get_defaults); the remaining methods are
/// shared range checks.
pub trait ConfigValidator {
    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError>;

    /// Returns the default configuration.
    fn get_defaults() -> Self
    where
        Self: Sized;

    /// Validates a probability threshold.
    ///
    /// # Arguments
    ///
    /// * `threshold` - The threshold to validate.
    /// * `field_name` - The name of the field being validated.
    fn validate_probability(&self, threshold: f32, field_name: &str) -> Result<(), ConfigError> {
        self.validate_f32_range(threshold, 0.0, 1.0, field_name)
    }

    /// Validates a float value is within a specified range.
    ///
    /// NaN is always rejected.
    ///
    /// # Arguments
    ///
    /// * `value` - The value to validate.
    /// * `min` - The minimum allowed value (inclusive).
    /// * `max` - The maximum allowed value (inclusive).
    /// * `field_name` - The name of the field being validated.
    fn validate_f32_range(
        &self,
        value: f32,
        min: f32,
        max: f32,
        field_name: &str,
    ) -> Result<(), ConfigError> {
        if !(min..=max).contains(&value) {
            Err(ConfigError::InvalidConfig {
                message: format!(
                    "{} must be between {} and {}, got {}",
                    field_name, min, max, value
                ),
            })
        } else {
            Ok(())
        }
    }

    /// Validates a usize value is positive.
    fn validate_positive_usize(&self, value: usize, field_name: &str) -> Result<(), ConfigError> {
        if value == 0 {
            Err(ConfigError::InvalidConfig {
                message: format!("{} must be greater than 0, got {}", field_name, value),
            })
        } else {
            Ok(())
        }
    }

    /// Validates that a per-class table has one entry per class.
    fn validate_class_table(
        &self,
        actual: usize,
        expected: usize,
        table: &str,
    ) -> Result<(), ConfigError> {
        if actual != expected {
            Err(ConfigError::ClassCountMismatch {
                table: table.to_string(),
                expected,
                actual,
            })
        } else {
            Ok(())
        }
    }
}

/// Extension trait for ConfigValidator that wraps validation errors.
pub trait ConfigValidatorExt: ConfigValidator {
    /// Validates configuration and converts any error into a parameter error.
    ///
    /// Returns the configuration itself on success so it can be chained after a
    /// builder.
    fn validated(self) -> Result<Self, crate::core::errors::SegError>
    where
        Self: Sized,
    {
        self.validate()?;
        Ok(self)
    }
}

// Blanket implementation for all ConfigValidator types
impl<T: ConfigValidator> ConfigValidatorExt for T {}
