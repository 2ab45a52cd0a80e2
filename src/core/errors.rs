//! Error types for the ensemble-and-decode pipeline.
//!
//! This module defines the errors that can occur while normalizing, aggregating,
//! deciding and encoding segmentation predictions, together with helper
//! constructors that attach image and channel context to them.

use thiserror::Error;

/// Enum representing the various errors that can occur in the pipeline.
///
/// Shape, parameter and encoding errors indicate a caller or configuration defect
/// and are never retried. Missing predictions are not errors at all; the
/// submission builder logs them and emits an empty run-length string instead.
#[derive(Error, Debug)]
pub enum SegError {
    /// A probability map or accumulation disagrees with the expected shape.
    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    Shape {
        /// Where the mismatch was detected (image identifier, channel index).
        context: String,
        /// The expected shape.
        expected: String,
        /// The shape that was actually received.
        actual: String,
    },

    /// Invalid decision parameters or run configuration.
    #[error("invalid parameter: {message}")]
    Parameter {
        /// A message describing the invalid parameter.
        message: String,
    },

    /// A mask could not be encoded, or a run-length string could not be decoded.
    #[error("encoding failed in {context}: {message}")]
    Encoding {
        /// Where the failure happened.
        context: String,
        /// A message describing the failure.
        message: String,
    },

    /// An image was accumulated over a different set of folds than configured.
    #[error("image '{image_id}' has predictions from {actual} fold(s), expected {expected}")]
    FoldCount {
        /// The image whose accumulation is incomplete.
        image_id: String,
        /// Number of configured folds.
        expected: usize,
        /// Number of folds actually accumulated.
        actual: usize,
    },

    /// Error reported by the external inference collaborator.
    #[error("inference")]
    Inference(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Error indicating invalid input.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// Error from tensor operations.
    #[error("tensor operation")]
    Tensor(#[from] ndarray::ShapeError),

    /// Error while serializing or deserializing artifacts.
    #[error("serialization")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),
}

/// Convenient result alias for pipeline operations.
pub type SegResult<T> = Result<T, SegError>;

impl SegError {
    /// Creates a shape error.
    ///
    /// # Arguments
    ///
    /// * `context` - Where the mismatch was detected.
    /// * `expected` - The expected shape.
    /// * `actual` - The received shape.
    pub fn shape(
        context: impl Into<String>,
        expected: impl std::fmt::Debug,
        actual: impl std::fmt::Debug,
    ) -> Self {
        Self::Shape {
            context: context.into(),
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }
    }

    /// Creates a parameter error.
    pub fn parameter(message: impl Into<String>) -> Self {
        Self::Parameter {
            message: message.into(),
        }
    }

    /// Creates an encoding error.
    ///
    /// # Arguments
    ///
    /// * `context` - Where the failure happened, e.g. `"image 'a.jpg' channel 2"`.
    /// * `message` - A message describing the failure.
    pub fn encoding(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Encoding {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Creates an error for inference failures reported by a collaborator.
    pub fn inference_error(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Inference(Box::new(error))
    }

    /// Creates an error for invalid input.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Prefixes the context of shape and encoding errors with an image identifier.
    ///
    /// Other variants are returned unchanged.
    pub fn for_image(self, image_id: &str) -> Self {
        match self {
            Self::Shape {
                context,
                expected,
                actual,
            } => Self::Shape {
                context: format!("image '{}' {}", image_id, context),
                expected,
                actual,
            },
            Self::Encoding { context, message } => Self::Encoding {
                context: format!("image '{}' {}", image_id, context),
                message,
            },
            other => other,
        }
    }

    /// Copies the error, keeping its variant and fields.
    ///
    /// Variants that wrap a source error are not `Clone`; they are copied as
    /// invalid-input errors carrying the rendered message.
    pub fn duplicate(&self) -> Self {
        match self {
            Self::Shape {
                context,
                expected,
                actual,
            } => Self::Shape {
                context: context.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            },
            Self::Parameter { message } => Self::parameter(message.clone()),
            Self::Encoding { context, message } => Self::encoding(context.clone(), message.clone()),
            Self::FoldCount {
                image_id,
                expected,
                actual,
            } => Self::FoldCount {
                image_id: image_id.clone(),
                expected: *expected,
                actual: *actual,
            },
            Self::InvalidInput { message } => Self::invalid_input(message.clone()),
            other => Self::invalid_input(format!("{}: {}", other, source_message(other))),
        }
    }

    /// Returns true for errors caused by configuration rather than by a single image.
    pub fn is_parameter_error(&self) -> bool {
        matches!(self, Self::Parameter { .. })
    }
}

fn source_message(error: &SegError) -> String {
    std::error::Error::source(error)
        .map(|source| source.to_string())
        .unwrap_or_default()
}

/// Implementation of From<crate::core::config::ConfigError> for SegError.
///
/// Configuration problems are always parameter errors.
impl From<crate::core::config::ConfigError> for SegError {
    fn from(error: crate::core::config::ConfigError) -> Self {
        Self::Parameter {
            message: error.to_string(),
        }
    }
}
