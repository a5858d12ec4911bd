//! Error types for background removal operations

use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Boxed cause carried by stage failures
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Comprehensive error types for background removal operations
///
/// Every variant is terminal for the current job. Nothing is retried
/// internally; callers decide whether to retry, for example with a smaller
/// `max_dimensions`.
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Input bytes or decoded dimensions exceed the configured limits
    #[error("Input too large: {what} is {actual}, limit is {limit}")]
    InputTooLarge {
        what: &'static str,
        actual: u64,
        limit: u64,
    },

    /// Container format could not be identified or is not compiled in
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Image bytes were recognized but could not be decoded
    #[error("Decode failure: {0}")]
    DecodeFailure(#[source] image::ImageError),

    /// A pipeline stage failed; carries the stage name and the original cause
    #[error("Processing failed at stage '{stage}': {source}")]
    ProcessingFailure {
        stage: &'static str,
        #[source]
        source: BoxedCause,
    },

    /// Serializing the output buffer failed
    #[error("Encode failure: {0}")]
    EncodeFailure(#[source] image::ImageError),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The job was cancelled through its cancellation token
    #[error("Processing cancelled before stage '{stage}'")]
    Cancelled { stage: &'static str },

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BgRemovalError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new unsupported format error
    pub fn unsupported_format<S: Into<String>>(format: S) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Create an input-size violation
    #[must_use]
    pub fn input_too_large(what: &'static str, actual: u64, limit: u64) -> Self {
        Self::InputTooLarge {
            what,
            actual,
            limit,
        }
    }

    /// Wrap any error as a failure of the named stage
    pub fn stage<E>(stage: &'static str, cause: E) -> Self
    where
        E: Into<BoxedCause>,
    {
        Self::ProcessingFailure {
            stage,
            source: cause.into(),
        }
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &'static str, details: &str, input_info: Option<&str>) -> Self {
        let message = match input_info {
            Some(info) => format!("{details} (input: {info})"),
            None => details.to_string(),
        };
        Self::stage(stage, message)
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {rec}"),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {parameter}: {value} (valid range: {valid_range}).{recommendation}"
        ))
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {operation} '{path_display}': {error}"),
        ))
    }

    /// Name of the stage that failed, when the error carries one
    #[must_use]
    pub fn stage_name(&self) -> Option<&'static str> {
        match self {
            Self::ProcessingFailure { stage, .. } | Self::Cancelled { stage } => Some(stage),
            _ => None,
        }
    }
}
