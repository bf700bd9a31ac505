//! # Error Types
//!
//! Custom error types for the payload controller using `thiserror`.

use thiserror::Error;

/// Main error type for the payload controller
#[derive(Debug, Error)]
pub enum PayloadError {
    /// Bus or serial device failure
    #[error("Device I/O error: {0}")]
    DeviceIo(String),

    /// Malformed sentence, file or field
    #[error("Parse error: {0}")]
    Parse(String),

    /// Bad or partial calibration read
    #[error("Calibration error: {0}")]
    Calibration(String),

    /// Failure inside a cadence action of the scheduler
    #[error("{stage} stage failed: {message}")]
    Stage {
        stage: &'static str,
        message: String,
    },

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PayloadError {
    /// Wrap any error as the failure of a named scheduler stage.
    pub fn stage(stage: &'static str, err: impl std::fmt::Display) -> Self {
        PayloadError::Stage {
            stage,
            message: err.to_string(),
        }
    }
}

/// Result type alias for the payload controller
pub type Result<T> = std::result::Result<T, PayloadError>;
