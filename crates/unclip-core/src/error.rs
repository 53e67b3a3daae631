//! Error types for unclip.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for unclip operations.
pub type Result<T> = std::result::Result<T, UnclipError>;

/// Main error type for unclip operations.
#[derive(Error, Debug)]
pub enum UnclipError {
    /// Configuration errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record table loading errors (missing file, bad format, missing column).
    #[error("Table error: {0}")]
    Table(String),

    /// Tokenizer errors.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// HuggingFace Hub errors.
    #[error("Hub error: {0}")]
    Hub(String),

    /// An image could not be opened or decoded.
    #[error("Failed to decode image {}: {message}", path.display())]
    ImageDecode {
        /// Path of the offending image.
        path: PathBuf,
        /// Underlying decoder message.
        message: String,
    },

    /// Sample index past the end of the dataset.
    #[error("Index {index} out of range for dataset of length {len}")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Dataset length.
        len: usize,
    },

    /// Tensor shape mismatch.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape.
        actual: Vec<usize>,
    },

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl UnclipError {
    /// Whether this error was raised while decoding a single sample's image.
    pub fn is_image_decode(&self) -> bool {
        matches!(self, UnclipError::ImageDecode { .. })
    }
}
