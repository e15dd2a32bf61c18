//! Error types for the Xiphos library.
//!
//! All fallible operations return [`Result`], whose error type is the
//! [`XiphosError`] enum.
//!
//! # Examples
//!
//! ```
//! use xiphos::error::{XiphosError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(XiphosError::validation("features and labels differ in length"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Xiphos operations.
#[derive(Error, Debug)]
pub enum XiphosError {
    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The search service was used before a model bundle was published.
    #[error("Search service not initialized: {0}")]
    NotInitialized(String),

    /// Malformed training data or arguments.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A model failed while training.
    #[error("Model training failed: {0}")]
    ModelTraining(String),

    /// A model exceeded its training budget.
    #[error("Model training timed out: {0}")]
    ModelTimeout(String),

    /// Model bundle storage errors.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Invalid operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Binary (de)serialization of model bundles.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with XiphosError.
pub type Result<T> = std::result::Result<T, XiphosError>;

impl XiphosError {
    /// Create a new not-initialized error.
    pub fn not_initialized<S: Into<String>>(msg: S) -> Self {
        XiphosError::NotInitialized(msg.into())
    }

    /// Create a new validation error.
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        XiphosError::Validation(msg.into())
    }

    /// Create a new model training error.
    pub fn model_training<S: Into<String>>(msg: S) -> Self {
        XiphosError::ModelTraining(msg.into())
    }

    /// Create a new model timeout error.
    pub fn model_timeout<S: Into<String>>(msg: S) -> Self {
        XiphosError::ModelTimeout(msg.into())
    }

    /// Create a new persistence error.
    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        XiphosError::Persistence(msg.into())
    }

    /// Create a new invalid operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        XiphosError::InvalidOperation(msg.into())
    }

    /// Create a new serialization error.
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        XiphosError::Serialization(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        XiphosError::Other(msg.into())
    }

    /// Create a new invalid config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        XiphosError::Validation(format!("Invalid configuration: {}", msg.into()))
    }

    /// Create a new internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        XiphosError::Other(format!("Internal error: {}", msg.into()))
    }

    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        XiphosError::Persistence(format!("Not found: {}", msg.into()))
    }
}

impl From<bincode::Error> for XiphosError {
    fn from(err: bincode::Error) -> Self {
        XiphosError::Serialization(err.to_string())
    }
}
