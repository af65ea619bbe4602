//! Error types for Warden.

use thiserror::Error;

/// Main error type for Warden operations.
///
/// Only construction and configuration can fail; a rate limit decision is
/// always a plain `bool`.
#[derive(Error, Debug)]
pub enum WardenError {
    /// Invalid rule parameters or malformed rule definitions
    #[error("Configuration error: {0}")]
    Config(String),

    /// Layered settings could not be loaded or deserialized
    #[error("Settings error: {0}")]
    Settings(#[from] ::config::ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Warden operations.
pub type Result<T> = std::result::Result<T, WardenError>;
