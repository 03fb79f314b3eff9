//! Common error types for segue

use thiserror::Error;

/// Common result type for segue operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the segue crates
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed TOML configuration
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
