//! Error types for segue-xfade
//!
//! Pipeline failures are recoverable: the scheduler degrades to a plain
//! gapless advance instead of stopping playback.

use thiserror::Error;

/// Main error type for segue-xfade
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying playback pipeline rejected a command
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Configuration errors from segue-common
    #[error(transparent)]
    Config(#[from] segue_common::Error),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Convenience Result type using segue-xfade Error
pub type Result<T> = std::result::Result<T, Error>;
