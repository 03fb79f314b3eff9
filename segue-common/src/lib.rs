//! # Segue Common Library
//!
//! Shared code for the segue crates:
//! - Envelope curves for crossfading
//! - Transition settings and media item identity
//! - Configuration loading
//! - Common error type

pub mod config;
pub mod envelope;
pub mod error;
pub mod settings;

pub use config::{SegueConfig, TimingConfig, TransitionRule};
pub use envelope::EnvelopeCurve;
pub use error::{Error, Result};
pub use settings::{MediaItem, TransitionMode, TransitionSettings};
