//! # Segue crossfade engine (segue-xfade)
//!
//! Gapless crossfading between consecutive tracks on top of two platform
//! playback pipelines.
//!
//! **Architecture:** the [`playback::DualPipelineEngine`] owns both pipelines
//! and performs volume ramps and the Master hand-off; the
//! [`playback::TransitionScheduler`] watches the Master's event stream and
//! decides when a crossfade should start.

pub mod error;
pub mod playback;

pub use error::{Error, Result};
