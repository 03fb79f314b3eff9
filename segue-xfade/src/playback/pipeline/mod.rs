//! Playback pipeline abstraction and the dual-pipeline engine
//!
//! The platform media pipeline (decoding, output) lives outside this crate.
//! [`PlaybackPipeline`] is the command surface the engine drives; events flow
//! back through [`crate::playback::events`].

pub mod dual;
pub mod simulated;
pub mod slot;

pub use dual::{DualPipelineEngine, HandOff, TransitionOutcome};
pub use simulated::{MediaCatalog, PipelineCommand, SimulatedPipeline};
pub use slot::{PipelineSlot, SlotRole};

use segue_common::MediaItem;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Identifies one of the two physical pipeline instances
///
/// Stable for the life of the engine; roles move between instances, ids do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineId {
    Primary,
    Secondary,
}

impl PipelineId {
    /// Index into the engine's slot array
    pub fn index(&self) -> usize {
        match self {
            PipelineId::Primary => 0,
            PipelineId::Secondary => 1,
        }
    }
}

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineId::Primary => write!(f, "primary"),
            PipelineId::Secondary => write!(f, "secondary"),
        }
    }
}

/// Command surface of one platform playback pipeline
///
/// Commands are synchronous and are expected to return quickly; the platform
/// does its buffering and decoding in the background. `duration_ms` returns
/// `None` until the platform knows the duration of the current item.
pub trait PlaybackPipeline: Send + 'static {
    /// Load an item, replacing whatever was loaded before
    fn load(&mut self, item: &MediaItem) -> Result<()>;

    /// Begin buffering the loaded item without starting transport
    fn prepare(&mut self) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Unload every item
    fn clear(&mut self);

    fn seek_to(&mut self, position_ms: u64) -> Result<()>;

    /// Set output gain (0.0 to 1.0)
    fn set_volume(&mut self, gain: f32);

    fn volume(&self) -> f32;

    fn current_position_ms(&self) -> u64;

    /// Duration of the current item, `None` while still unknown
    fn duration_ms(&self) -> Option<u64>;

    fn item_count(&self) -> usize;

    fn current_item(&self) -> Option<MediaItem>;

    /// Items queued after the current one, in play order
    fn upcoming_items(&self) -> Vec<MediaItem>;

    /// Append items to the platform queue after whatever is already queued
    fn enqueue(&mut self, items: &[MediaItem]) -> Result<()>;

    /// Item the platform queue will advance to after the current one
    fn next_item(&self) -> Option<MediaItem> {
        self.upcoming_items().into_iter().next()
    }

    fn is_playing(&self) -> bool;

    /// Release platform resources; the pipeline is unusable afterwards
    fn release(&mut self);
}
