//! Pipeline slot: one pipeline instance plus the role it currently plays

use segue_common::MediaItem;
use serde::{Deserialize, Serialize};

use super::{PipelineId, PlaybackPipeline};
use crate::error::Result;

/// Role of a slot within the engine
///
/// Exactly one slot is `Master` at any time. The Master is audible by default
/// and its transport state is what session and UI controllers see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotRole {
    Master,
    Auxiliary,
}

/// Thin handle over one pipeline instance
///
/// Mirrors the loaded item and the last applied volume so the engine can
/// reason about the slot without querying the platform.
pub struct PipelineSlot<P> {
    id: PipelineId,
    role: SlotRole,
    pipeline: P,
    loaded_item: Option<MediaItem>,
    volume: f32,
}

impl<P: PlaybackPipeline> PipelineSlot<P> {
    pub fn new(id: PipelineId, role: SlotRole, pipeline: P) -> Self {
        let volume = pipeline.volume().clamp(0.0, 1.0);
        let loaded_item = pipeline.current_item();
        Self {
            id,
            role,
            pipeline,
            loaded_item,
            volume,
        }
    }

    pub fn id(&self) -> PipelineId {
        self.id
    }

    pub fn role(&self) -> SlotRole {
        self.role
    }

    pub(crate) fn set_role(&mut self, role: SlotRole) {
        self.role = role;
    }

    pub fn loaded_item(&self) -> Option<&MediaItem> {
        self.loaded_item.as_ref()
    }

    /// Last volume applied through this slot
    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// Load and buffer an item without starting transport
    pub(crate) fn load_paused(&mut self, item: &MediaItem) -> Result<()> {
        self.pipeline.stop()?;
        self.pipeline.clear();
        self.loaded_item = None;

        self.pipeline.load(item)?;
        self.loaded_item = Some(item.clone());
        self.pipeline.prepare()
    }

    pub(crate) fn set_volume(&mut self, gain: f32) {
        let clamped = gain.clamp(0.0, 1.0);
        self.pipeline.set_volume(clamped);
        self.volume = clamped;
    }

    pub(crate) fn play(&mut self) -> Result<()> {
        self.pipeline.play()
    }

    pub(crate) fn seek_to(&mut self, position_ms: u64) -> Result<()> {
        self.pipeline.seek_to(position_ms)
    }

    pub(crate) fn position_ms(&self) -> u64 {
        self.pipeline.current_position_ms()
    }

    pub(crate) fn duration_ms(&self) -> Option<u64> {
        self.pipeline.duration_ms()
    }

    /// Item actually playing on the platform pipeline
    ///
    /// The Master's platform queue advances on its own, so this can differ
    /// from `loaded_item`.
    pub(crate) fn current_item(&self) -> Option<MediaItem> {
        self.pipeline.current_item()
    }

    pub(crate) fn next_item(&self) -> Option<MediaItem> {
        self.pipeline.next_item()
    }

    pub(crate) fn upcoming_items(&self) -> Vec<MediaItem> {
        self.pipeline.upcoming_items()
    }

    pub(crate) fn enqueue(&mut self, items: &[MediaItem]) -> Result<()> {
        self.pipeline.enqueue(items)
    }

    /// True when an item is loaded and the platform still holds it
    pub fn has_loaded_item(&self) -> bool {
        self.loaded_item.is_some() && self.pipeline.item_count() > 0
    }

    /// Stop transport and unload everything so the slot can take a new item
    ///
    /// Best effort: a failing stop is logged by the caller's context but the
    /// slot is cleared regardless.
    pub(crate) fn stop_and_clear(&mut self) -> Result<()> {
        let stopped = self.pipeline.stop();
        self.pipeline.clear();
        self.loaded_item = None;
        stopped
    }

    pub(crate) fn release(&mut self) {
        self.pipeline.release();
        self.loaded_item = None;
    }
}

impl<P> std::fmt::Debug for PipelineSlot<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineSlot")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("loaded_item", &self.loaded_item)
            .field("volume", &self.volume)
            .finish()
    }
}
