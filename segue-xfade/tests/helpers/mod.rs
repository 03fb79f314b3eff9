//! Shared fixtures for engine and scheduler integration tests
//!
//! A [`Session`] is two simulated pipelines sharing one media catalog, an
//! engine owning clones of both, and a playing queue on the primary. Tests
//! keep the pipeline handles to play the platform's part (pause, seek,
//! advance) and to inspect the commands the engine issued.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use segue_common::{EnvelopeCurve, MediaItem, TimingConfig, TransitionSettings};
use segue_xfade::playback::pipeline::{MediaCatalog, PlaybackPipeline, SimulatedPipeline};
use segue_xfade::playback::{
    DualPipelineEngine, PipelineEvent, PipelineId, RuleResolver, RuleTable, SchedulerHandle,
    TransitionReason, TransitionScheduler,
};

pub const PLAYLIST: &str = "test-playlist";

pub fn item(id: &str) -> MediaItem {
    MediaItem::new(id, format!("sim://{}", id))
}

pub fn linear(duration_ms: u64) -> TransitionSettings {
    TransitionSettings::crossfade(duration_ms, EnvelopeCurve::Linear, EnvelopeCurve::Linear)
}

pub fn assert_gain(actual: f32, expected: f32, what: &str) {
    assert!(
        (actual - expected).abs() < 0.02,
        "{} volume {} not within 0.02 of {}",
        what,
        actual,
        expected
    );
}

pub struct Session {
    pub catalog: MediaCatalog,
    pub primary: SimulatedPipeline,
    pub secondary: SimulatedPipeline,
    pub engine: Arc<DualPipelineEngine<SimulatedPipeline>>,
}

impl Session {
    /// Empty, stopped pipelines with default timing
    pub fn new() -> Self {
        Self::with_duration_delay(Duration::ZERO)
    }

    /// Like [`Session::new`], but durations are reported only `delay` after an item becomes current
    pub fn with_duration_delay(delay: Duration) -> Self {
        let catalog = MediaCatalog::new();
        let primary = SimulatedPipeline::new("primary", catalog.clone()).with_duration_delay(delay);
        let secondary = SimulatedPipeline::new("secondary", catalog.clone()).with_duration_delay(delay);
        let engine = Arc::new(DualPipelineEngine::new(
            primary.clone(),
            secondary.clone(),
            TimingConfig::default(),
        ));
        Self {
            catalog,
            primary,
            secondary,
            engine,
        }
    }

    /// Register `tracks` and start playing them, in order, on the primary
    ///
    /// A `None` duration registers a track whose duration never becomes known.
    pub fn playing(tracks: &[(&str, Option<u64>)]) -> Self {
        Self::playing_after(tracks, Duration::ZERO)
    }

    /// Playing session whose durations show up `delay` after each item starts
    pub fn playing_after(tracks: &[(&str, Option<u64>)], delay: Duration) -> Self {
        let session = Self::with_duration_delay(delay);
        let items: Vec<MediaItem> = tracks
            .iter()
            .map(|(id, duration_ms)| {
                let item = item(id);
                match duration_ms {
                    Some(duration_ms) => session.catalog.insert(&item, *duration_ms),
                    None => session.catalog.insert_unknown(&item),
                }
                item
            })
            .collect();
        session.primary.set_queue(&items);
        session.play(PipelineId::Primary);
        session
    }

    pub fn pipeline(&self, id: PipelineId) -> &SimulatedPipeline {
        match id {
            PipelineId::Primary => &self.primary,
            PipelineId::Secondary => &self.secondary,
        }
    }

    /// Platform-side play, bypassing the engine
    pub fn play(&self, id: PipelineId) {
        let mut pipeline = self.pipeline(id).clone();
        pipeline.play().unwrap();
    }

    /// Platform-side pause, bypassing the engine
    pub fn pause(&self, id: PipelineId) {
        let mut pipeline = self.pipeline(id).clone();
        pipeline.pause().unwrap();
    }

    /// Platform-side seek, bypassing the engine
    pub fn seek(&self, id: PipelineId, position_ms: u64) {
        let mut pipeline = self.pipeline(id).clone();
        pipeline.seek_to(position_ms).unwrap();
    }

    /// Scheduler with one settings value for every transition
    pub fn scheduler(&self, settings: TransitionSettings) -> SchedulerHandle {
        self.scheduler_with(Arc::new(RuleTable::uniform(settings)))
    }

    pub fn scheduler_with(&self, resolver: Arc<dyn RuleResolver>) -> SchedulerHandle {
        TransitionScheduler::spawn(Arc::clone(&self.engine), resolver, TimingConfig::default())
    }

    /// Announce the primary's current item and playing state, as the platform does at session start
    pub fn announce_start(&self, scheduler: &SchedulerHandle) {
        scheduler.notify(PipelineEvent::item_transitioned(
            PipelineId::Primary,
            self.primary.current_item(),
            TransitionReason::PlaylistChanged,
        ));
        scheduler.notify(PipelineEvent::is_playing_changed(PipelineId::Primary, true));
    }
}
