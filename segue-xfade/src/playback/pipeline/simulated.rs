//! In-process pipeline that simulates transport, position and duration
//!
//! Position advances with `tokio::time::Instant`, so tests running on a
//! paused tokio clock see exact, repeatable positions. Every command is
//! recorded for inspection, and failures can be injected.
//!
//! `SimulatedPipeline` is a cheap handle: clones share the same state, so a
//! test (or the CLI driver) can keep a clone to observe the instance the
//! engine owns, or to act as the platform session (user pause, auto-advance).

use parking_lot::{Mutex, RwLock};
use segue_common::MediaItem;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::PlaybackPipeline;
use crate::error::{Error, Result};

/// Command issued to a simulated pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineCommand {
    Load(String),
    Enqueue(Vec<String>),
    Prepare,
    Play,
    Pause,
    Stop,
    Clear,
    Seek(u64),
    SetVolume(f32),
    Release,
}

/// Track durations known to the simulated platform, shared by both pipelines
///
/// An item registered without a duration never reports one. Unregistered
/// items behave the same way.
#[derive(Debug, Clone, Default)]
pub struct MediaCatalog {
    durations: Arc<RwLock<HashMap<String, Option<u64>>>>,
}

impl MediaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, item: &MediaItem, duration_ms: u64) {
        self.durations.write().insert(item.media_id.clone(), Some(duration_ms));
    }

    pub fn insert_unknown(&self, item: &MediaItem) {
        self.durations.write().insert(item.media_id.clone(), None);
    }

    fn duration_of(&self, item: &MediaItem) -> Option<u64> {
        self.durations.read().get(&item.media_id).copied().flatten()
    }
}

#[derive(Debug)]
struct SimState {
    queue: Vec<MediaItem>,
    current: Option<usize>,
    base_position_ms: u64,
    playing_since: Option<Instant>,
    loaded_at: Instant,
    volume: f32,
    released: bool,
    fail_next_load: bool,
    fail_next_play: bool,
    commands: Vec<PipelineCommand>,
    position_queries: usize,
}

impl SimState {
    fn current_item(&self) -> Option<&MediaItem> {
        self.current.and_then(|i| self.queue.get(i))
    }

    fn position_at(&self, now: Instant, duration_ms: Option<u64>) -> u64 {
        let position = match self.playing_since {
            Some(since) => self.base_position_ms + now.duration_since(since).as_millis() as u64,
            None => self.base_position_ms,
        };
        match duration_ms {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.released {
            Err(Error::Pipeline("pipeline released".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Simulated platform pipeline
#[derive(Debug, Clone)]
pub struct SimulatedPipeline {
    name: Arc<str>,
    catalog: MediaCatalog,
    duration_delay: Duration,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedPipeline {
    pub fn new(name: &str, catalog: MediaCatalog) -> Self {
        Self {
            name: Arc::from(name),
            catalog,
            duration_delay: Duration::ZERO,
            state: Arc::new(Mutex::new(SimState {
                queue: Vec::new(),
                current: None,
                base_position_ms: 0,
                playing_since: None,
                loaded_at: Instant::now(),
                volume: 1.0,
                released: false,
                fail_next_load: false,
                fail_next_play: false,
                commands: Vec::new(),
                position_queries: 0,
            })),
        }
    }

    /// Report durations only after `delay` has passed since an item became current
    pub fn with_duration_delay(mut self, delay: Duration) -> Self {
        self.duration_delay = delay;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the queue and make its first item current (platform session setup)
    pub fn set_queue(&self, items: &[MediaItem]) {
        let mut state = self.state.lock();
        state.queue = items.to_vec();
        state.current = if items.is_empty() { None } else { Some(0) };
        state.base_position_ms = 0;
        state.loaded_at = Instant::now();
        if state.playing_since.is_some() {
            state.playing_since = Some(Instant::now());
        }
    }

    /// Move to the next queued item, as the platform does at the end of a track
    ///
    /// Returns the new current item, or `None` (and stops) at the end of the queue.
    pub fn advance(&self) -> Option<MediaItem> {
        let mut state = self.state.lock();
        let next = state.current.map(|i| i + 1).filter(|i| *i < state.queue.len());
        let now = Instant::now();
        match next {
            Some(index) => {
                state.current = Some(index);
                state.base_position_ms = 0;
                state.loaded_at = now;
                if state.playing_since.is_some() {
                    state.playing_since = Some(now);
                }
                state.queue.get(index).cloned()
            }
            None => {
                let duration = state.current_item().and_then(|i| self.catalog.duration_of(i));
                let position = state.position_at(now, duration);
                state.base_position_ms = position;
                state.playing_since = None;
                None
            }
        }
    }

    /// True when the current item has played to its end
    pub fn is_finished(&self) -> bool {
        let state = self.state.lock();
        let duration = state.current_item().and_then(|i| self.catalog.duration_of(i));
        match duration {
            Some(duration) => state.position_at(Instant::now(), Some(duration)) >= duration,
            None => false,
        }
    }

    /// Make the next `load` fail
    pub fn fail_next_load(&self) {
        self.state.lock().fail_next_load = true;
    }

    /// Make the next `play` fail
    pub fn fail_next_play(&self) {
        self.state.lock().fail_next_play = true;
    }

    /// Every command issued so far, in order
    pub fn commands(&self) -> Vec<PipelineCommand> {
        self.state.lock().commands.clone()
    }

    /// Every volume applied so far, in order
    pub fn volume_history(&self) -> Vec<f32> {
        self.state
            .lock()
            .commands
            .iter()
            .filter_map(|c| match c {
                PipelineCommand::SetVolume(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    pub fn clear_commands(&self) {
        self.state.lock().commands.clear();
    }

    /// Number of `current_position_ms` queries answered so far
    pub fn position_queries(&self) -> usize {
        self.state.lock().position_queries
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }
}

impl PlaybackPipeline for SimulatedPipeline {
    fn load(&mut self, item: &MediaItem) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_live()?;
        state.commands.push(PipelineCommand::Load(item.media_id.clone()));

        if std::mem::take(&mut state.fail_next_load) {
            return Err(Error::Pipeline(format!("{}: failed to open {}", self.name, item.uri)));
        }

        state.queue = vec![item.clone()];
        state.current = Some(0);
        state.base_position_ms = 0;
        state.playing_since = None;
        state.loaded_at = Instant::now();
        debug!(pipeline = %self.name, item = %item, "Loaded item");
        Ok(())
    }

    fn prepare(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_live()?;
        state.commands.push(PipelineCommand::Prepare);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_live()?;
        state.commands.push(PipelineCommand::Play);

        if std::mem::take(&mut state.fail_next_play) {
            return Err(Error::Pipeline(format!("{}: output device error", self.name)));
        }
        if state.current.is_none() {
            return Err(Error::Pipeline(format!("{}: nothing loaded", self.name)));
        }
        if state.playing_since.is_none() {
            state.playing_since = Some(Instant::now());
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_live()?;
        state.commands.push(PipelineCommand::Pause);

        let duration = state.current_item().and_then(|i| self.catalog.duration_of(i));
        let position = state.position_at(Instant::now(), duration);
        state.base_position_ms = position;
        state.playing_since = None;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_live()?;
        state.commands.push(PipelineCommand::Stop);
        state.base_position_ms = 0;
        state.playing_since = None;
        Ok(())
    }

    fn clear(&mut self) {
        let mut state = self.state.lock();
        state.commands.push(PipelineCommand::Clear);
        state.queue.clear();
        state.current = None;
        state.base_position_ms = 0;
        state.playing_since = None;
    }

    fn seek_to(&mut self, position_ms: u64) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_live()?;
        state.commands.push(PipelineCommand::Seek(position_ms));
        state.base_position_ms = position_ms;
        if state.playing_since.is_some() {
            state.playing_since = Some(Instant::now());
        }
        Ok(())
    }

    fn set_volume(&mut self, gain: f32) {
        let mut state = self.state.lock();
        state.commands.push(PipelineCommand::SetVolume(gain));
        state.volume = gain;
    }

    fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    fn current_position_ms(&self) -> u64 {
        let mut state = self.state.lock();
        state.position_queries += 1;
        let duration = state.current_item().and_then(|i| self.catalog.duration_of(i));
        state.position_at(Instant::now(), duration)
    }

    fn duration_ms(&self) -> Option<u64> {
        let state = self.state.lock();
        let item = state.current_item()?;
        if Instant::now().duration_since(state.loaded_at) < self.duration_delay {
            return None;
        }
        self.catalog.duration_of(item)
    }

    fn item_count(&self) -> usize {
        self.state.lock().queue.len()
    }

    fn current_item(&self) -> Option<MediaItem> {
        self.state.lock().current_item().cloned()
    }

    fn upcoming_items(&self) -> Vec<MediaItem> {
        let state = self.state.lock();
        match state.current {
            Some(index) => state.queue.iter().skip(index + 1).cloned().collect(),
            None => Vec::new(),
        }
    }

    fn enqueue(&mut self, items: &[MediaItem]) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_live()?;
        state
            .commands
            .push(PipelineCommand::Enqueue(items.iter().map(|i| i.media_id.clone()).collect()));
        state.queue.extend_from_slice(items);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing_since.is_some()
    }

    fn release(&mut self) {
        let mut state = self.state.lock();
        if state.released {
            return;
        }
        state.commands.push(PipelineCommand::Release);
        state.released = true;
        state.queue.clear();
        state.current = None;
        state.playing_since = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> MediaItem {
        MediaItem::new(id, format!("sim://{}", id))
    }

    #[tokio::test(start_paused = true)]
    async fn test_position_follows_clock() {
        let catalog = MediaCatalog::new();
        catalog.insert(&item("a"), 10_000);
        let mut pipeline = SimulatedPipeline::new("p", catalog);

        pipeline.load(&item("a")).unwrap();
        pipeline.play().unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(pipeline.current_position_ms(), 1500);

        pipeline.pause().unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(pipeline.current_position_ms(), 1500);

        pipeline.seek_to(9000).unwrap();
        pipeline.play().unwrap();
        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(pipeline.current_position_ms(), 10_000, "position caps at duration");
        assert!(pipeline.is_finished());
        assert_eq!(pipeline.position_queries(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_delay() {
        let catalog = MediaCatalog::new();
        catalog.insert(&item("a"), 10_000);
        let mut pipeline =
            SimulatedPipeline::new("p", catalog).with_duration_delay(Duration::from_millis(300));

        pipeline.load(&item("a")).unwrap();
        assert_eq!(pipeline.duration_ms(), None);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(pipeline.duration_ms(), Some(10_000));
    }

    #[tokio::test]
    async fn test_queue_and_advance() {
        let pipeline = SimulatedPipeline::new("p", MediaCatalog::new());
        pipeline.set_queue(&[item("a"), item("b")]);

        assert_eq!(pipeline.next_item(), Some(item("b")));
        assert_eq!(pipeline.advance(), Some(item("b")));
        assert_eq!(pipeline.next_item(), None);
        assert_eq!(pipeline.advance(), None);
        assert_eq!(pipeline.current_item(), Some(item("b")));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let mut pipeline = SimulatedPipeline::new("p", MediaCatalog::new());

        pipeline.fail_next_load();
        assert!(matches!(pipeline.load(&item("a")), Err(Error::Pipeline(_))));
        assert!(pipeline.load(&item("a")).is_ok());

        pipeline.fail_next_play();
        assert!(pipeline.play().is_err());
        assert!(pipeline.play().is_ok());
        assert!(pipeline.is_playing());
    }

    #[tokio::test]
    async fn test_release_is_terminal() {
        let mut pipeline = SimulatedPipeline::new("p", MediaCatalog::new());
        pipeline.release();
        pipeline.release();

        assert!(pipeline.is_released());
        assert!(pipeline.load(&item("a")).is_err());
        let releases = pipeline
            .commands()
            .into_iter()
            .filter(|c| *c == PipelineCommand::Release)
            .count();
        assert_eq!(releases, 1);
    }
}
