//! Dual pipeline engine for crossfading between tracks
//!
//! Two pipeline slots live in a fixed array; `master_index` says which one is
//! audible. A crossfade ramps both volumes over the configured duration and
//! then hands the Master role to the slot that was fading in. Only the index
//! flips on hand-off, the pipeline instances never move.
//!
//! All methods take `&self`. Slot mutation happens under a short,
//! non-awaiting lock, so commands reach each pipeline in the order issued.

use parking_lot::Mutex;
use segue_common::{MediaItem, TimingConfig, TransitionSettings};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::slot::{PipelineSlot, SlotRole};
use super::{PipelineId, PlaybackPipeline};
use crate::error::{Error, Result};

/// Result of the hand-off at the end of a completed crossfade
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandOff {
    /// Item now playing on the Master
    pub item: MediaItem,

    /// Position the new Master was pinned to
    pub position_ms: u64,

    /// Pipeline instance that now holds the Master role
    pub master: PipelineId,
}

/// What `perform_transition` did
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// Settings were inactive; no volume or transport was touched
    Skipped,

    /// The Auxiliary slot had nothing loaded; no volume or transport was touched
    NothingToTransition,

    /// Stopped before completion; partially applied volumes are left as they are
    Cancelled,

    /// Ramp finished and the Master role moved to the other slot
    Completed(HandOff),
}

struct SlotPair<P> {
    slots: [PipelineSlot<P>; 2],
    master_index: usize,
}

impl<P: PlaybackPipeline> SlotPair<P> {
    fn master(&self) -> &PipelineSlot<P> {
        &self.slots[self.master_index]
    }

    fn master_mut(&mut self) -> &mut PipelineSlot<P> {
        &mut self.slots[self.master_index]
    }

    fn aux(&self) -> &PipelineSlot<P> {
        &self.slots[1 - self.master_index]
    }

    fn aux_mut(&mut self) -> &mut PipelineSlot<P> {
        &mut self.slots[1 - self.master_index]
    }

    fn swap_roles(&mut self) {
        self.master_index = 1 - self.master_index;
        let master_index = self.master_index;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            slot.set_role(if index == master_index {
                SlotRole::Master
            } else {
                SlotRole::Auxiliary
            });
        }
    }
}

/// Dual pipeline engine
///
/// Owns both pipeline slots exclusively; every transport and volume change
/// goes through the methods below. The scheduler is the only expected caller
/// and serialises its calls, except that a new ramp may supersede a running one.
pub struct DualPipelineEngine<P> {
    pair: Mutex<SlotPair<P>>,

    /// Generation and cancellation token of the ramp currently running, if any
    active_ramp: Mutex<Option<(u64, CancellationToken)>>,

    ramp_generation: AtomicU64,

    /// Held for the whole duration of a ramp so a new ramp waits for the
    /// previous one to stop before touching the slots
    ramp_lock: tokio::sync::Mutex<()>,

    released: AtomicBool,

    timing: TimingConfig,
}

impl<P: PlaybackPipeline> DualPipelineEngine<P> {
    /// Create an engine; `primary` starts as Master
    pub fn new(primary: P, secondary: P, timing: TimingConfig) -> Self {
        info!("Creating dual pipeline engine");

        Self {
            pair: Mutex::new(SlotPair {
                slots: [
                    PipelineSlot::new(PipelineId::Primary, SlotRole::Master, primary),
                    PipelineSlot::new(PipelineId::Secondary, SlotRole::Auxiliary, secondary),
                ],
                master_index: 0,
            }),
            active_ramp: Mutex::new(None),
            ramp_generation: AtomicU64::new(0),
            ramp_lock: tokio::sync::Mutex::new(()),
            released: AtomicBool::new(false),
            timing,
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.released.load(Ordering::Acquire) {
            Err(Error::InvalidState("engine released".to_string()))
        } else {
            Ok(())
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Load `item` into the Auxiliary slot and buffer it without starting transport
    ///
    /// Last prepare wins: an unrelated pending item is replaced. Preparing the
    /// item that is already loaded is a no-op. On failure the Auxiliary slot is
    /// left stopped and empty; the Master is never touched.
    pub fn prepare_next(&self, item: &MediaItem) -> Result<()> {
        self.ensure_live()?;
        let mut pair = self.pair.lock();

        if pair.aux().loaded_item() == Some(item) && pair.aux().has_loaded_item() {
            debug!(item = %item, "Auxiliary already holds item, nothing to prepare");
            return Ok(());
        }

        let aux = pair.aux_mut();
        if let Some(previous) = aux.loaded_item() {
            debug!(previous = %previous, item = %item, "Replacing pending auxiliary item");
        }

        match aux.load_paused(item) {
            Ok(()) => {
                info!(item = %item, slot = %aux.id(), "Prepared next item on auxiliary");
                Ok(())
            }
            Err(e) => {
                warn!(item = %item, error = %e, "Failed to prepare next item");
                if let Err(stop_err) = aux.stop_and_clear() {
                    debug!("Auxiliary cleanup after failed prepare: {}", stop_err);
                }
                Err(e)
            }
        }
    }

    /// Crossfade from the Master to the prepared Auxiliary
    pub async fn perform_transition(&self, settings: TransitionSettings) -> Result<TransitionOutcome> {
        self.perform_transition_cancellable(settings, &CancellationToken::new())
            .await
    }

    /// Crossfade from the Master to the prepared Auxiliary, observing `cancel`
    ///
    /// Cancellation is checked on every tick; no volume is applied after it
    /// is observed. A ramp already running is cancelled and awaited first.
    pub async fn perform_transition_cancellable(
        &self,
        settings: TransitionSettings,
        cancel: &CancellationToken,
    ) -> Result<TransitionOutcome> {
        self.ensure_live()?;

        if !settings.is_active() {
            debug!(mode = %settings.mode, duration_ms = settings.duration_ms, "Transition inactive, skipping");
            return Ok(TransitionOutcome::Skipped);
        }

        let token = cancel.child_token();
        let generation = self.ramp_generation.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some((_, previous)) = self.active_ramp.lock().replace((generation, token.clone())) {
            debug!("Cancelling previous ramp");
            previous.cancel();
        }

        let _ramp_guard = self.ramp_lock.lock().await;
        let outcome = self.run_ramp(settings, &token).await;

        let mut active = self.active_ramp.lock();
        if active.as_ref().is_some_and(|(current, _)| *current == generation) {
            *active = None;
        }
        outcome
    }

    async fn run_ramp(
        &self,
        settings: TransitionSettings,
        token: &CancellationToken,
    ) -> Result<TransitionOutcome> {
        if token.is_cancelled() || self.is_released() {
            return Ok(TransitionOutcome::Cancelled);
        }

        let incoming = {
            let mut pair = self.pair.lock();
            let incoming = match pair.aux().loaded_item() {
                Some(item) if pair.aux().has_loaded_item() => item.clone(),
                _ => {
                    debug!("Auxiliary slot has nothing loaded, nothing to transition");
                    return Ok(TransitionOutcome::NothingToTransition);
                }
            };

            pair.aux_mut().set_volume(0.0);
            if let Err(e) = pair.aux_mut().play() {
                warn!(error = %e, "Auxiliary failed to start, aborting transition");
                Self::abort(&mut pair);
                return Err(e);
            }

            info!(
                from = ?pair.master().current_item().map(|i| i.media_id),
                to = %incoming,
                duration_ms = settings.duration_ms,
                curve_out = %settings.curve_out,
                curve_in = %settings.curve_in,
                "Starting crossfade"
            );
            incoming
        };

        let total = Duration::from_millis(settings.duration_ms);
        let started = Instant::now();
        let mut ticker = interval(self.timing.ramp_tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!("Crossfade cancelled");
                    return Ok(TransitionOutcome::Cancelled);
                }
                _ = ticker.tick() => {}
            }

            let elapsed = started.elapsed();
            if elapsed >= total {
                break;
            }

            let progress = elapsed.as_secs_f32() / total.as_secs_f32();
            let master_gain = settings.curve_out.fade_out(progress);
            let aux_gain = settings.curve_in.fade_in(progress);

            let mut pair = self.pair.lock();
            if token.is_cancelled() {
                info!("Crossfade cancelled");
                return Ok(TransitionOutcome::Cancelled);
            }
            pair.master_mut().set_volume(master_gain);
            pair.aux_mut().set_volume(aux_gain);
            debug!(
                "Crossfade progress: {:.1}%, master vol: {:.3}, aux vol: {:.3}",
                progress * 100.0,
                master_gain,
                aux_gain
            );
        }

        let mut pair = self.pair.lock();
        if token.is_cancelled() {
            info!("Crossfade cancelled");
            return Ok(TransitionOutcome::Cancelled);
        }
        pair.master_mut().set_volume(0.0);
        pair.aux_mut().set_volume(1.0);

        Ok(TransitionOutcome::Completed(Self::hand_off(&mut pair, incoming)))
    }

    /// Move the Master role to the Auxiliary slot
    ///
    /// The new Master keeps playing; it is pinned to its own position rather
    /// than restarted. The rest of the old Master's queue follows it. Failures
    /// here are logged and never interrupt the audio that is already playing.
    fn hand_off(pair: &mut SlotPair<P>, incoming: MediaItem) -> HandOff {
        let mut carried: Vec<MediaItem> = pair.master().upcoming_items();
        if carried.first() == Some(&incoming) {
            carried.remove(0);
        }

        let position_ms = pair.aux().position_ms();
        let new_master = pair.aux_mut();
        if let Err(e) = new_master.seek_to(position_ms) {
            warn!(error = %e, "Failed to pin new master position");
        }
        new_master.set_volume(1.0);
        if !carried.is_empty() {
            if let Err(e) = new_master.enqueue(&carried) {
                warn!(error = %e, "Failed to carry queue over to new master");
            }
        }

        let old_master = pair.master_mut();
        if let Err(e) = old_master.stop_and_clear() {
            warn!(error = %e, "Failed to stop old master");
        }

        pair.swap_roles();

        let master = pair.master();
        info!(
            item = %incoming,
            position_ms,
            master = %master.id(),
            carried = carried.len(),
            "Hand-off complete"
        );

        HandOff {
            item: incoming,
            position_ms,
            master: master.id(),
        }
    }

    /// Stop the Auxiliary and put the Master back at full volume
    fn abort(pair: &mut SlotPair<P>) {
        if let Err(e) = pair.aux_mut().stop_and_clear() {
            debug!("Auxiliary cleanup after abort: {}", e);
        }
        pair.aux_mut().set_volume(0.0);
        if pair.master().volume() < 1.0 {
            pair.master_mut().set_volume(1.0);
        }
    }

    /// Cancel the running ramp, if any, without waiting for it
    pub fn cancel_ramp(&self) {
        if let Some((_, token)) = self.active_ramp.lock().take() {
            debug!("Cancelling active ramp");
            token.cancel();
        }
    }

    pub fn is_ramping(&self) -> bool {
        self.active_ramp.lock().is_some()
    }

    /// Reset both slots to a definite state after a cancelled transition
    ///
    /// The Master returns to full volume with its transport untouched, the
    /// Auxiliary is stopped, emptied and silenced. Volumes already at their
    /// target are not re-applied.
    pub fn restore_master(&self) {
        self.cancel_ramp();
        if self.is_released() {
            return;
        }

        let mut pair = self.pair.lock();
        if pair.aux().loaded_item().is_some() {
            if let Err(e) = pair.aux_mut().stop_and_clear() {
                warn!(error = %e, "Failed to stop auxiliary during cleanup");
            }
        }
        if pair.aux().volume() > 0.0 {
            pair.aux_mut().set_volume(0.0);
        }
        if pair.master().volume() < 1.0 {
            pair.master_mut().set_volume(1.0);
        }
        debug!("Slots restored: master at full volume, auxiliary stopped");
    }

    /// Drop whatever the Auxiliary slot holds without touching the Master
    pub fn discard_next(&self) {
        if self.is_released() {
            return;
        }
        let mut pair = self.pair.lock();
        if pair.aux().loaded_item().is_none() {
            return;
        }
        if let Err(e) = pair.aux_mut().stop_and_clear() {
            warn!(error = %e, "Failed to discard auxiliary item");
        }
    }

    /// Stop and release both pipelines (idempotent)
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel_ramp();

        let mut pair = self.pair.lock();
        for slot in pair.slots.iter_mut() {
            if let Err(e) = slot.stop_and_clear() {
                debug!(slot = %slot.id(), "Stop before release failed: {}", e);
            }
            slot.release();
        }
        info!("Dual pipeline engine released");
    }

    pub fn master_id(&self) -> PipelineId {
        self.pair.lock().master().id()
    }

    /// Transport state of the Master as the platform reports it
    pub fn is_master_playing(&self) -> bool {
        self.pair.lock().master().pipeline().is_playing()
    }

    /// Item currently playing on the Master
    pub fn master_item(&self) -> Option<MediaItem> {
        self.pair.lock().master().current_item()
    }

    /// Item the Master's queue will advance to next
    pub fn next_item(&self) -> Option<MediaItem> {
        self.pair.lock().master().next_item()
    }

    pub fn aux_item(&self) -> Option<MediaItem> {
        self.pair.lock().aux().loaded_item().cloned()
    }

    pub fn master_position_ms(&self) -> u64 {
        self.pair.lock().master().position_ms()
    }

    /// Duration of the Master's current item, `None` while unknown
    pub fn master_duration_ms(&self) -> Option<u64> {
        self.pair.lock().master().duration_ms()
    }

    /// Last applied volumes as `(master, auxiliary)`
    pub fn volumes(&self) -> (f32, f32) {
        let pair = self.pair.lock();
        (pair.master().volume(), pair.aux().volume())
    }

    /// Role of each physical pipeline, indexed by `PipelineId::index`
    pub fn roles(&self) -> [(PipelineId, SlotRole); 2] {
        let pair = self.pair.lock();
        [
            (pair.slots[0].id(), pair.slots[0].role()),
            (pair.slots[1].id(), pair.slots[1].role()),
        ]
    }
}

impl<P> Drop for DualPipelineEngine<P> {
    fn drop(&mut self) {
        if let Some((_, token)) = self.active_ramp.get_mut().take() {
            token.cancel();
        }
    }
}
