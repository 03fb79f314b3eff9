//! Transition scheduler
//!
//! One scheduler per playback session. It consumes the ordered event stream
//! from [`crate::playback::events`], keeps at most one [`TransitionTask`]
//! alive, and drives the engine through it:
//!
//! ```text
//! Idle ──item changed──▶ Armed ──duration known──▶ Waiting ──position ≥ point──▶ Executing
//!   ▲                      │                         │                              │
//!   └──── no settings / too late / hand-off ◀────────┴──── pause, item change ──────┘
//! ```
//!
//! Arming always cancels the previous task and waits for it to stop before
//! the slots are reset, so two tasks never touch the engine at once.

pub mod task;

pub use task::{SkipReason, TaskOutcome, TaskState, TransitionTask};

use segue_common::{MediaItem, TimingConfig};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use self::task::{run_task, TaskContext};
use crate::playback::events::{
    EventBridge, PipelineEvent, PipelineEventKind, PipelineListener, SchedulerCommand,
};
use crate::playback::pipeline::{DualPipelineEngine, PipelineId, PlaybackPipeline};
use crate::playback::rules::RuleResolver;

/// Externally visible scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    /// No task alive
    #[default]
    Idle,
    Armed,
    Waiting,
    Executing,
    /// A task was just cancelled and the slots are being reset
    Cancelled,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerState::Idle => write!(f, "idle"),
            SchedulerState::Armed => write!(f, "armed"),
            SchedulerState::Waiting => write!(f, "waiting"),
            SchedulerState::Executing => write!(f, "executing"),
            SchedulerState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Snapshot published on every state change
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub task_id: Option<Uuid>,
    pub transition_point_ms: Option<u64>,
    pub is_playing: bool,
    pub playlist_id: Option<String>,

    /// Item the Master took over with the most recent hand-off
    pub last_hand_off: Option<MediaItem>,

    pub armed: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub skipped: u64,
    pub failed: u64,

    /// Engine released; no further tasks will be armed
    pub released: bool,
}

struct ActiveTask {
    id: Uuid,
    cancel: CancellationToken,
    handle: JoinHandle<TaskOutcome>,
}

/// Per-session transition scheduler
pub struct TransitionScheduler<P> {
    engine: Arc<DualPipelineEngine<P>>,
    resolver: Arc<dyn RuleResolver>,
    timing: TimingConfig,
    playlist_id: Option<String>,

    /// Transport state of the Master as last reported; nothing is armed while paused
    is_playing: bool,

    active: Option<ActiveTask>,
    status: Arc<watch::Sender<SchedulerStatus>>,
    finished_tx: mpsc::UnboundedSender<Uuid>,
}

impl<P: PlaybackPipeline> TransitionScheduler<P> {
    /// Start the scheduler's event loop on the current tokio runtime
    pub fn spawn(
        engine: Arc<DualPipelineEngine<P>>,
        resolver: Arc<dyn RuleResolver>,
        timing: TimingConfig,
    ) -> SchedulerHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let is_playing = engine.is_master_playing();
        let (status_tx, status_rx) = watch::channel(SchedulerStatus {
            is_playing,
            ..SchedulerStatus::default()
        });

        let scheduler = Self {
            engine,
            resolver,
            timing,
            playlist_id: None,
            is_playing,
            active: None,
            status: Arc::new(status_tx),
            finished_tx,
        };

        info!("Transition scheduler started");
        let join = tokio::spawn(scheduler.run(command_rx, finished_rx));

        SchedulerHandle {
            bridge: EventBridge::new(command_tx),
            status: status_rx,
            join: Some(join),
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SchedulerCommand>,
        mut finished: mpsc::UnboundedReceiver<Uuid>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SchedulerCommand::Pipeline(event)) => self.handle_event(event).await,
                    Some(SchedulerCommand::SetPlaylist(playlist_id)) => {
                        info!(playlist_id = ?playlist_id, "Playlist context changed");
                        self.playlist_id = playlist_id.clone();
                        self.status.send_modify(|s| s.playlist_id = playlist_id);
                    }
                    Some(SchedulerCommand::Shutdown(ack)) => {
                        self.shutdown().await;
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        debug!("All event senders dropped");
                        self.shutdown().await;
                        break;
                    }
                },
                Some(task_id) = finished.recv() => self.handle_finished(task_id).await,
            }
        }
        info!("Transition scheduler stopped");
    }

    async fn handle_event(&mut self, event: PipelineEvent) {
        let master = self.engine.master_id();

        match event.kind {
            PipelineEventKind::Error(cause) => {
                // Either pipeline failing takes the crossfade down with it
                warn!(source = %event.source, cause = %cause, "Pipeline error, falling back to normal playback");
                if self.cancel_active().await {
                    self.arm_master();
                }
            }
            _ if event.source != master => {
                debug!(source = %event.source, "Ignoring event from auxiliary pipeline");
            }
            PipelineEventKind::ItemTransitioned { item, reason } => {
                debug!(item = ?item.as_ref().map(|i| &i.media_id), reason = ?reason, "Master item changed");
                if self.cancel_active().await {
                    // A hand-off landed first; the event came from the old Master
                    self.arm_master();
                    return;
                }
                match item {
                    Some(item) => self.arm(item),
                    None => debug!("Master queue ended"),
                }
            }
            PipelineEventKind::IsPlayingChanged(playing) => {
                self.is_playing = playing;
                self.status.send_modify(|s| s.is_playing = playing);

                if !playing {
                    info!("Playback paused, cancelling transition");
                    self.cancel_active().await;
                } else if self.active.is_none() {
                    info!("Playback resumed, re-arming transition");
                    self.arm_master();
                }
            }
        }
    }

    /// Arm for whatever the Master is playing now
    fn arm_master(&mut self) {
        match self.engine.master_item() {
            Some(item) => self.arm(item),
            None => debug!("Master has nothing loaded, not arming"),
        }
    }

    /// Create and start a task for `from_item`; any previous task must already be gone
    ///
    /// Paused sessions are not armed: resuming arms for the current item.
    fn arm(&mut self, from_item: MediaItem) {
        if self.engine.is_released() {
            debug!("Engine released, not arming");
            return;
        }
        if !self.is_playing {
            debug!(item = %from_item, "Playback paused, arming deferred until resume");
            return;
        }

        let task = TransitionTask::new(from_item, self.engine.next_item());
        let id = task.id;
        let cancel = CancellationToken::new();
        info!(
            task_id = %id,
            from = %task.from_item,
            to = ?task.to_item.as_ref().map(|i| &i.media_id),
            "Arming transition"
        );

        self.status.send_modify(|s| {
            s.state = SchedulerState::Armed;
            s.task_id = Some(id);
            s.transition_point_ms = None;
            s.armed += 1;
        });

        let ctx = TaskContext {
            engine: Arc::clone(&self.engine),
            resolver: Arc::clone(&self.resolver),
            playlist_id: self.playlist_id.clone(),
            timing: self.timing,
            status: Arc::clone(&self.status),
        };
        let finished_tx = self.finished_tx.clone();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let outcome = run_task(task, ctx, task_cancel).await;
            let _ = finished_tx.send(id);
            outcome
        });

        self.active = Some(ActiveTask { id, cancel, handle });
    }

    /// Cancel the live task, wait for it to stop, and reset the slots
    ///
    /// Returns true when the task completed its hand-off before the cancel
    /// landed, so the Master now plays a different item.
    async fn cancel_active(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };

        active.cancel.cancel();
        let outcome = match active.handle.await {
            Ok(outcome) => outcome,
            Err(e) => TaskOutcome::Failed(format!("task {} panicked: {}", active.id, e)),
        };

        let handed_off = match outcome {
            TaskOutcome::Completed(hand_off) => {
                // Finished before the cancel landed; nothing to undo
                info!(task_id = %active.id, item = %hand_off.item, "Hand-off completed before cancel");
                self.record_hand_off(hand_off.item);
                true
            }
            outcome => {
                self.engine.restore_master();
                info!(task_id = %active.id, outcome = ?outcome, "Transition cancelled");
                self.status.send_modify(|s| {
                    s.state = SchedulerState::Cancelled;
                    s.cancelled += 1;
                });
                false
            }
        };
        self.set_idle();
        handed_off
    }

    async fn handle_finished(&mut self, task_id: Uuid) {
        if self.active.as_ref().map(|a| a.id) != Some(task_id) {
            debug!(task_id = %task_id, "Ignoring stale task completion");
            return;
        }
        let Some(active) = self.active.take() else {
            return;
        };

        let outcome = match active.handle.await {
            Ok(outcome) => outcome,
            Err(e) => TaskOutcome::Failed(format!("task {} panicked: {}", active.id, e)),
        };

        match outcome {
            TaskOutcome::Completed(hand_off) => {
                self.record_hand_off(hand_off.item.clone());
                self.set_idle();
                // The new Master is now playing a different item
                self.arm(hand_off.item);
            }
            TaskOutcome::Skipped(reason) => {
                debug!(task_id = %task_id, reason = ?reason, "Transition skipped");
                self.engine.discard_next();
                self.status.send_modify(|s| s.skipped += 1);
                self.set_idle();
            }
            TaskOutcome::Cancelled => {
                self.engine.restore_master();
                self.status.send_modify(|s| s.cancelled += 1);
                self.set_idle();
            }
            TaskOutcome::Failed(cause) => {
                warn!(task_id = %task_id, cause = %cause, "Transition failed, continuing without crossfade");
                self.engine.restore_master();
                self.status.send_modify(|s| s.failed += 1);
                self.set_idle();
            }
        }
    }

    fn record_hand_off(&self, item: MediaItem) {
        self.status.send_modify(|s| {
            s.completed += 1;
            s.last_hand_off = Some(item);
        });
    }

    fn set_idle(&self) {
        self.status.send_modify(|s| {
            s.state = SchedulerState::Idle;
            s.task_id = None;
            s.transition_point_ms = None;
        });
    }

    async fn shutdown(&mut self) {
        self.cancel_active().await;
        self.engine.release();
        self.status.send_modify(|s| s.released = true);
    }
}

/// Handle to a running scheduler
pub struct SchedulerHandle {
    bridge: EventBridge,
    status: watch::Receiver<SchedulerStatus>,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Event stream sender, for wiring platform callbacks
    pub fn bridge(&self) -> EventBridge {
        self.bridge.clone()
    }

    pub fn listener(&self, source: PipelineId) -> PipelineListener {
        self.bridge.for_pipeline(source)
    }

    /// Push one pipeline event; returns false when the scheduler has stopped
    pub fn notify(&self, event: PipelineEvent) -> bool {
        self.bridge.send(event)
    }

    /// Set the playlist used for rule resolution; `None` disables crossfading
    pub fn set_playlist(&self, playlist_id: Option<String>) -> bool {
        self.bridge.send_command(SchedulerCommand::SetPlaylist(playlist_id))
    }

    pub fn status(&self) -> SchedulerStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerStatus> {
        self.status.clone()
    }

    /// Wait until the published status satisfies `predicate`
    pub async fn wait_for(&self, predicate: impl FnMut(&SchedulerStatus) -> bool) -> SchedulerStatus {
        let mut rx = self.status.clone();
        if let Ok(status) = rx.wait_for(predicate).await {
            return status.clone();
        }
        // Scheduler gone; the last value is final
        let status = rx.borrow().clone();
        status
    }

    /// Cancel any task, release the engine, and stop the loop (idempotent)
    pub async fn shutdown(&mut self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.bridge.send_command(SchedulerCommand::Shutdown(ack_tx)) {
            let _ = ack_rx.await;
        }
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                warn!("Scheduler task ended abnormally: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::events::TransitionReason;
    use crate::playback::pipeline::{HandOff, MediaCatalog, SimulatedPipeline};
    use crate::playback::rules::RuleTable;
    use segue_common::{EnvelopeCurve, TransitionSettings};

    fn item(id: &str) -> MediaItem {
        MediaItem::new(id, format!("sim://{}", id))
    }

    /// Scheduler over a playing `a, b, c` session, plus a receiver for its status
    fn scheduler() -> (
        TransitionScheduler<SimulatedPipeline>,
        watch::Receiver<SchedulerStatus>,
    ) {
        let catalog = MediaCatalog::new();
        for id in ["a", "b", "c"] {
            catalog.insert(&item(id), 30_000);
        }
        let primary = SimulatedPipeline::new("primary", catalog.clone());
        let secondary = SimulatedPipeline::new("secondary", catalog);
        primary.set_queue(&[item("a"), item("b"), item("c")]);
        let mut session = primary.clone();
        session.play().unwrap();

        let engine = Arc::new(DualPipelineEngine::new(primary, secondary, TimingConfig::default()));
        let (finished_tx, _) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SchedulerStatus::default());
        let settings = TransitionSettings::crossfade(4000, EnvelopeCurve::Linear, EnvelopeCurve::Linear);

        let scheduler = TransitionScheduler {
            is_playing: engine.is_master_playing(),
            engine,
            resolver: Arc::new(RuleTable::uniform(settings)),
            timing: TimingConfig::default(),
            playlist_id: Some("mix".to_string()),
            active: None,
            status: Arc::new(status_tx),
            finished_tx,
        };
        (scheduler, status_rx)
    }

    /// Stand-in for a task whose ramp finished just before the scheduler cancelled it
    fn already_handed_off() -> ActiveTask {
        let hand_off = HandOff {
            item: item("b"),
            position_ms: 4000,
            master: PipelineId::Secondary,
        };
        ActiveTask {
            id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
            handle: tokio::spawn(async move { TaskOutcome::Completed(hand_off) }),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hand_off_beating_error_cancel_rearms() {
        let (mut scheduler, status) = scheduler();
        assert!(scheduler.is_playing);
        scheduler.active = Some(already_handed_off());

        scheduler
            .handle_event(PipelineEvent::error(PipelineId::Primary, "device lost"))
            .await;

        let snapshot = status.borrow().clone();
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.cancelled, 0);
        assert_eq!(snapshot.armed, 1);
        assert_eq!(snapshot.state, SchedulerState::Armed);
        assert_eq!(snapshot.last_hand_off, Some(item("b")));
        assert!(scheduler.active.is_some(), "current master item has a task again");

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_hand_off_beating_pause_waits_for_resume() {
        let (mut scheduler, status) = scheduler();
        scheduler.active = Some(already_handed_off());

        scheduler
            .handle_event(PipelineEvent::is_playing_changed(PipelineId::Primary, false))
            .await;

        let snapshot = status.borrow().clone();
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.armed, 0);
        assert_eq!(snapshot.state, SchedulerState::Idle);
        assert!(scheduler.active.is_none());

        scheduler
            .handle_event(PipelineEvent::is_playing_changed(PipelineId::Primary, true))
            .await;
        assert_eq!(status.borrow().armed, 1);
        assert!(scheduler.active.is_some());

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_change_while_paused_is_not_armed() {
        let (mut scheduler, status) = scheduler();
        scheduler.is_playing = false;

        scheduler
            .handle_event(PipelineEvent::item_transitioned(
                PipelineId::Primary,
                Some(item("b")),
                TransitionReason::Seek,
            ))
            .await;

        assert_eq!(status.borrow().armed, 0);
        assert!(scheduler.active.is_none());
    }
}
