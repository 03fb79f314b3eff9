//! Transition task: one scheduled crossfade and the monitor that drives it

use segue_common::{MediaItem, TimingConfig, TransitionSettings};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{SchedulerState, SchedulerStatus};
use crate::error::{Error, Result};
use crate::playback::pipeline::{DualPipelineEngine, HandOff, PlaybackPipeline, TransitionOutcome};
use crate::playback::rules::RuleResolver;

/// Lifecycle state of a transition task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Created; settings being resolved and duration awaited
    Armed,
    /// Transition point known; waiting for playback to reach it
    Waiting,
    /// Ramp running in the engine
    Executing,
    Cancelled,
    Completed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Cancelled | TaskState::Completed)
    }

    fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;
        match (self, next) {
            (Armed, Waiting) | (Waiting, Executing) | (Executing, Completed) => true,
            (Armed | Waiting | Executing, Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Armed => write!(f, "armed"),
            TaskState::Waiting => write!(f, "waiting"),
            TaskState::Executing => write!(f, "executing"),
            TaskState::Cancelled => write!(f, "cancelled"),
            TaskState::Completed => write!(f, "completed"),
        }
    }
}

impl From<TaskState> for SchedulerState {
    fn from(state: TaskState) -> Self {
        match state {
            TaskState::Armed => SchedulerState::Armed,
            TaskState::Waiting => SchedulerState::Waiting,
            TaskState::Executing => SchedulerState::Executing,
            TaskState::Cancelled => SchedulerState::Cancelled,
            TaskState::Completed => SchedulerState::Idle,
        }
    }
}

/// One scheduled crossfade from `from_item` into `to_item`
#[derive(Debug, Clone, Serialize)]
pub struct TransitionTask {
    pub id: Uuid,
    pub from_item: MediaItem,
    pub to_item: Option<MediaItem>,
    pub settings: Option<TransitionSettings>,

    /// `duration - settings.duration_ms`, known once the duration is
    pub transition_point_ms: Option<u64>,

    pub state: TaskState,
}

impl TransitionTask {
    pub fn new(from_item: MediaItem, to_item: Option<MediaItem>) -> Self {
        Self {
            id: Uuid::new_v4(),
            from_item,
            to_item,
            settings: None,
            transition_point_ms: None,
            state: TaskState::Armed,
        }
    }

    /// Move to `next`; terminal states cannot be left
    pub fn transition_to(&mut self, next: TaskState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidState(format!(
                "task {} cannot go from {} to {}",
                self.id, self.state, next
            )));
        }
        debug!(task_id = %self.id, from = %self.state, to = %next, "Task state change");
        self.state = next;
        Ok(())
    }
}

/// Why a task ended without crossfading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No playlist context for rule resolution
    NoPlaylist,
    /// Nothing queued after the current item
    NoNextItem,
    /// Resolved settings call for no transition
    NotConfigured,
    /// Playback was already past the transition point, or the fade is longer than the track
    TooLate,
    /// The engine found nothing prepared on the auxiliary slot
    NothingPrepared,
}

/// How a task ended
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Skipped(SkipReason),
    Cancelled,
    Completed(HandOff),
    /// Recoverable failure; playback continues without a crossfade
    Failed(String),
}

/// Everything a running task needs from the scheduler
pub(crate) struct TaskContext<P> {
    pub engine: Arc<DualPipelineEngine<P>>,
    pub resolver: Arc<dyn RuleResolver>,
    pub playlist_id: Option<String>,
    pub timing: TimingConfig,
    pub status: Arc<watch::Sender<SchedulerStatus>>,
}

impl<P> TaskContext<P> {
    fn publish(&self, task: &TransitionTask) {
        self.status.send_modify(|status| {
            if status.task_id == Some(task.id) {
                status.state = task.state.into();
                status.transition_point_ms = task.transition_point_ms;
            }
        });
    }

    fn advance(&self, task: &mut TransitionTask, next: TaskState) {
        if let Err(e) = task.transition_to(next) {
            warn!("{}", e);
        }
        self.publish(task);
    }
}

/// Sleep for `duration` unless cancelled first; returns true when cancelled
async fn sleep_or_cancelled(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

/// Drive a task from Armed to a final outcome
///
/// Every wait re-checks `cancel` on wake, so cancellation latency is bounded
/// by one poll interval (or one ramp tick while executing).
pub(crate) async fn run_task<P: PlaybackPipeline>(
    mut task: TransitionTask,
    ctx: TaskContext<P>,
    cancel: CancellationToken,
) -> TaskOutcome {
    let outcome = monitor(&mut task, &ctx, &cancel).await;

    if outcome == TaskOutcome::Cancelled && !task.state.is_terminal() {
        ctx.advance(&mut task, TaskState::Cancelled);
    }
    info!(task_id = %task.id, from = %task.from_item, state = %task.state, outcome = ?outcome, "Transition task finished");
    outcome
}

async fn monitor<P: PlaybackPipeline>(
    task: &mut TransitionTask,
    ctx: &TaskContext<P>,
    cancel: &CancellationToken,
) -> TaskOutcome {
    let Some(playlist_id) = ctx.playlist_id.as_deref() else {
        debug!(task_id = %task.id, "No playlist context, no transition");
        return TaskOutcome::Skipped(SkipReason::NoPlaylist);
    };
    let Some(to_item) = task.to_item.clone() else {
        debug!(task_id = %task.id, "Nothing queued after {}, no transition", task.from_item);
        return TaskOutcome::Skipped(SkipReason::NoNextItem);
    };

    // Resolve settings
    let resolved = tokio::select! {
        biased;
        _ = cancel.cancelled() => return TaskOutcome::Cancelled,
        resolved = ctx.resolver.resolve(
            playlist_id,
            Some(task.from_item.media_id.as_str()),
            Some(to_item.media_id.as_str()),
        ) => resolved,
    };
    let settings = match resolved {
        Ok(settings) => settings,
        Err(e) => {
            warn!(task_id = %task.id, error = %e, "Rule resolution failed, playing next track normally");
            return TaskOutcome::Failed(e.to_string());
        }
    };
    task.settings = Some(settings);
    if !settings.is_active() {
        debug!(task_id = %task.id, mode = %settings.mode, duration_ms = settings.duration_ms, "No transition configured");
        return TaskOutcome::Skipped(SkipReason::NotConfigured);
    }

    // Buffer the next item now so loading overlaps with the wait
    if let Err(e) = ctx.engine.prepare_next(&to_item) {
        warn!(task_id = %task.id, error = %e, "Failed to prepare next item, playing next track normally");
        return TaskOutcome::Failed(e.to_string());
    }

    // Wait for a known duration
    let duration_ms = loop {
        if cancel.is_cancelled() {
            return TaskOutcome::Cancelled;
        }
        if let Some(duration_ms) = ctx.engine.master_duration_ms() {
            break duration_ms;
        }
        if sleep_or_cancelled(ctx.timing.duration_poll(), cancel).await {
            return TaskOutcome::Cancelled;
        }
    };

    let Some(transition_point_ms) = settings.transition_point_ms(duration_ms) else {
        info!(task_id = %task.id, duration_ms, fade_ms = settings.duration_ms, "Crossfade longer than track, skipping");
        return TaskOutcome::Skipped(SkipReason::TooLate);
    };
    let position_ms = ctx.engine.master_position_ms();
    if transition_point_ms <= position_ms {
        info!(task_id = %task.id, transition_point_ms, position_ms, "Already past transition point, skipping");
        return TaskOutcome::Skipped(SkipReason::TooLate);
    }

    task.transition_point_ms = Some(transition_point_ms);
    ctx.advance(task, TaskState::Waiting);
    info!(
        task_id = %task.id,
        from = %task.from_item,
        to = %to_item,
        duration_ms,
        transition_point_ms,
        "Waiting for transition point"
    );

    // Wait for the transition point
    loop {
        if sleep_or_cancelled(ctx.timing.position_poll(), cancel).await {
            return TaskOutcome::Cancelled;
        }
        let position_ms = ctx.engine.master_position_ms();
        if position_ms >= transition_point_ms {
            debug!(task_id = %task.id, position_ms, "Reached transition point");
            break;
        }
    }

    ctx.advance(task, TaskState::Executing);
    match ctx.engine.perform_transition_cancellable(settings, cancel).await {
        Ok(TransitionOutcome::Completed(hand_off)) => {
            ctx.advance(task, TaskState::Completed);
            TaskOutcome::Completed(hand_off)
        }
        Ok(TransitionOutcome::Cancelled) => TaskOutcome::Cancelled,
        Ok(TransitionOutcome::NothingToTransition) => TaskOutcome::Skipped(SkipReason::NothingPrepared),
        Ok(TransitionOutcome::Skipped) => TaskOutcome::Skipped(SkipReason::NotConfigured),
        Err(e) => {
            warn!(task_id = %task.id, error = %e, "Crossfade failed, playing next track normally");
            TaskOutcome::Failed(e.to_string())
        }
    }
}
