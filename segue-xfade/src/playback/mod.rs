//! Crossfade playback: pipelines, the dual-pipeline engine, and the scheduler

pub mod events;
pub mod pipeline;
pub mod rules;
pub mod scheduler;

pub use events::{EventBridge, PipelineEvent, PipelineEventKind, PipelineListener, TransitionReason};
pub use pipeline::{
    DualPipelineEngine, HandOff, PipelineId, PlaybackPipeline, SlotRole, TransitionOutcome,
};
pub use rules::{RuleResolver, RuleTable};
pub use scheduler::{SchedulerHandle, SchedulerState, SchedulerStatus, TransitionScheduler};
