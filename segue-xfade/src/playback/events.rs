//! Pipeline events and the bridge that orders them for the scheduler
//!
//! Platform pipelines report through callbacks. Each callback is translated
//! at the boundary into a [`PipelineEvent`] and pushed onto one unbounded
//! channel. The scheduler is the only consumer, so events are handled in the
//! order they arrived and never re-entrantly from inside a callback.

use segue_common::MediaItem;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::pipeline::PipelineId;

/// Why the platform moved to a different item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    /// Previous item ended and the queue advanced
    Auto,
    /// User skipped or sought into another item
    Seek,
    /// The queue was replaced
    PlaylistChanged,
    /// The same item started again
    Repeat,
    /// A crossfade hand-off made another item current on the Master
    Crossfade,
}

/// Event payload
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEventKind {
    /// Current item changed; `None` when the queue ran out
    ItemTransitioned {
        item: Option<MediaItem>,
        reason: TransitionReason,
    },

    IsPlayingChanged(bool),

    Error(String),
}

/// Event from one physical pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineEvent {
    pub source: PipelineId,
    pub kind: PipelineEventKind,
}

impl PipelineEvent {
    pub fn item_transitioned(source: PipelineId, item: Option<MediaItem>, reason: TransitionReason) -> Self {
        Self {
            source,
            kind: PipelineEventKind::ItemTransitioned { item, reason },
        }
    }

    pub fn is_playing_changed(source: PipelineId, playing: bool) -> Self {
        Self {
            source,
            kind: PipelineEventKind::IsPlayingChanged(playing),
        }
    }

    pub fn error(source: PipelineId, cause: impl Into<String>) -> Self {
        Self {
            source,
            kind: PipelineEventKind::Error(cause.into()),
        }
    }
}

/// Everything the scheduler's event loop consumes from outside
#[derive(Debug)]
pub enum SchedulerCommand {
    Pipeline(PipelineEvent),

    /// Playlist context used for rule resolution; `None` disables crossfading
    SetPlaylist(Option<String>),

    /// Cancel any task, release the engine, and stop the loop
    Shutdown(oneshot::Sender<()>),
}

/// Sending side of the scheduler's event stream
#[derive(Debug, Clone)]
pub struct EventBridge {
    tx: mpsc::UnboundedSender<SchedulerCommand>,
}

impl EventBridge {
    pub fn new(tx: mpsc::UnboundedSender<SchedulerCommand>) -> Self {
        Self { tx }
    }

    /// Callback surface for one physical pipeline
    pub fn for_pipeline(&self, source: PipelineId) -> PipelineListener {
        PipelineListener {
            source,
            bridge: self.clone(),
        }
    }

    /// Queue an event; returns false when the scheduler has stopped
    pub fn send(&self, event: PipelineEvent) -> bool {
        self.send_command(SchedulerCommand::Pipeline(event))
    }

    pub(crate) fn send_command(&self, command: SchedulerCommand) -> bool {
        match self.tx.send(command) {
            Ok(()) => true,
            Err(e) => {
                debug!("Scheduler stopped, dropping {:?}", e.0);
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Listener handed to a platform pipeline's callback registration
///
/// Each method maps one platform callback onto the ordered event stream.
#[derive(Debug, Clone)]
pub struct PipelineListener {
    source: PipelineId,
    bridge: EventBridge,
}

impl PipelineListener {
    pub fn source(&self) -> PipelineId {
        self.source
    }

    pub fn on_item_transitioned(&self, item: Option<MediaItem>, reason: TransitionReason) {
        self.bridge
            .send(PipelineEvent::item_transitioned(self.source, item, reason));
    }

    pub fn on_is_playing_changed(&self, playing: bool) {
        self.bridge
            .send(PipelineEvent::is_playing_changed(self.source, playing));
    }

    pub fn on_error(&self, cause: impl Into<String>) {
        self.bridge.send(PipelineEvent::error(self.source, cause));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listener_events_arrive_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let bridge = EventBridge::new(tx);
        let listener = bridge.for_pipeline(PipelineId::Secondary);
        let item = MediaItem::new("a", "sim://a");

        listener.on_item_transitioned(Some(item.clone()), TransitionReason::Auto);
        listener.on_is_playing_changed(false);
        listener.on_error("device lost");

        let expected = vec![
            PipelineEvent::item_transitioned(PipelineId::Secondary, Some(item), TransitionReason::Auto),
            PipelineEvent::is_playing_changed(PipelineId::Secondary, false),
            PipelineEvent::error(PipelineId::Secondary, "device lost"),
        ];
        for want in expected {
            match rx.recv().await {
                Some(SchedulerCommand::Pipeline(event)) => assert_eq!(event, want),
                other => panic!("Expected pipeline event, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = EventBridge::new(tx);
        drop(rx);

        assert!(bridge.is_closed());
        assert!(!bridge.send(PipelineEvent::is_playing_changed(PipelineId::Primary, true)));
    }
}
