//! Observable controller state for UI and observability.
//!
//! The controller publishes a [`ControllerSnapshot`] through a `watch`
//! channel (latest value wins) and discrete [`RuntimeEvent`]s through a
//! `broadcast` channel. Publishing never blocks the controller.

use crate::conversation::ConversationTurn;
use crate::llm::GenerationId;
use crate::pipeline::state::InteractionState;
use crate::tts::PlaybackHandle;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

/// Category of a user-visible failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Every generation backend failed or the request timed out.
    GenerationExhausted,
    /// Playback could not start or broke.
    PlaybackFailed,
    /// Transcription failed; the controller is disabled until rearmed.
    TranscriptionFatal,
    /// The wake detector failed; manual activation still works.
    WakeUnavailable,
}

/// An error the app should show to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfacedError {
    pub kind: ErrorKind,
    pub message: String,
    /// Whether the loop keeps running without user action.
    pub recoverable: bool,
}

impl SurfacedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            recoverable: kind != ErrorKind::TranscriptionFatal,
        }
    }
}

/// What caused a barge-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BargeInTrigger {
    /// Non-trivial transcript text.
    Speech,
    /// Input level above the barge-in threshold while transcripts were paused.
    Level,
    /// `interrupt()` from the app.
    Manual,
}

/// Latest controller state, as seen by the app.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControllerSnapshot {
    /// `None` when no session is running.
    pub state: Option<InteractionState>,
    pub partial_transcript: String,
    pub input_level: f32,
    pub last_error: Option<SurfacedError>,
    pub history: Vec<ConversationTurn>,
    pub language: Option<String>,
    pub generation_id: Option<GenerationId>,
    pub playback_handle: Option<PlaybackHandle>,
}

/// Discrete things that happened, in controller order.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    StateChanged {
        from: Option<InteractionState>,
        to: Option<InteractionState>,
    },
    PartialTranscript { text: String },
    TurnCommitted(ConversationTurn),
    BargeIn { trigger: BargeInTrigger },
    ErrorSurfaced(SurfacedError),
    GenerationIssued { id: GenerationId },
    /// A result arrived for an id that is no longer current.
    StaleResultDropped { what: &'static str },
    PlaybackStarted { handle: PlaybackHandle },
}

/// Publishing side of the observable state.
#[derive(Debug)]
pub struct StateObserver {
    state_tx: watch::Sender<ControllerSnapshot>,
    events_tx: broadcast::Sender<RuntimeEvent>,
}

impl StateObserver {
    pub fn new(event_capacity: usize) -> Self {
        let (state_tx, _) = watch::channel(ControllerSnapshot::default());
        let (events_tx, _) = broadcast::channel(event_capacity.max(1));
        Self {
            state_tx,
            events_tx,
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut ControllerSnapshot)) {
        self.state_tx.send_modify(f);
    }

    pub fn emit(&self, event: RuntimeEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ControllerSnapshot> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.events_tx.subscribe()
    }

    pub fn events_sender(&self) -> broadcast::Sender<RuntimeEvent> {
        self.events_tx.clone()
    }
}
