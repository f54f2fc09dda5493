//! Message types delivered to the interaction controller inbox.
//!
//! Leaves never touch controller state. They post a [`LeafEvent`] through a
//! [`LeafEventSink`]; the app posts a [`SessionCommand`]. Both travel through
//! one serialized channel so the controller sees a single total order.

use crate::llm::GenerationId;
use crate::llm::error::GenerationError;
use crate::tts::PlaybackHandle;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Which collaborator raised an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leaf {
    Wake,
    Transcription,
    Player,
    Generator,
}

impl Leaf {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wake => "wake",
            Self::Transcription => "transcription",
            Self::Player => "player",
            Self::Generator => "generator",
        }
    }
}

/// A growing transcript buffer for the recognizer's current utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptDelta {
    /// Full text of the current recognizer utterance so far.
    pub text: String,
    /// The recognizer will not revise this text further.
    pub is_final: bool,
}

impl TranscriptDelta {
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Events raised by the leaves.
#[derive(Debug, Clone)]
pub enum LeafEvent {
    /// The wake phrase matched.
    WakeDetected,
    /// New transcript text for the current recognizer utterance.
    TranscriptDelta(TranscriptDelta),
    /// Microphone input amplitude (0.0..=1.0).
    InputLevel { rms: f32 },
    /// A generation request completed.
    GenerationFinished {
        id: GenerationId,
        outcome: Result<String, GenerationError>,
    },
    /// Playback ended, either at its natural end or because it was cut off.
    PlaybackFinished {
        handle: PlaybackHandle,
        completed_normally: bool,
    },
    /// Playback could not start or broke mid-way.
    PlaybackFailed {
        handle: PlaybackHandle,
        reason: String,
    },
    /// Unsolicited unrecoverable failure of a leaf.
    Fatal { leaf: Leaf, reason: String },
}

impl LeafEvent {
    /// Short label for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WakeDetected => "wake_detected",
            Self::TranscriptDelta(_) => "transcript_delta",
            Self::InputLevel { .. } => "input_level",
            Self::GenerationFinished { .. } => "generation_finished",
            Self::PlaybackFinished { .. } => "playback_finished",
            Self::PlaybackFailed { .. } => "playback_failed",
            Self::Fatal { .. } => "leaf_fatal",
        }
    }
}

/// Commands issued by the embedding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Begin a session; `language` falls back to the configured default.
    Start {
        language: Option<String>,
        greeting: Option<String>,
    },
    End,
    /// Manual barge-in.
    Interrupt,
    /// Manual wake.
    Activate,
    /// Abandon the current exchange and return to standby.
    Cancel,
    /// Leave the disabled state after a transcription failure.
    Rearm,
}

/// Everything the controller inbox carries.
#[derive(Debug, Clone)]
pub enum ControllerMessage {
    Leaf(LeafEvent),
    Command(SessionCommand),
}

impl From<LeafEvent> for ControllerMessage {
    fn from(event: LeafEvent) -> Self {
        Self::Leaf(event)
    }
}

impl From<SessionCommand> for ControllerMessage {
    fn from(command: SessionCommand) -> Self {
        Self::Command(command)
    }
}

/// Cloneable handle leaves use to post events to the controller.
#[derive(Debug, Clone)]
pub struct LeafEventSink {
    tx: mpsc::UnboundedSender<ControllerMessage>,
}

impl LeafEventSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ControllerMessage>) -> Self {
        Self { tx }
    }

    /// Post an event. Returns `false` once the controller has shut down.
    pub fn post(&self, event: LeafEvent) -> bool {
        self.tx.send(ControllerMessage::Leaf(event)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
