//! Versioned host command/event envelopes for native shell integration.

use serde::{Deserialize, Serialize};

/// Contract version for host command/event envelopes.
pub const EVENT_VERSION: u32 = 1;

/// Commands a native shell can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandName {
    #[serde(rename = "host.ping")]
    HostPing,
    #[serde(rename = "host.version")]
    HostVersion,
    #[serde(rename = "session.start")]
    SessionStart,
    #[serde(rename = "session.end")]
    SessionEnd,
    #[serde(rename = "session.interrupt")]
    SessionInterrupt,
    #[serde(rename = "session.activate")]
    SessionActivate,
    #[serde(rename = "session.cancel")]
    SessionCancel,
    #[serde(rename = "session.rearm")]
    SessionRearm,
    #[serde(rename = "session.status")]
    SessionStatus,
    #[serde(rename = "wake.detected")]
    WakeDetected,
    #[serde(rename = "transcript.delta")]
    TranscriptDelta,
    #[serde(rename = "transcript.level")]
    TranscriptLevel,
    #[serde(rename = "transcript.fatal")]
    TranscriptFatal,
    #[serde(rename = "playback.finished")]
    PlaybackFinished,
    #[serde(rename = "playback.failed")]
    PlaybackFailed,
}

impl CommandName {
    /// Render command name to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HostPing => "host.ping",
            Self::HostVersion => "host.version",
            Self::SessionStart => "session.start",
            Self::SessionEnd => "session.end",
            Self::SessionInterrupt => "session.interrupt",
            Self::SessionActivate => "session.activate",
            Self::SessionCancel => "session.cancel",
            Self::SessionRearm => "session.rearm",
            Self::SessionStatus => "session.status",
            Self::WakeDetected => "wake.detected",
            Self::TranscriptDelta => "transcript.delta",
            Self::TranscriptLevel => "transcript.level",
            Self::TranscriptFatal => "transcript.fatal",
            Self::PlaybackFinished => "playback.finished",
            Self::PlaybackFailed => "playback.failed",
        }
    }

    /// Parse a command name from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "host.ping" => Some(Self::HostPing),
            "host.version" => Some(Self::HostVersion),
            "session.start" => Some(Self::SessionStart),
            "session.end" => Some(Self::SessionEnd),
            "session.interrupt" => Some(Self::SessionInterrupt),
            "session.activate" => Some(Self::SessionActivate),
            "session.cancel" => Some(Self::SessionCancel),
            "session.rearm" => Some(Self::SessionRearm),
            "session.status" => Some(Self::SessionStatus),
            "wake.detected" => Some(Self::WakeDetected),
            "transcript.delta" => Some(Self::TranscriptDelta),
            "transcript.level" => Some(Self::TranscriptLevel),
            "transcript.fatal" => Some(Self::TranscriptFatal),
            "playback.finished" => Some(Self::PlaybackFinished),
            "playback.failed" => Some(Self::PlaybackFailed),
            _ => None,
        }
    }
}

/// Event names emitted to the native shell.
pub mod events {
    pub const STATE_CHANGED: &str = "state.changed";
    pub const TRANSCRIPT_PARTIAL: &str = "transcript.partial";
    pub const TURN_COMMITTED: &str = "turn.committed";
    pub const ERROR_SURFACED: &str = "error.surfaced";
    pub const BARGE_IN: &str = "barge_in";

    /// Leaf instructions: the shell performs these on the device.
    pub const PLAYBACK_SPEAK: &str = "playback.speak";
    pub const PLAYBACK_CANCEL: &str = "playback.cancel";
    pub const TRANSCRIPTION_START: &str = "transcription.start";
    pub const TRANSCRIPTION_PAUSE: &str = "transcription.pause";
    pub const TRANSCRIPTION_RESUME: &str = "transcription.resume";
    pub const TRANSCRIPTION_STOP: &str = "transcription.stop";
    pub const WAKE_ARM: &str = "wake.arm";
    pub const WAKE_DISARM: &str = "wake.disarm";
}

/// A versioned response envelope from backend host -> frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Build a successful response envelope.
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    /// Build an error response envelope.
    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// A versioned command envelope from frontend -> backend host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u32,
    pub request_id: String,
    pub command: CommandName,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl CommandEnvelope {
    /// Build a v1 command envelope.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        command: CommandName,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            command,
            payload,
        }
    }

    /// Validate envelope version and required identifiers.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != EVENT_VERSION {
            return Err(ContractError::new(
                ContractErrorKind::UnsupportedVersion,
                format!(
                    "unsupported contract version {}; expected {}",
                    self.v, EVENT_VERSION
                ),
            ));
        }
        if self.request_id.trim().is_empty() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidEnvelope,
                "request_id cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

/// A versioned event envelope from backend host -> frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Build a v1 event envelope.
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            event_id: event_id.into(),
            event: event.into(),
            payload,
        }
    }
}

/// Contract validation error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidEnvelope,
    InvalidPayload,
}

/// Contract validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct ContractError {
    pub kind: ContractErrorKind,
    pub message: String,
}

impl ContractError {
    #[must_use]
    pub fn new(kind: ContractErrorKind, message: String) -> Self {
        Self { kind, message }
    }

    pub(crate) fn payload(message: impl Into<String>) -> Self {
        Self::new(ContractErrorKind::InvalidPayload, message.into())
    }
}

impl From<ContractError> for crate::InteractionError {
    fn from(e: ContractError) -> Self {
        Self::Protocol(e.to_string())
    }
}
