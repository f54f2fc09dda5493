//! Externally visible interaction states and the listening accumulator.

use crate::pipeline::messages::TranscriptDelta;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Where the conversation loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionState {
    /// Capture running, wake detector armed, nothing accumulated.
    Standby,
    /// Accumulating the user's utterance.
    Listening,
    /// Waiting for a generated response.
    Thinking,
    /// Speaking the response.
    Responding,
    /// Transcription failed; an explicit rearm is required.
    Disabled,
}

impl InteractionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standby => "standby",
            Self::Listening => "listening",
            Self::Thinking => "thinking",
            Self::Responding => "responding",
            Self::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for InteractionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transcript accumulated during one listening phase.
///
/// Deltas are growing buffers for the recognizer's current utterance, so a
/// partial replaces the previous partial. A final delta seals its text into
/// the committed segments and the next delta starts a new buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Utterance {
    committed: Vec<String>,
    partial: String,
    last_changed_at: Option<Instant>,
    is_final: bool,
}

impl Utterance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh accumulator holding `delta`.
    pub fn seeded(delta: &TranscriptDelta, now: Instant) -> Self {
        let mut utterance = Self::new();
        utterance.apply(delta, now);
        utterance
    }

    /// Fold a delta in. Blank deltas are ignored and do not restart the
    /// silence countdown. Returns whether the accumulator changed.
    pub fn apply(&mut self, delta: &TranscriptDelta, now: Instant) -> bool {
        let text = delta.text.trim();
        if text.is_empty() {
            return false;
        }
        if delta.is_final {
            self.committed.push(text.to_owned());
            self.partial.clear();
        } else {
            self.partial = text.to_owned();
        }
        self.is_final = delta.is_final;
        self.last_changed_at = Some(now);
        true
    }

    /// Full text: committed segments followed by the live partial.
    pub fn text(&self) -> String {
        let mut parts: Vec<&str> = self.committed.iter().map(String::as_str).collect();
        if !self.partial.is_empty() {
            parts.push(&self.partial);
        }
        parts.join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.partial.is_empty()
    }

    pub fn last_changed_at(&self) -> Option<Instant> {
        self.last_changed_at
    }

    /// Whether the most recent delta was final.
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// When the silence timer fires, if there is anything to send.
    pub fn silence_deadline(&self, threshold: Duration) -> Option<Instant> {
        if self.is_empty() {
            return None;
        }
        self.last_changed_at.map(|at| at + threshold)
    }
}
