//! Leaf implementations backed by a native shell.
//!
//! The shell owns the microphone, the recognizer, the wake detector and the
//! speaker. These leaves turn controller calls into event envelopes the shell
//! acts on; the shell reports results back as host commands.

use crate::error::Result;
use crate::host::contract::{EventEnvelope, events};
use crate::stt::TranscriptionSource;
use crate::tts::{HandleSequence, PlaybackHandle, SpeechPlayer};
use crate::wakeword::WakeDetector;
use tokio::sync::broadcast;

/// Cloneable publisher of host event envelopes.
#[derive(Debug, Clone)]
pub struct HostEvents {
    tx: broadcast::Sender<EventEnvelope>,
}

impl HostEvents {
    pub fn new(tx: broadcast::Sender<EventEnvelope>) -> Self {
        Self { tx }
    }

    /// Publish an event. Having no subscriber yet is not an error.
    pub fn emit(&self, event: &str, payload: serde_json::Value) {
        let envelope =
            EventEnvelope::new(uuid::Uuid::new_v4().to_string(), event.to_owned(), payload);
        let _ = self.tx.send(envelope);
    }

    pub fn sender(&self) -> broadcast::Sender<EventEnvelope> {
        self.tx.clone()
    }
}

/// Asks the shell to speak; completion comes back as `playback.finished`.
#[derive(Debug)]
pub struct HostSpeechPlayer {
    events: HostEvents,
    handles: HandleSequence,
}

impl HostSpeechPlayer {
    pub fn new(events: HostEvents) -> Self {
        Self {
            events,
            handles: HandleSequence::new(),
        }
    }
}

impl SpeechPlayer for HostSpeechPlayer {
    fn speak(&mut self, text: &str) -> Result<PlaybackHandle> {
        let handle = self.handles.next_handle();
        self.events.emit(
            events::PLAYBACK_SPEAK,
            serde_json::json!({"handle": handle, "text": text}),
        );
        Ok(handle)
    }

    fn cancel(&mut self, handle: PlaybackHandle) {
        self.events.emit(
            events::PLAYBACK_CANCEL,
            serde_json::json!({"handle": handle}),
        );
    }
}

#[derive(Debug)]
pub struct HostTranscription {
    events: HostEvents,
}

impl HostTranscription {
    pub fn new(events: HostEvents) -> Self {
        Self { events }
    }
}

impl TranscriptionSource for HostTranscription {
    fn start(&mut self, language: &str) -> Result<()> {
        self.events.emit(
            events::TRANSCRIPTION_START,
            serde_json::json!({"language": language}),
        );
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.events
            .emit(events::TRANSCRIPTION_PAUSE, serde_json::json!({}));
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.events
            .emit(events::TRANSCRIPTION_RESUME, serde_json::json!({}));
        Ok(())
    }

    fn stop(&mut self) {
        self.events
            .emit(events::TRANSCRIPTION_STOP, serde_json::json!({}));
    }
}

#[derive(Debug)]
pub struct HostWakeDetector {
    events: HostEvents,
}

impl HostWakeDetector {
    pub fn new(events: HostEvents) -> Self {
        Self { events }
    }
}

impl WakeDetector for HostWakeDetector {
    fn arm(&mut self) -> Result<()> {
        self.events.emit(events::WAKE_ARM, serde_json::json!({}));
        Ok(())
    }

    fn disarm(&mut self) {
        self.events.emit(events::WAKE_DISARM, serde_json::json!({}));
    }
}
