//! Transcription lifecycle.
//!
//! The streaming recognizer itself lives outside this crate behind
//! [`TranscriptionSource`]. [`TranscriptionAdapter`] wraps it with the
//! lifecycle the controller relies on: the microphone is opened once per
//! session, paused and resumed around playback without being released, and
//! closed only at session end or after a fatal failure.

use crate::config::TranscriptionConfig;
use crate::error::Result;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A streaming speech-to-text engine bound to the microphone.
///
/// Deltas and input levels are posted to the controller inbox by the
/// implementation; these calls only steer its lifecycle.
pub trait TranscriptionSource: Send {
    /// Acquire the microphone and begin emitting deltas in `language`.
    fn start(&mut self, language: &str) -> Result<()>;

    /// Stop emitting deltas without releasing the capture device.
    fn pause(&mut self) -> Result<()>;

    /// Restore delta emission after [`pause`](Self::pause).
    fn resume(&mut self) -> Result<()>;

    /// Release the microphone.
    fn stop(&mut self);
}

/// Lifecycle state of the wrapped source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Stopped,
    Capturing,
    Paused,
}

/// Idempotent lifecycle wrapper around a [`TranscriptionSource`].
pub struct TranscriptionAdapter {
    source: Box<dyn TranscriptionSource>,
    state: CaptureState,
    resume_budget: Duration,
}

impl std::fmt::Debug for TranscriptionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptionAdapter")
            .field("state", &self.state)
            .field("resume_budget", &self.resume_budget)
            .finish()
    }
}

impl TranscriptionAdapter {
    pub fn new(source: Box<dyn TranscriptionSource>, config: &TranscriptionConfig) -> Self {
        Self {
            source,
            state: CaptureState::Stopped,
            resume_budget: Duration::from_millis(config.resume_budget_ms),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Deltas are only meaningful while capturing; paused or stopped
    /// capture drops them.
    pub fn accepts_deltas(&self) -> bool {
        self.state == CaptureState::Capturing
    }

    /// Open the microphone. A no-op unless stopped.
    ///
    /// # Errors
    ///
    /// Propagates the source's failure; the adapter stays stopped.
    pub fn start(&mut self, language: &str) -> Result<()> {
        if self.state != CaptureState::Stopped {
            debug!(state = ?self.state, "transcription already started");
            return Ok(());
        }
        self.source.start(language)?;
        self.state = CaptureState::Capturing;
        info!(language, "transcription started");
        Ok(())
    }

    /// Pause delta emission. A no-op unless capturing.
    ///
    /// # Errors
    ///
    /// Propagates the source's failure.
    pub fn pause(&mut self) -> Result<()> {
        if self.state != CaptureState::Capturing {
            return Ok(());
        }
        self.source.pause()?;
        self.state = CaptureState::Paused;
        debug!("transcription paused");
        Ok(())
    }

    /// Resume delta emission. A no-op unless paused.
    ///
    /// # Errors
    ///
    /// Propagates the source's failure; the controller treats it as fatal.
    pub fn resume(&mut self) -> Result<()> {
        if self.state != CaptureState::Paused {
            return Ok(());
        }
        let started = Instant::now();
        self.source.resume()?;
        self.state = CaptureState::Capturing;

        let elapsed = started.elapsed();
        if elapsed > self.resume_budget {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = self.resume_budget.as_millis() as u64,
                "transcription resume exceeded its latency budget"
            );
        } else {
            debug!(elapsed_ms = elapsed.as_millis() as u64, "transcription resumed");
        }
        Ok(())
    }

    /// Release the microphone. A no-op when already stopped.
    pub fn stop(&mut self) {
        if self.state == CaptureState::Stopped {
            return;
        }
        self.source.stop();
        self.state = CaptureState::Stopped;
        info!("transcription stopped");
    }
}
