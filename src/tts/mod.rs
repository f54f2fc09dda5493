//! Speech playback.
//!
//! The synthesis engine lives outside this crate behind [`SpeechPlayer`].
//! [`PlaybackSlot`] enforces that at most one playback handle is live: any
//! live handle is cancelled before a new one is started.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Opaque token for one playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaybackHandle(u64);

impl PlaybackHandle {
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PlaybackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "play-{}", self.0)
    }
}

/// Hands out increasing playback handles for player implementations.
#[derive(Debug, Default)]
pub struct HandleSequence {
    last: u64,
}

impl HandleSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_handle(&mut self) -> PlaybackHandle {
        self.last += 1;
        PlaybackHandle(self.last)
    }
}

/// A text-to-speech playback engine.
///
/// Completion is reported asynchronously as
/// [`LeafEvent::PlaybackFinished`](crate::pipeline::messages::LeafEvent::PlaybackFinished).
pub trait SpeechPlayer: Send {
    /// Start speaking `text`.
    fn speak(&mut self, text: &str) -> Result<PlaybackHandle>;

    /// Stop audio for `handle`. Must be safe at any time, including after
    /// the playback already ended.
    fn cancel(&mut self, handle: PlaybackHandle);
}

/// Owns the player and the single live handle.
pub struct PlaybackSlot {
    player: Box<dyn SpeechPlayer>,
    live: Option<PlaybackHandle>,
}

impl std::fmt::Debug for PlaybackSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSlot").field("live", &self.live).finish()
    }
}

impl PlaybackSlot {
    pub fn new(player: Box<dyn SpeechPlayer>) -> Self {
        Self { player, live: None }
    }

    /// Cancel whatever is live, then start `text`.
    ///
    /// # Errors
    ///
    /// Propagates the player's failure; the slot is left empty.
    pub fn start(&mut self, text: &str) -> Result<PlaybackHandle> {
        self.cancel();
        let handle = self.player.speak(text)?;
        self.live = Some(handle);
        info!(%handle, chars = text.chars().count(), "playback started");
        Ok(handle)
    }

    /// Cancel the live handle, if any. Idempotent.
    pub fn cancel(&mut self) -> Option<PlaybackHandle> {
        let handle = self.live.take()?;
        self.player.cancel(handle);
        debug!(%handle, "playback cancelled");
        Some(handle)
    }

    /// Forget `handle` after the player reported it ended. Returns `false`
    /// when `handle` is not the live one (a stale report).
    pub fn release(&mut self, handle: PlaybackHandle) -> bool {
        if self.live == Some(handle) {
            self.live = None;
            true
        } else {
            false
        }
    }

    /// Drop the live handle without calling the player (it is gone).
    pub fn abandon(&mut self) -> Option<PlaybackHandle> {
        self.live.take()
    }

    pub fn live(&self) -> Option<PlaybackHandle> {
        self.live
    }

    pub fn is_live(&self, handle: PlaybackHandle) -> bool {
        self.live == Some(handle)
    }
}
