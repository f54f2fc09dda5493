//! Error types for the interaction controller.

/// Top-level error type for the conversation controller and its leaves.
#[derive(Debug, thiserror::Error)]
pub enum InteractionError {
    /// Microphone capture or transcription leaf error.
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Speech playback leaf error.
    #[error("playback error: {0}")]
    Playback(String),

    /// Wake detector leaf error.
    #[error("wake detector error: {0}")]
    Wake(String),

    /// Response generation error that escaped the fallback chain.
    #[error("generation error: {0}")]
    Generation(#[from] crate::llm::error::GenerationError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// A session command was issued in a state that cannot accept it.
    #[error("session error: {0}")]
    Session(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// Host bridge protocol error.
    #[error("host protocol error: {0}")]
    Protocol(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, InteractionError>;
