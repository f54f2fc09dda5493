//! Interlocutor: a turn-taking controller for hands-free spoken
//! conversations with an LLM.
//!
//! The crate decides *when* to listen, *when* the user has finished
//! speaking, *when* to ask a model for a reply, and *what* to abandon when
//! the user talks over the assistant:
//!
//! Wake → Listening → (silence) → Thinking → Responding → Standby
//!
//! # Architecture
//!
//! - **Controller** ([`pipeline::coordinator`]): a synchronous state machine
//!   that owns all conversation state. Every input arrives through one inbox.
//! - **Runner** ([`pipeline::runner`]): drives the controller from a tokio
//!   task, waking for inbox messages and controller timers.
//! - **Leaves**: transcription ([`stt`]), playback ([`tts`]), wake detection
//!   ([`wakeword`]) and generation ([`llm`]) sit behind traits and report
//!   back by posting events to the inbox.
//! - **Host** ([`host`]): a versioned NDJSON contract so a native shell can
//!   own the audio devices while this crate owns the conversation.

pub mod app_dirs;
pub mod config;
pub mod conversation;
pub mod error;
pub mod host;
pub mod llm;
pub mod pipeline;
pub mod runtime;
pub mod stt;
pub mod tts;
pub mod wakeword;

pub use config::InteractionConfig;
pub use conversation::{ConversationTurn, Role};
pub use error::{InteractionError, Result};
pub use pipeline::coordinator::{ControllerLeaves, InteractionController};
pub use pipeline::messages::{LeafEvent, LeafEventSink, SessionCommand, TranscriptDelta};
pub use pipeline::runner::{ControllerHandle, ControllerInbox};
pub use pipeline::state::InteractionState;
pub use runtime::{ControllerSnapshot, RuntimeEvent, SurfacedError};
