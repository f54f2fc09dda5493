//! Host handler wired to a running interaction controller.
//!
//! [`spawn_host_runtime`] builds the whole conversation loop for a native
//! shell: generation backends from config, shell-backed leaves, the
//! controller task, and a bridge that forwards [`RuntimeEvent`]s to the
//! shell as event envelopes.

use crate::config::InteractionConfig;
use crate::error::{InteractionError, Result};
use crate::host::channel::SessionHostHandler;
use crate::host::contract::events;
use crate::host::leaves::{HostEvents, HostSpeechPlayer, HostTranscription, HostWakeDetector};
use crate::llm::{ResponseGenerator, TaskDispatcher};
use crate::pipeline::coordinator::{ControllerLeaves, InteractionController};
use crate::pipeline::messages::{Leaf, LeafEvent, LeafEventSink, TranscriptDelta};
use crate::pipeline::runner::{ControllerHandle, ControllerInbox};
use crate::runtime::RuntimeEvent;
use crate::tts::PlaybackHandle;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Routes host commands into the controller inbox.
#[derive(Debug, Clone)]
pub struct ControllerHostHandler {
    controller: ControllerHandle,
    sink: LeafEventSink,
}

impl ControllerHostHandler {
    pub fn new(controller: ControllerHandle) -> Self {
        let sink = controller.sink();
        Self { controller, sink }
    }

    pub fn controller(&self) -> &ControllerHandle {
        &self.controller
    }

    fn post(&self, event: LeafEvent) -> Result<()> {
        let kind = event.kind();
        if self.sink.post(event) {
            Ok(())
        } else {
            Err(InteractionError::Channel(format!(
                "controller has shut down; {kind} dropped"
            )))
        }
    }
}

impl SessionHostHandler for ControllerHostHandler {
    fn request_session_start(&self, language: Option<&str>, greeting: Option<&str>) -> Result<()> {
        info!(?language, "host requested session start");
        self.controller
            .start_session(language.map(str::to_owned), greeting.map(str::to_owned))
    }

    fn request_session_end(&self) -> Result<()> {
        info!("host requested session end");
        self.controller.end_session()
    }

    fn request_interrupt(&self) -> Result<()> {
        self.controller.interrupt()
    }

    fn request_activate(&self) -> Result<()> {
        self.controller.activate()
    }

    fn request_cancel(&self) -> Result<()> {
        self.controller.cancel()
    }

    fn request_rearm(&self) -> Result<()> {
        self.controller.rearm()
    }

    fn query_session_status(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self.controller.snapshot())
            .map_err(|e| InteractionError::Protocol(format!("failed to encode status: {e}")))
    }

    fn notify_wake_detected(&self) -> Result<()> {
        self.post(LeafEvent::WakeDetected)
    }

    fn notify_transcript_delta(&self, text: &str, is_final: bool) -> Result<()> {
        self.post(LeafEvent::TranscriptDelta(TranscriptDelta {
            text: text.to_owned(),
            is_final,
        }))
    }

    fn notify_input_level(&self, rms: f32) -> Result<()> {
        self.post(LeafEvent::InputLevel { rms })
    }

    fn notify_transcription_fatal(&self, reason: &str) -> Result<()> {
        warn!(reason, "host reported transcription failure");
        self.post(LeafEvent::Fatal {
            leaf: Leaf::Transcription,
            reason: reason.to_owned(),
        })
    }

    fn notify_playback_finished(
        &self,
        handle: PlaybackHandle,
        completed_normally: bool,
    ) -> Result<()> {
        self.post(LeafEvent::PlaybackFinished {
            handle,
            completed_normally,
        })
    }

    fn notify_playback_failed(&self, handle: PlaybackHandle, reason: &str) -> Result<()> {
        self.post(LeafEvent::PlaybackFailed {
            handle,
            reason: reason.to_owned(),
        })
    }
}

/// Map a runtime event to a host event name and payload.
///
/// Internal bookkeeping events (generation ids, stale results) stay inside
/// the process.
pub fn map_runtime_event(event: &RuntimeEvent) -> Option<(&'static str, serde_json::Value)> {
    match event {
        RuntimeEvent::StateChanged { from, to } => Some((
            events::STATE_CHANGED,
            serde_json::json!({"from": from, "to": to}),
        )),
        RuntimeEvent::PartialTranscript { text } => {
            Some((events::TRANSCRIPT_PARTIAL, serde_json::json!({"text": text})))
        }
        RuntimeEvent::TurnCommitted(turn) => Some((
            events::TURN_COMMITTED,
            serde_json::json!({
                "role": turn.role(),
                "text": turn.text(),
                "created_at": turn.created_at(),
            }),
        )),
        RuntimeEvent::BargeIn { trigger } => {
            Some((events::BARGE_IN, serde_json::json!({"trigger": trigger})))
        }
        RuntimeEvent::ErrorSurfaced(error) => Some((
            events::ERROR_SURFACED,
            serde_json::json!({
                "kind": error.kind,
                "message": error.message,
                "recoverable": error.recoverable,
            }),
        )),
        RuntimeEvent::GenerationIssued { .. }
        | RuntimeEvent::StaleResultDropped { .. }
        | RuntimeEvent::PlaybackStarted { .. } => None,
    }
}

/// Forward runtime events to the host until the controller's broadcast closes.
pub fn spawn_event_bridge(
    mut rx: broadcast::Receiver<RuntimeEvent>,
    host: HostEvents,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some((name, payload)) = map_runtime_event(&event) {
                        host.emit(name, payload);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lagged = n, "runtime event bridge lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("runtime event channel closed; stopping bridge");
                    break;
                }
            }
        }
    })
}

/// A controller running behind a host shell.
#[derive(Debug)]
pub struct HostRuntime {
    pub handler: ControllerHostHandler,
    pub controller_task: JoinHandle<()>,
    pub bridge_task: JoinHandle<()>,
}

/// Build and spawn the conversation loop for a native shell.
///
/// Must be called inside a tokio runtime.
///
/// # Errors
///
/// Returns [`InteractionError::Config`] when the configuration is invalid or
/// a generation backend cannot be built.
pub fn spawn_host_runtime(config: InteractionConfig, host: HostEvents) -> Result<HostRuntime> {
    config.validate()?;
    let generator = Arc::new(ResponseGenerator::from_config(&config.generation)?);
    info!(backends = ?generator.backend_names(), "generation backends ready");

    let inbox = ControllerInbox::new();
    let leaves = ControllerLeaves {
        transcription: Box::new(HostTranscription::new(host.clone())),
        player: Box::new(HostSpeechPlayer::new(host.clone())),
        wake: Box::new(HostWakeDetector::new(host.clone())),
        generation: Box::new(TaskDispatcher::new(generator, inbox.sink())),
    };
    let controller = InteractionController::new(config, leaves);
    // Subscribe before the task starts so no event is missed.
    let runtime_events = controller.observer().subscribe_events();
    let (handle, controller_task) = inbox.spawn(controller);
    let bridge_task = spawn_event_bridge(runtime_events, host);

    Ok(HostRuntime {
        handler: ControllerHostHandler::new(handle),
        controller_task,
        bridge_task,
    })
}
