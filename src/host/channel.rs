//! Host command channel and router for native shell integrations.

use crate::error::{InteractionError, Result};
use crate::host::contract::{
    CommandEnvelope, CommandName, ContractError, EventEnvelope, ResponseEnvelope,
};
use crate::tts::PlaybackHandle;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Everything a native shell can ask of, or report to, the controller.
///
/// Session requests map onto controller commands; `notify_*` calls carry
/// leaf events observed on the device (wake matches, transcripts, playback
/// completion).
pub trait SessionHostHandler: Send + Sync + 'static {
    fn request_session_start(&self, language: Option<&str>, greeting: Option<&str>) -> Result<()>;
    fn request_session_end(&self) -> Result<()>;
    fn request_interrupt(&self) -> Result<()>;
    fn request_activate(&self) -> Result<()>;
    fn request_cancel(&self) -> Result<()>;
    fn request_rearm(&self) -> Result<()>;
    fn query_session_status(&self) -> Result<serde_json::Value>;

    fn notify_wake_detected(&self) -> Result<()>;
    fn notify_transcript_delta(&self, text: &str, is_final: bool) -> Result<()>;
    fn notify_input_level(&self, rms: f32) -> Result<()>;
    fn notify_transcription_fatal(&self, reason: &str) -> Result<()>;
    fn notify_playback_finished(&self, handle: PlaybackHandle, completed_normally: bool)
    -> Result<()>;
    fn notify_playback_failed(&self, handle: PlaybackHandle, reason: &str) -> Result<()>;
}

struct HostCommandRequest {
    envelope: CommandEnvelope,
    response_tx: oneshot::Sender<Result<ResponseEnvelope>>,
}

#[derive(Clone)]
pub struct HostCommandClient {
    request_tx: mpsc::Sender<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl HostCommandClient {
    pub async fn send(&self, envelope: CommandEnvelope) -> Result<ResponseEnvelope> {
        envelope.validate().map_err(|e| {
            InteractionError::Protocol(format!(
                "invalid host command envelope {}: {}",
                envelope.request_id, e
            ))
        })?;

        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(HostCommandRequest {
                envelope,
                response_tx,
            })
            .await
            .map_err(|e| {
                InteractionError::Channel(format!("failed to send host command request: {e}"))
            })?;

        response_rx
            .await
            .map_err(|e| InteractionError::Channel(format!("host command response dropped: {e}")))?
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_tx.subscribe()
    }
}

pub struct HostCommandServer<H: SessionHostHandler> {
    request_rx: mpsc::Receiver<HostCommandRequest>,
    handler: H,
}

/// Create a command channel sharing `event_tx` with the handler, so events
/// the handler and the host leaves emit reach the shell through one path.
#[must_use]
pub fn command_channel<H: SessionHostHandler>(
    request_capacity: usize,
    event_tx: broadcast::Sender<EventEnvelope>,
    handler: H,
) -> (HostCommandClient, HostCommandServer<H>) {
    let (request_tx, request_rx) = mpsc::channel(request_capacity.max(1));
    (
        HostCommandClient {
            request_tx,
            event_tx,
        },
        HostCommandServer {
            request_rx,
            handler,
        },
    )
}

impl<H: SessionHostHandler> HostCommandServer<H> {
    pub async fn run(mut self) {
        while let Some(request) = self.request_rx.recv().await {
            let response = self.route(&request.envelope);
            let _ = request.response_tx.send(response);
        }
    }

    /// Route a command envelope to the appropriate handler.
    pub fn route(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let id = envelope.request_id.clone();
        let payload = &envelope.payload;
        let h = &self.handler;
        match envelope.command {
            CommandName::HostPing => Ok(ResponseEnvelope::ok(id, serde_json::json!({"pong": true}))),
            CommandName::HostVersion => Ok(ResponseEnvelope::ok(
                id,
                serde_json::json!({
                    "contract_version": crate::host::contract::EVENT_VERSION,
                    "crate_version": env!("CARGO_PKG_VERSION"),
                }),
            )),
            CommandName::SessionStart => {
                let language = optional_str(payload, "language")?;
                let greeting = optional_str(payload, "greeting")?;
                h.request_session_start(language, greeting)?;
                Ok(accepted(id))
            }
            CommandName::SessionEnd => h.request_session_end().map(|()| accepted(id)),
            CommandName::SessionInterrupt => h.request_interrupt().map(|()| accepted(id)),
            CommandName::SessionActivate => h.request_activate().map(|()| accepted(id)),
            CommandName::SessionCancel => h.request_cancel().map(|()| accepted(id)),
            CommandName::SessionRearm => h.request_rearm().map(|()| accepted(id)),
            CommandName::SessionStatus => {
                let status = h.query_session_status()?;
                Ok(ResponseEnvelope::ok(id, status))
            }
            CommandName::WakeDetected => h.notify_wake_detected().map(|()| accepted(id)),
            CommandName::TranscriptDelta => {
                let text = required_str(payload, "text")?;
                let is_final = payload
                    .get("is_final")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false);
                h.notify_transcript_delta(text, is_final)?;
                Ok(accepted(id))
            }
            CommandName::TranscriptLevel => {
                let rms = payload
                    .get("rms")
                    .and_then(serde_json::Value::as_f64)
                    .ok_or_else(|| ContractError::payload("missing numeric field 'rms'"))?;
                h.notify_input_level(rms as f32)?;
                Ok(accepted(id))
            }
            CommandName::TranscriptFatal => {
                let reason = optional_str(payload, "reason")?.unwrap_or("transcription failed");
                h.notify_transcription_fatal(reason)?;
                Ok(accepted(id))
            }
            CommandName::PlaybackFinished => {
                let handle = required_handle(payload)?;
                let completed_normally = payload
                    .get("completed_normally")
                    .and_then(serde_json::Value::as_bool)
                    .ok_or_else(|| {
                        ContractError::payload("missing boolean field 'completed_normally'")
                    })?;
                h.notify_playback_finished(handle, completed_normally)?;
                Ok(accepted(id))
            }
            CommandName::PlaybackFailed => {
                let handle = required_handle(payload)?;
                let reason = optional_str(payload, "reason")?.unwrap_or("playback failed");
                h.notify_playback_failed(handle, reason)?;
                Ok(accepted(id))
            }
        }
    }
}

fn accepted(request_id: String) -> ResponseEnvelope {
    ResponseEnvelope::ok(request_id, serde_json::json!({"accepted": true}))
}

fn required_str<'a>(payload: &'a serde_json::Value, field: &str) -> Result<&'a str> {
    Ok(payload
        .get(field)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| ContractError::payload(format!("missing string field '{field}'")))?)
}

fn optional_str<'a>(payload: &'a serde_json::Value, field: &str) -> Result<Option<&'a str>> {
    match payload.get(field) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ContractError::payload(format!("field '{field}' must be a string")).into()),
    }
}

fn required_handle(payload: &serde_json::Value) -> Result<PlaybackHandle> {
    payload
        .get("handle")
        .and_then(serde_json::Value::as_u64)
        .map(PlaybackHandle::new)
        .ok_or_else(|| ContractError::payload("missing integer field 'handle'").into())
}
