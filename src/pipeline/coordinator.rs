//! The interaction controller.
//!
//! [`InteractionController`] is the only owner of conversation state. It is
//! a synchronous state machine: every input arrives through
//! [`handle`](InteractionController::handle) with the time it is processed,
//! and timers are evaluated by [`poll_timers`](InteractionController::poll_timers)
//! against [`next_deadline`](InteractionController::next_deadline). The async
//! runner in [`crate::pipeline::runner`] drives it from a single inbox.
//!
//! Renewed user speech always preempts downstream work in the same order:
//! invalidate the generation id, cancel the in-flight request or playback,
//! then reopen listening. The microphone stays open for the whole session.

use crate::config::{InteractionConfig, PlaybackCaptureMode};
use crate::conversation::{ConversationHistory, ConversationTurn};
use crate::llm::error::GenerationError;
use crate::llm::{GenerationDispatch, GenerationId, GenerationLedger, GenerationRequest};
use crate::pipeline::messages::{
    ControllerMessage, Leaf, LeafEvent, SessionCommand, TranscriptDelta,
};
use crate::pipeline::state::{InteractionState, Utterance};
use crate::runtime::{
    BargeInTrigger, ControllerSnapshot, ErrorKind, RuntimeEvent, StateObserver, SurfacedError,
};
use crate::stt::{TranscriptionAdapter, TranscriptionSource};
use crate::tts::{PlaybackHandle, PlaybackSlot, SpeechPlayer};
use crate::wakeword::{WakeDetector, WakeGate};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default capacity of the runtime event broadcast channel.
const EVENT_CAPACITY: usize = 256;

/// The collaborators a controller drives.
pub struct ControllerLeaves {
    pub transcription: Box<dyn TranscriptionSource>,
    pub player: Box<dyn SpeechPlayer>,
    pub wake: Box<dyn WakeDetector>,
    pub generation: Box<dyn GenerationDispatch>,
}

/// Per-state data. Each variant owns exactly what is live in that state.
#[derive(Debug)]
enum Phase {
    Standby,
    Listening {
        utterance: Utterance,
        entered_at: Instant,
    },
    Thinking {
        id: GenerationId,
        deadline: Instant,
        cancel: CancellationToken,
        /// The prompt in flight. Deltas that only repeat it close the
        /// utterance already sent.
        prompt: String,
        /// Trivial speech heard while waiting.
        pending: Utterance,
    },
    Responding {
        handle: PlaybackHandle,
        text: String,
        started_at: Instant,
        /// Trivial speech heard while speaking.
        pending: Utterance,
    },
    Disabled,
}

impl Phase {
    fn state(&self) -> InteractionState {
        match self {
            Self::Standby => InteractionState::Standby,
            Self::Listening { .. } => InteractionState::Listening,
            Self::Thinking { .. } => InteractionState::Thinking,
            Self::Responding { .. } => InteractionState::Responding,
            Self::Disabled => InteractionState::Disabled,
        }
    }

    fn accumulated_text(&self) -> String {
        match self {
            Self::Listening { utterance, .. } => utterance.text(),
            Self::Thinking { pending, .. } | Self::Responding { pending, .. } => pending.text(),
            Self::Standby | Self::Disabled => String::new(),
        }
    }
}

#[derive(Debug)]
struct Session {
    language: String,
    history: ConversationHistory,
    phase: Phase,
}

/// Which timer, if any, is due.
enum DueTimer {
    Silence,
    NoSpeech,
    Generation,
}

/// Owns the conversation state machine for one device.
pub struct InteractionController {
    config: InteractionConfig,
    transcription: TranscriptionAdapter,
    playback: PlaybackSlot,
    wake: WakeGate,
    generation: Box<dyn GenerationDispatch>,
    ledger: GenerationLedger,
    session: Option<Session>,
    observer: StateObserver,
}

impl std::fmt::Debug for InteractionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionController")
            .field("state", &self.state())
            .field("transcription", &self.transcription)
            .field("playback", &self.playback)
            .field("wake", &self.wake)
            .field("ledger", &self.ledger)
            .finish()
    }
}

impl InteractionController {
    pub fn new(config: InteractionConfig, leaves: ControllerLeaves) -> Self {
        let transcription = TranscriptionAdapter::new(leaves.transcription, &config.transcription);
        Self {
            transcription,
            playback: PlaybackSlot::new(leaves.player),
            wake: WakeGate::new(leaves.wake),
            generation: leaves.generation,
            ledger: GenerationLedger::new(),
            session: None,
            observer: StateObserver::new(EVENT_CAPACITY),
            config,
        }
    }

    /// Current state, or `None` when no session is running.
    pub fn state(&self) -> Option<InteractionState> {
        self.session.as_ref().map(|s| s.phase.state())
    }

    pub fn observer(&self) -> &StateObserver {
        &self.observer
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        self.observer.snapshot()
    }

    /// Finalized turns of the running session.
    pub fn history(&self) -> &[ConversationTurn] {
        self.session
            .as_ref()
            .map(|s| s.history.turns())
            .unwrap_or_default()
    }

    pub fn config(&self) -> &InteractionConfig {
        &self.config
    }

    /// Process one inbox message.
    pub fn handle(&mut self, message: ControllerMessage, now: Instant) {
        match message {
            ControllerMessage::Leaf(event) => self.handle_leaf(event, now),
            ControllerMessage::Command(command) => self.handle_command(command, now),
        }
        self.refresh_snapshot();
    }

    fn handle_command(&mut self, command: SessionCommand, now: Instant) {
        debug!(?command, "session command");
        match command {
            SessionCommand::Start { language, greeting } => {
                self.start_session(language, greeting, now);
            }
            SessionCommand::End => self.end_session(),
            SessionCommand::Interrupt => self.interrupt(now),
            SessionCommand::Activate => self.activate(now),
            SessionCommand::Cancel => self.cancel(now),
            SessionCommand::Rearm => self.rearm(now),
        }
    }

    fn handle_leaf(&mut self, event: LeafEvent, now: Instant) {
        if self.session.is_none() {
            debug!(event = event.kind(), "no session running; leaf event ignored");
            return;
        }
        match event {
            LeafEvent::WakeDetected => self.on_wake(now),
            LeafEvent::TranscriptDelta(delta) => self.on_transcript(delta, now),
            LeafEvent::InputLevel { rms } => self.on_input_level(rms, now),
            LeafEvent::GenerationFinished { id, outcome } => {
                self.on_generation_finished(id, outcome, now);
            }
            LeafEvent::PlaybackFinished {
                handle,
                completed_normally,
            } => self.on_playback_finished(handle, completed_normally, now),
            LeafEvent::PlaybackFailed { handle, reason } => {
                self.on_playback_failed(handle, reason, now);
            }
            LeafEvent::Fatal { leaf, reason } => self.on_leaf_fatal(leaf, reason, now),
        }
    }

    // ── session operations ───────────────────────────────────────────

    /// Open the microphone, arm the wake detector, and optionally speak a
    /// greeting. Ignored while a session is already running.
    pub fn start_session(&mut self, language: Option<String>, greeting: Option<String>, now: Instant) {
        if self.session.is_some() {
            warn!("session already running; start ignored");
            return;
        }
        let language = language
            .map(|l| l.trim().to_owned())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| self.config.session.default_language.clone());
        info!(language = %language, "session starting");

        self.wake.reset();
        self.observer.update(|s| *s = ControllerSnapshot::default());

        if let Err(e) = self.transcription.start(&language) {
            error!(error = %e, "transcription failed to start; controller disabled");
            self.session = Some(Session {
                language,
                history: ConversationHistory::new(),
                phase: Phase::Disabled,
            });
            self.announce(None, InteractionState::Disabled);
            self.surface(ErrorKind::TranscriptionFatal, e.to_string());
            self.refresh_snapshot();
            return;
        }

        self.session = Some(Session {
            language,
            history: ConversationHistory::new(),
            phase: Phase::Standby,
        });
        self.arm_wake();
        self.announce(None, InteractionState::Standby);

        if let Some(greeting) = greeting.filter(|g| !g.trim().is_empty()) {
            self.start_response(greeting, Utterance::new(), now);
        }
        self.refresh_snapshot();
    }

    /// Tear everything down: playback, generation, capture, wake, history.
    pub fn end_session(&mut self) {
        let Some(from) = self.state() else {
            return;
        };
        self.playback.cancel();
        self.abort_generation();
        self.transcription.stop();
        self.wake.disarm();
        self.session = None;

        info!(from = %from, "session ended");
        self.observer.emit(RuntimeEvent::StateChanged {
            from: Some(from),
            to: None,
        });
        self.observer.update(|s| *s = ControllerSnapshot::default());
    }

    /// Manual barge-in: stop thinking or speaking and listen again.
    pub fn interrupt(&mut self, now: Instant) {
        match self.state() {
            Some(InteractionState::Thinking | InteractionState::Responding) => {
                self.barge_in(BargeInTrigger::Manual, None, now);
            }
            state => debug!(?state, "interrupt ignored"),
        }
        self.refresh_snapshot();
    }

    /// Manual wake: Standby → Listening.
    pub fn activate(&mut self, now: Instant) {
        match self.state() {
            Some(InteractionState::Standby) => {
                info!("manual activation");
                self.begin_listening(Utterance::new(), now);
            }
            state => debug!(?state, "activate ignored"),
        }
        self.refresh_snapshot();
    }

    /// Abandon the current exchange and return to standby. Idempotent.
    pub fn cancel(&mut self, now: Instant) {
        match self.state() {
            Some(
                InteractionState::Listening
                | InteractionState::Thinking
                | InteractionState::Responding,
            ) => {
                self.playback.cancel();
                self.abort_generation();
                info!("exchange cancelled");
                self.transition(Phase::Standby, now);
            }
            state => debug!(?state, "cancel ignored"),
        }
        self.refresh_snapshot();
    }

    /// Restart transcription after a fatal failure.
    pub fn rearm(&mut self, now: Instant) {
        let Some(session) = self.session.as_ref() else {
            debug!("rearm ignored; no session");
            return;
        };
        if !matches!(session.phase, Phase::Disabled) {
            debug!(state = %session.phase.state(), "rearm ignored; not disabled");
            return;
        }
        let language = session.language.clone();
        match self.transcription.start(&language) {
            Ok(()) => {
                info!("transcription rearmed");
                self.transition(Phase::Standby, now);
            }
            Err(e) => {
                error!(error = %e, "rearm failed; still disabled");
                self.surface(ErrorKind::TranscriptionFatal, e.to_string());
            }
        }
        self.refresh_snapshot();
    }

    /// Equivalent to [`end_session`](Self::end_session); used when the
    /// runner stops.
    pub fn shutdown(&mut self) {
        self.end_session();
    }

    // ── timers ───────────────────────────────────────────────────────

    /// The earliest instant at which [`poll_timers`](Self::poll_timers) has
    /// something to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match &self.session.as_ref()?.phase {
            Phase::Listening {
                utterance,
                entered_at,
            } => utterance
                .silence_deadline(self.silence_threshold())
                .or_else(|| self.no_speech_deadline(*entered_at)),
            Phase::Thinking { deadline, .. } => Some(*deadline),
            _ => None,
        }
    }

    /// Fire any timer that is due at `now`.
    pub fn poll_timers(&mut self, now: Instant) {
        let due = match self.session.as_ref().map(|s| &s.phase) {
            Some(Phase::Listening {
                utterance,
                entered_at,
            }) => match utterance.silence_deadline(self.silence_threshold()) {
                Some(deadline) if now >= deadline => Some(DueTimer::Silence),
                Some(_) => None,
                None => self
                    .no_speech_deadline(*entered_at)
                    .filter(|deadline| now >= *deadline)
                    .map(|_| DueTimer::NoSpeech),
            },
            Some(Phase::Thinking { deadline, .. }) if now >= *deadline => {
                Some(DueTimer::Generation)
            }
            _ => None,
        };

        match due {
            Some(DueTimer::Silence) => self.complete_utterance(now),
            Some(DueTimer::NoSpeech) => {
                info!("no speech after activation; returning to standby");
                self.transition(Phase::Standby, now);
            }
            Some(DueTimer::Generation) => self.generation_timed_out(now),
            None => {}
        }
        self.refresh_snapshot();
    }

    fn silence_threshold(&self) -> Duration {
        Duration::from_millis(self.config.listening.silence_threshold_ms)
    }

    fn no_speech_deadline(&self, entered_at: Instant) -> Option<Instant> {
        match self.config.listening.no_speech_timeout_ms {
            0 => None,
            ms => Some(entered_at + Duration::from_millis(ms)),
        }
    }

    // ── leaf events ──────────────────────────────────────────────────

    fn on_wake(&mut self, now: Instant) {
        match self.state() {
            Some(InteractionState::Standby) => {
                info!("wake phrase detected");
                self.begin_listening(Utterance::new(), now);
            }
            state => debug!(?state, "wake event ignored"),
        }
    }

    fn on_transcript(&mut self, delta: TranscriptDelta, now: Instant) {
        if !self.transcription.accepts_deltas() {
            debug!(state = ?self.transcription.state(), "transcript delta dropped; capture not live");
            return;
        }
        if delta.text.trim().is_empty() {
            return;
        }

        if let Some(Phase::Thinking { prompt, .. }) = self.session.as_ref().map(|s| &s.phase) {
            if repeats_prompt(prompt, &delta.text) {
                debug!(is_final = delta.is_final, "transcript delta repeats the sent prompt; ignored");
                return;
            }
        }

        let state = self.state();
        let non_trivial = self.is_non_trivial(&delta.text);
        match state {
            Some(InteractionState::Thinking | InteractionState::Responding) if non_trivial => {
                self.barge_in(BargeInTrigger::Speech, Some(&delta), now);
            }
            _ => {
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                match &mut session.phase {
                    Phase::Listening { utterance, .. } => {
                        utterance.apply(&delta, now);
                    }
                    Phase::Thinking { pending, .. } | Phase::Responding { pending, .. } => {
                        debug!(text = %delta.text.trim(), "trivial speech held while busy");
                        pending.apply(&delta, now);
                    }
                    Phase::Standby | Phase::Disabled => return,
                }
            }
        }

        let text = self
            .session
            .as_ref()
            .map(|s| s.phase.accumulated_text())
            .unwrap_or_default();
        self.observer.emit(RuntimeEvent::PartialTranscript { text });
    }

    fn on_input_level(&mut self, rms: f32, now: Instant) {
        if !rms.is_finite() {
            return;
        }
        let rms = rms.clamp(0.0, 1.0);
        self.observer.update(|s| s.input_level = rms);

        let policy = &self.config.barge_in;
        if self.config.transcription.playback_mode != PlaybackCaptureMode::HalfDuplex
            || !policy.enabled
            || rms < policy.min_rms
        {
            return;
        }
        let holdoff = Duration::from_millis(policy.assistant_start_holdoff_ms);
        let past_holdoff = matches!(
            self.session.as_ref().map(|s| &s.phase),
            Some(Phase::Responding { started_at, .. }) if now >= *started_at + holdoff
        );
        if past_holdoff {
            self.barge_in(BargeInTrigger::Level, None, now);
        }
    }

    fn on_generation_finished(
        &mut self,
        id: GenerationId,
        outcome: Result<String, GenerationError>,
        now: Instant,
    ) {
        let awaiting = matches!(
            self.session.as_ref().map(|s| &s.phase),
            Some(Phase::Thinking { id: current, .. }) if *current == id
        );
        if !awaiting || !self.ledger.is_current(id) {
            debug!(generation_id = %id, "stale generation result dropped");
            self.observer.emit(RuntimeEvent::StaleResultDropped { what: "generation" });
            return;
        }
        self.ledger.invalidate();

        let pending = match self.session.as_mut().map(|s| &mut s.phase) {
            Some(Phase::Thinking { pending, .. }) => std::mem::take(pending),
            _ => Utterance::new(),
        };

        match outcome {
            Ok(text) => {
                info!(generation_id = %id, chars = text.chars().count(), "response ready");
                self.start_response(text, pending, now);
            }
            Err(GenerationError::Cancelled) => {
                debug!(generation_id = %id, "generation reported cancelled");
                self.transition(Phase::Standby, now);
            }
            Err(e) => {
                warn!(generation_id = %id, error = %e, "generation failed");
                self.surface(
                    ErrorKind::GenerationExhausted,
                    self.config.session.apology_text.clone(),
                );
                self.transition(Phase::Standby, now);
            }
        }
    }

    fn on_playback_finished(&mut self, handle: PlaybackHandle, completed_normally: bool, now: Instant) {
        if !self.playback.release(handle) {
            debug!(%handle, "stale playback report dropped");
            self.observer.emit(RuntimeEvent::StaleResultDropped { what: "playback" });
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let (text, pending) = match &mut session.phase {
            Phase::Responding { text, pending, .. } => {
                (std::mem::take(text), std::mem::take(pending))
            }
            phase => {
                warn!(%handle, state = %phase.state(), "playback finished outside responding");
                return;
            }
        };

        if completed_normally {
            let turn = ConversationTurn::agent(text);
            if session.history.push(turn.clone()) {
                self.observer.emit(RuntimeEvent::TurnCommitted(turn));
            }
            info!(%handle, "response delivered");
        } else {
            info!(%handle, "playback ended early; response not recorded");
        }

        if pending.is_empty() {
            self.transition(Phase::Standby, now);
        } else {
            self.begin_listening(pending, now);
        }
    }

    fn on_playback_failed(&mut self, handle: PlaybackHandle, reason: String, now: Instant) {
        if !self.playback.release(handle) {
            debug!(%handle, "stale playback failure dropped");
            self.observer.emit(RuntimeEvent::StaleResultDropped { what: "playback" });
            return;
        }
        warn!(%handle, reason = %reason, "playback failed");
        self.surface(ErrorKind::PlaybackFailed, reason);
        if self.state() == Some(InteractionState::Responding) {
            self.transition(Phase::Standby, now);
        }
    }

    fn on_leaf_fatal(&mut self, leaf: Leaf, reason: String, now: Instant) {
        match leaf {
            Leaf::Transcription => self.fail_transcription(reason, now),
            Leaf::Player => {
                error!(reason = %reason, "speech player failed");
                self.playback.abandon();
                self.surface(ErrorKind::PlaybackFailed, reason);
                if self.state() == Some(InteractionState::Responding) {
                    self.transition(Phase::Standby, now);
                }
            }
            Leaf::Wake => {
                error!(reason = %reason, "wake detector failed");
                self.wake.mark_unavailable();
                self.surface(ErrorKind::WakeUnavailable, reason);
            }
            Leaf::Generator => {
                error!(reason = %reason, "generator failed");
                if self.state() == Some(InteractionState::Thinking) {
                    self.abort_generation();
                    self.surface(
                        ErrorKind::GenerationExhausted,
                        self.config.session.apology_text.clone(),
                    );
                    self.transition(Phase::Standby, now);
                }
            }
        }
    }

    // ── internals ────────────────────────────────────────────────────

    fn is_non_trivial(&self, text: &str) -> bool {
        text.trim().chars().count() > self.config.listening.min_barge_in_chars
    }

    fn begin_listening(&mut self, utterance: Utterance, now: Instant) {
        self.transition(
            Phase::Listening {
                utterance,
                entered_at: now,
            },
            now,
        );
    }

    /// Silence elapsed: commit the user turn and ask for a response.
    fn complete_utterance(&mut self, now: Instant) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Phase::Listening { utterance, .. } = &session.phase else {
            return;
        };
        let prompt = utterance.text();
        if prompt.trim().is_empty() {
            return;
        }

        let history = session.history.snapshot();
        let turn = ConversationTurn::user(prompt.clone());
        session.history.push(turn.clone());
        let language = session.language.clone();
        self.observer.emit(RuntimeEvent::TurnCommitted(turn));

        let id = self.ledger.issue();
        let cancel = CancellationToken::new();
        info!(generation_id = %id, chars = prompt.chars().count(), "utterance complete; requesting response");
        self.generation.dispatch(
            GenerationRequest {
                id,
                prompt: prompt.clone(),
                history,
                language,
                issued_at: now,
            },
            cancel.clone(),
        );
        self.observer.emit(RuntimeEvent::GenerationIssued { id });

        let deadline = now + Duration::from_millis(self.config.generation.timeout_ms);
        self.transition(
            Phase::Thinking {
                id,
                deadline,
                cancel,
                prompt,
                pending: Utterance::new(),
            },
            now,
        );
    }

    fn generation_timed_out(&mut self, now: Instant) {
        let id = self.ledger.current();
        self.abort_generation();
        warn!(
            generation_id = ?id,
            timeout_ms = self.config.generation.timeout_ms,
            "generation timed out"
        );
        self.surface(
            ErrorKind::GenerationExhausted,
            self.config.session.apology_text.clone(),
        );
        self.transition(Phase::Standby, now);
    }

    /// Speak `text` and enter Responding, or fall back to Standby.
    fn start_response(&mut self, text: String, pending: Utterance, now: Instant) {
        match self.playback.start(&text) {
            Ok(handle) => {
                self.observer.emit(RuntimeEvent::PlaybackStarted { handle });
                self.transition(
                    Phase::Responding {
                        handle,
                        text,
                        started_at: now,
                        pending,
                    },
                    now,
                );
            }
            Err(e) => {
                warn!(error = %e, "playback failed to start");
                self.surface(ErrorKind::PlaybackFailed, e.to_string());
                self.transition(Phase::Standby, now);
            }
        }
    }

    /// Preempt thinking or speaking in favour of the user.
    fn barge_in(&mut self, trigger: BargeInTrigger, seed: Option<&TranscriptDelta>, now: Instant) {
        match self.session.as_ref().map(|s| &s.phase) {
            Some(Phase::Thinking { id, cancel, .. }) => {
                self.ledger.invalidate();
                cancel.cancel();
                info!(generation_id = %id, ?trigger, "barge-in; generation cancelled");
            }
            Some(Phase::Responding { handle, .. }) => {
                let handle = *handle;
                self.playback.cancel();
                info!(%handle, ?trigger, "barge-in; playback cancelled");
            }
            _ => return,
        }
        self.observer.emit(RuntimeEvent::BargeIn { trigger });

        let utterance = seed
            .map(|delta| Utterance::seeded(delta, now))
            .unwrap_or_default();
        self.begin_listening(utterance, now);
    }

    /// Invalidate the current id and cancel its request, if any.
    fn abort_generation(&mut self) {
        if let Some(Phase::Thinking { id, cancel, .. }) = self.session.as_ref().map(|s| &s.phase) {
            cancel.cancel();
            debug!(generation_id = %id, "generation cancelled");
        }
        self.ledger.invalidate();
    }

    fn fail_transcription(&mut self, reason: String, now: Instant) {
        error!(reason = %reason, "transcription failed; disabled until rearmed");
        self.playback.cancel();
        self.abort_generation();
        self.transcription.stop();
        self.wake.disarm();
        self.surface(ErrorKind::TranscriptionFatal, reason);
        if self.state() != Some(InteractionState::Disabled) {
            self.transition(Phase::Disabled, now);
        }
    }

    fn arm_wake(&mut self) {
        if let Err(e) = self.wake.arm() {
            self.wake.mark_unavailable();
            self.surface(ErrorKind::WakeUnavailable, e.to_string());
        }
    }

    /// Swap in `next` and apply the capture and wake policies for the new
    /// state. Callers cancel playback and generation themselves.
    fn transition(&mut self, next: Phase, now: Instant) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let from = session.phase.state();
        session.phase = next;
        let to = session.phase.state();

        let half_duplex =
            self.config.transcription.playback_mode == PlaybackCaptureMode::HalfDuplex;
        let resumed = match to {
            InteractionState::Responding if half_duplex => {
                if let Err(e) = self.transcription.pause() {
                    warn!(error = %e, "could not pause transcription for playback");
                }
                Ok(())
            }
            InteractionState::Disabled => Ok(()),
            _ => self.transcription.resume(),
        };

        if from == InteractionState::Standby && to != InteractionState::Standby {
            self.wake.disarm();
        }
        if to == InteractionState::Standby {
            self.arm_wake();
        }

        if from != to {
            self.announce(Some(from), to);
        }

        if let Err(e) = resumed {
            self.fail_transcription(format!("resume failed: {e}"), now);
        }
    }

    fn announce(&self, from: Option<InteractionState>, to: InteractionState) {
        match from {
            Some(from) => info!(from = %from, to = %to, "state changed"),
            None => info!(to = %to, "state changed"),
        }
        self.observer.emit(RuntimeEvent::StateChanged { from, to: Some(to) });
        self.refresh_snapshot();
    }

    fn surface(&self, kind: ErrorKind, message: impl Into<String>) {
        let err = SurfacedError::new(kind, message);
        self.observer.update(|s| s.last_error = Some(err.clone()));
        self.observer.emit(RuntimeEvent::ErrorSurfaced(err));
    }

    fn refresh_snapshot(&self) {
        let (state, partial, history, language) = match &self.session {
            Some(session) => (
                Some(session.phase.state()),
                session.phase.accumulated_text(),
                session.history.snapshot(),
                Some(session.language.clone()),
            ),
            None => (None, String::new(), Vec::new(), None),
        };
        let generation_id = self.ledger.current();
        let playback_handle = self.playback.live();
        self.observer.update(|s| {
            s.state = state;
            s.partial_transcript = partial;
            s.history = history;
            s.language = language;
            s.generation_id = generation_id;
            s.playback_handle = playback_handle;
        });
    }
}

/// Whether `text` carries nothing beyond `prompt`: the whole prompt, its
/// opening words, or its closing segment re-sent as final.
fn repeats_prompt(prompt: &str, text: &str) -> bool {
    let text = text.trim();
    !text.is_empty() && (prompt.starts_with(text) || prompt.ends_with(text))
}
