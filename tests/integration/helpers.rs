//! Shared helpers for integration tests.
//!
//! Scripted leaves record what the controller asked of them; a running
//! controller is driven through its handle and a leaf sink exactly as a real
//! embedding would drive it.

use async_trait::async_trait;
use interlocutor::config::InteractionConfig;
use interlocutor::llm::backend::{BackendInput, GenerationBackend};
use interlocutor::llm::error::BackendError;
use interlocutor::llm::{ResponseGenerator, TaskDispatcher};
use interlocutor::runtime::ControllerSnapshot;
use interlocutor::stt::TranscriptionSource;
use interlocutor::tts::{HandleSequence, PlaybackHandle, SpeechPlayer};
use interlocutor::wakeword::WakeDetector;
use interlocutor::{
    ControllerHandle, ControllerInbox, ControllerLeaves, InteractionController, InteractionState,
    LeafEventSink, RuntimeEvent,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub(crate) type Log = Arc<Mutex<Vec<String>>>;

/// How long a test waits for the controller to reach a state.
pub(crate) const WAIT: Duration = Duration::from_secs(5);

/// Config with short timers so scenarios finish quickly.
pub(crate) fn fast_config() -> InteractionConfig {
    let mut config = InteractionConfig::default();
    config.listening.silence_threshold_ms = 60;
    config.listening.no_speech_timeout_ms = 0;
    config.generation.timeout_ms = 2_000;
    config.generation.backend_timeout_ms = 1_000;
    config
}

// ── scripted backends ──────────────────────────────────────────────

/// A backend that replays scripted replies and records each prompt.
pub(crate) struct ScriptedBackend {
    name: String,
    replies: Mutex<VecDeque<Result<String, BackendError>>>,
    delay: Duration,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub(crate) fn new(name: &str, replies: Vec<Result<&str, BackendError>>) -> Arc<Self> {
        Self::with_delay(name, replies, Duration::ZERO)
    }

    pub(crate) fn with_delay(
        name: &str,
        replies: Vec<Result<&str, BackendError>>,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_owned))
                    .collect(),
            ),
            delay,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, input: &BackendInput<'_>) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(input.prompt.to_owned());
        // Taken up front so a cancelled attempt still consumes its reply.
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::Provider("script exhausted".into())));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        reply
    }
}

// ── recording leaves ───────────────────────────────────────────────

pub(crate) struct RecordingTranscription(pub(crate) Log);

impl TranscriptionSource for RecordingTranscription {
    fn start(&mut self, language: &str) -> interlocutor::Result<()> {
        self.0.lock().unwrap().push(format!("stt.start {language}"));
        Ok(())
    }

    fn pause(&mut self) -> interlocutor::Result<()> {
        self.0.lock().unwrap().push("stt.pause".into());
        Ok(())
    }

    fn resume(&mut self) -> interlocutor::Result<()> {
        self.0.lock().unwrap().push("stt.resume".into());
        Ok(())
    }

    fn stop(&mut self) {
        self.0.lock().unwrap().push("stt.stop".into());
    }
}

pub(crate) struct RecordingPlayer {
    log: Log,
    handles: HandleSequence,
}

impl SpeechPlayer for RecordingPlayer {
    fn speak(&mut self, text: &str) -> interlocutor::Result<PlaybackHandle> {
        let handle = self.handles.next_handle();
        self.log.lock().unwrap().push(format!("speak {text}"));
        Ok(handle)
    }

    fn cancel(&mut self, handle: PlaybackHandle) {
        self.log.lock().unwrap().push(format!("cancel {}", handle.raw()));
    }
}

pub(crate) struct RecordingWake(pub(crate) Log);

impl WakeDetector for RecordingWake {
    fn arm(&mut self) -> interlocutor::Result<()> {
        self.0.lock().unwrap().push("wake.arm".into());
        Ok(())
    }

    fn disarm(&mut self) {
        self.0.lock().unwrap().push("wake.disarm".into());
    }
}

// ── running controller ─────────────────────────────────────────────

pub(crate) struct Running {
    pub(crate) handle: ControllerHandle,
    pub(crate) sink: LeafEventSink,
    pub(crate) log: Log,
    pub(crate) events: broadcast::Receiver<RuntimeEvent>,
    pub(crate) task: JoinHandle<()>,
}

impl Running {
    pub(crate) fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub(crate) fn spoken(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|l| l.strip_prefix("speak ").map(str::to_owned))
            .collect()
    }

    /// Wait until the published snapshot satisfies `pred`.
    pub(crate) async fn wait_until(
        &self,
        pred: impl FnMut(&ControllerSnapshot) -> bool,
    ) -> ControllerSnapshot {
        let mut rx = self.handle.subscribe_state();
        let snapshot = tokio::time::timeout(WAIT, rx.wait_for(pred))
            .await
            .expect("timed out waiting for controller state")
            .expect("controller state channel closed");
        snapshot.clone()
    }

    pub(crate) async fn wait_for_state(&self, state: InteractionState) -> ControllerSnapshot {
        self.wait_until(|s| s.state == Some(state)).await
    }

    /// Every runtime event received so far.
    pub(crate) fn drain_events(&mut self) -> Vec<RuntimeEvent> {
        let mut events = Vec::new();
        while let Ok(ev) = self.events.try_recv() {
            events.push(ev);
        }
        events
    }

    pub(crate) async fn stop(self) {
        self.handle.shutdown();
        self.task.await.unwrap();
    }
}

/// Spawn a controller over recording leaves and the given backends.
pub(crate) fn spawn_controller(
    config: InteractionConfig,
    backends: Vec<Arc<dyn GenerationBackend>>,
) -> Running {
    let log: Log = Arc::default();
    let inbox = ControllerInbox::new();
    let generator = Arc::new(ResponseGenerator::new(backends, &config.generation));
    let leaves = ControllerLeaves {
        transcription: Box::new(RecordingTranscription(Arc::clone(&log))),
        player: Box::new(RecordingPlayer {
            log: Arc::clone(&log),
            handles: HandleSequence::new(),
        }),
        wake: Box::new(RecordingWake(Arc::clone(&log))),
        generation: Box::new(TaskDispatcher::new(generator, inbox.sink())),
    };
    let controller = InteractionController::new(config, leaves);
    let events = controller.observer().subscribe_events();
    let sink = inbox.sink();
    let (handle, task) = inbox.spawn(controller);
    Running {
        handle,
        sink,
        log,
        events,
        task,
    }
}
