//! Response generation: requests, the fallback generator, and dispatch.
//!
//! The controller never awaits generation inline. It hands a
//! [`GenerationRequest`] to a [`GenerationDispatch`], which runs the
//! [`ResponseGenerator`] in the background and posts
//! [`LeafEvent::GenerationFinished`] back to the controller inbox. Only a
//! result whose id the [`GenerationLedger`] still considers current may
//! change controller state.

pub mod api;
pub mod backend;
pub mod error;
pub mod fallback;

use crate::config::GenerationConfig;
use crate::conversation::ConversationTurn;
use crate::llm::backend::{BackendInput, GenerationBackend};
use crate::llm::error::{BackendError, GenerationError};
use crate::llm::fallback::FallbackChain;
use crate::pipeline::messages::{LeafEvent, LeafEventSink};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Monotonic identifier of a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GenerationId(u64);

impl GenerationId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for GenerationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// Issues generation ids and tracks which one is authoritative.
///
/// At most one id is current at a time: issuing a new id replaces the old
/// one, and invalidation leaves none current.
#[derive(Debug, Default)]
pub struct GenerationLedger {
    last_issued: u64,
    current: Option<GenerationId>,
}

impl GenerationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh id and make it the only current one.
    pub fn issue(&mut self) -> GenerationId {
        self.last_issued += 1;
        let id = GenerationId(self.last_issued);
        self.current = Some(id);
        id
    }

    /// Whether a result carrying `id` may still act on controller state.
    pub fn is_current(&self, id: GenerationId) -> bool {
        self.current == Some(id)
    }

    /// Drop the current id; its eventual result will be treated as stale.
    pub fn invalidate(&mut self) -> Option<GenerationId> {
        self.current.take()
    }

    pub fn current(&self) -> Option<GenerationId> {
        self.current
    }
}

/// A request for one agent response.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub id: GenerationId,
    /// The finalized user utterance.
    pub prompt: String,
    /// History as it stood when the request was issued.
    pub history: Vec<ConversationTurn>,
    /// Session language tag (e.g. `hi-IN`).
    pub language: String,
    pub issued_at: Instant,
}

/// Generates text through an ordered list of backends with single-pass
/// fallback.
pub struct ResponseGenerator {
    backends: Vec<Arc<dyn GenerationBackend>>,
    backend_timeout: Duration,
    system_prompt: String,
    max_history_turns: usize,
}

impl std::fmt::Debug for ResponseGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseGenerator")
            .field(
                "backends",
                &self.backends.iter().map(|b| b.name()).collect::<Vec<_>>(),
            )
            .field("backend_timeout", &self.backend_timeout)
            .finish()
    }
}

impl ResponseGenerator {
    /// Create a generator over already-built backends.
    pub fn new(backends: Vec<Arc<dyn GenerationBackend>>, config: &GenerationConfig) -> Self {
        Self {
            backends,
            backend_timeout: Duration::from_millis(config.backend_timeout_ms),
            system_prompt: config.system_prompt.clone(),
            max_history_turns: config.max_history_turns,
        }
    }

    /// Build the backend list described by `config.backends`.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend entry cannot be turned into a client.
    pub fn from_config(config: &GenerationConfig) -> crate::Result<Self> {
        let backends = backend::build_backends(&config.backends)?;
        Ok(Self::new(backends, config))
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Produce a response for `request`, falling back through the backends
    /// in order. Each backend is tried at most once.
    ///
    /// Returns [`GenerationError::Cancelled`] as soon as `cancel` fires; the
    /// in-flight backend future is dropped, which aborts its request.
    ///
    /// # Errors
    ///
    /// [`GenerationError::NoBackends`], [`GenerationError::Cancelled`], or
    /// [`GenerationError::Exhausted`] carrying the last backend failure.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<String, GenerationError> {
        if self.backends.is_empty() {
            return Err(GenerationError::NoBackends);
        }

        let history = self.windowed_history(&request.history);
        let input = BackendInput {
            system_prompt: &self.system_prompt,
            history,
            prompt: &request.prompt,
            language: &request.language,
        };

        let mut chain = FallbackChain::new(
            self.backends
                .iter()
                .map(|b| b.name().to_owned())
                .collect(),
        );

        for backend in &self.backends {
            let Some(name) = chain.next_backend() else {
                break;
            };
            debug!(generation_id = %request.id, backend = name.as_str(), "trying backend");

            let attempt = tokio::time::timeout(self.backend_timeout, backend.generate(&input));
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!(generation_id = %request.id, backend = name.as_str(), "generation cancelled mid-attempt");
                    return Err(GenerationError::Cancelled);
                }
                r = attempt => r,
            };

            match result {
                Ok(Ok(text)) if !text.trim().is_empty() => {
                    chain.report_success(&name);
                    return Ok(text.trim().to_owned());
                }
                Ok(Ok(_)) => chain.report_failure(
                    &name,
                    BackendError::Malformed("backend returned an empty response".into()),
                ),
                Ok(Err(e)) => chain.report_failure(&name, e),
                Err(_) => chain.report_failure(
                    &name,
                    BackendError::Timeout(format!(
                        "no response within {} ms",
                        self.backend_timeout.as_millis()
                    )),
                ),
            }
        }

        match chain.last_failure() {
            Some((backend, last)) => Err(GenerationError::Exhausted {
                attempts: chain.attempts().len(),
                backend: backend.to_owned(),
                last: last.clone(),
            }),
            None => Err(GenerationError::NoBackends),
        }
    }

    fn windowed_history<'a>(&self, history: &'a [ConversationTurn]) -> &'a [ConversationTurn] {
        if self.max_history_turns == 0 || history.len() <= self.max_history_turns {
            history
        } else {
            &history[history.len() - self.max_history_turns..]
        }
    }
}

/// Starts generation work on behalf of the controller without blocking it.
pub trait GenerationDispatch: Send {
    /// Begin generating for `request`. The outcome must come back as
    /// [`LeafEvent::GenerationFinished`] carrying `request.id`. `cancel` fires
    /// when the controller no longer wants the result.
    fn dispatch(&mut self, request: GenerationRequest, cancel: CancellationToken);
}

/// Runs each request as a tokio task and posts the outcome to the inbox.
///
/// Must be used from within a tokio runtime (the controller runner is).
pub struct TaskDispatcher {
    generator: Arc<ResponseGenerator>,
    sink: LeafEventSink,
}

impl TaskDispatcher {
    pub fn new(generator: Arc<ResponseGenerator>, sink: LeafEventSink) -> Self {
        Self { generator, sink }
    }
}

impl GenerationDispatch for TaskDispatcher {
    fn dispatch(&mut self, request: GenerationRequest, cancel: CancellationToken) {
        let generator = Arc::clone(&self.generator);
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let id = request.id;
            let outcome = generator.generate(&request, &cancel).await;
            if cancel.is_cancelled() {
                debug!(generation_id = %id, "dropping result of cancelled generation");
                return;
            }
            info!(
                generation_id = %id,
                ok = outcome.is_ok(),
                elapsed_ms = request.issued_at.elapsed().as_millis() as u64,
                "generation finished"
            );
            sink.post(LeafEvent::GenerationFinished { id, outcome });
        });
    }
}
