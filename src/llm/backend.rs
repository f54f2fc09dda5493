//! Backend trait for remote text generation services.

use crate::config::{BackendConfig, BackendKind};
use crate::conversation::ConversationTurn;
use crate::llm::api::OpenAiCompatBackend;
use crate::llm::error::BackendError;
use async_trait::async_trait;
use std::sync::Arc;

/// Everything a backend needs to produce one response.
#[derive(Debug, Clone, Copy)]
pub struct BackendInput<'a> {
    pub system_prompt: &'a str,
    /// Prior finalized turns, oldest first.
    pub history: &'a [ConversationTurn],
    /// The user utterance to answer.
    pub prompt: &'a str,
    /// Session language tag.
    pub language: &'a str,
}

/// A single remote generation service.
///
/// Implementations make exactly one attempt per call; the
/// [`ResponseGenerator`](crate::llm::ResponseGenerator) owns fallback,
/// timeouts, and cancellation.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Name used in logs and terminal errors.
    fn name(&self) -> &str;

    /// Produce a response for `input`.
    async fn generate(&self, input: &BackendInput<'_>) -> Result<String, BackendError>;
}

/// Build the ordered backend list from config entries.
///
/// # Errors
///
/// Returns a config error if an entry is missing its URL or model.
pub fn build_backends(
    entries: &[BackendConfig],
) -> crate::Result<Vec<Arc<dyn GenerationBackend>>> {
    entries
        .iter()
        .map(|entry| -> crate::Result<Arc<dyn GenerationBackend>> {
            match entry.kind {
                BackendKind::OpenaiCompat => {
                    let backend = OpenAiCompatBackend::from_config(entry)
                        .map_err(|e| crate::InteractionError::Config(e.to_string()))?;
                    Ok(Arc::new(backend))
                }
            }
        })
        .collect()
}
