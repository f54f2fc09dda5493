//! OpenAI-compatible chat completions backend.
//!
//! Works against any server implementing `POST /v1/chat/completions`
//! (hosted APIs, Ollama, vLLM, llama.cpp server). Responses are requested
//! non-streaming: the controller speaks a response only once it is complete.

use crate::config::BackendConfig;
use crate::conversation::{ConversationTurn, Role};
use crate::llm::backend::{BackendInput, GenerationBackend};
use crate::llm::error::BackendError;
use async_trait::async_trait;
use serde_json::json;

/// Backend speaking the OpenAI chat completions wire format.
pub struct OpenAiCompatBackend {
    name: String,
    base_url: String,
    model: String,
    api_key: String,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatBackend")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiCompatBackend {
    /// Create a backend from a config entry.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Config`] when the URL or model is missing.
    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        if config.api_url.trim().is_empty() {
            return Err(BackendError::Config(format!(
                "backend '{}' has no api_url",
                config.name
            )));
        }
        if config.model.trim().is_empty() {
            return Err(BackendError::Config(format!(
                "backend '{}' has no model",
                config.name
            )));
        }

        Ok(Self {
            name: config.name.clone(),
            base_url: normalize_base_url(&config.api_url),
            model: config.model.clone(),
            api_key: config.resolved_api_key(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            client: reqwest::Client::new(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    /// Map an HTTP error status to a backend error.
    fn map_http_error(&self, status: reqwest::StatusCode, body: &str) -> BackendError {
        let message = extract_error_message(body);
        match status.as_u16() {
            401 | 403 => BackendError::Auth(format!(
                "{} authentication failed ({}): {message}",
                self.name,
                status.as_u16()
            )),
            429 => BackendError::RateLimited(format!("{} rate limited: {message}", self.name)),
            code => BackendError::Provider(format!("{} HTTP {code}: {message}", self.name)),
        }
    }
}

/// Strip trailing slashes and a trailing `/v1` so the endpoint can be appended.
fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    trimmed
        .strip_suffix("/v1")
        .unwrap_or(trimmed)
        .trim_end_matches('/')
        .to_owned()
}

/// Extract an error message from an OpenAI-style error body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}

/// Build the `messages` array: system prompt, history, then the new prompt.
pub(crate) fn build_messages(input: &BackendInput<'_>) -> Vec<serde_json::Value> {
    let mut messages = Vec::with_capacity(input.history.len() + 2);

    let mut system = input.system_prompt.trim().to_owned();
    if !input.language.is_empty() {
        if !system.is_empty() {
            system.push('\n');
        }
        system.push_str(&format!("Reply in the user's language ({}).", input.language));
    }
    if !system.is_empty() {
        messages.push(json!({"role": "system", "content": system}));
    }

    messages.extend(input.history.iter().map(turn_message));
    messages.push(json!({"role": "user", "content": input.prompt}));
    messages
}

fn turn_message(turn: &ConversationTurn) -> serde_json::Value {
    let role = match turn.role() {
        Role::User => "user",
        Role::Agent => "assistant",
    };
    json!({"role": role, "content": turn.text()})
}

/// Pull `choices[0].message.content` out of a completion body.
fn parse_completion(body: &serde_json::Value) -> Result<String, BackendError> {
    let content = body["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| BackendError::Malformed("response has no choices[0].message.content".into()))?;
    let content = content.trim();
    if content.is_empty() {
        return Err(BackendError::Malformed("response content is empty".into()));
    }
    Ok(content.to_owned())
}

#[async_trait]
impl GenerationBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, input: &BackendInput<'_>) -> Result<String, BackendError> {
        let mut body = json!({
            "model": self.model,
            "messages": build_messages(input),
            "stream": false,
        });
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }

        let mut request = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json");
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = request.json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(format!("{} request timed out: {e}", self.name))
            } else {
                BackendError::Request(format!("{} request failed: {e}", self.name))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(self.map_http_error(status, &body_text));
        }

        let value: serde_json::Value = response.json().await.map_err(|e| {
            BackendError::Malformed(format!("{} returned invalid JSON: {e}", self.name))
        })?;
        parse_completion(&value)
    }
}
