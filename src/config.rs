//! Configuration types for the interaction controller.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the conversation loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Utterance completion and barge-in thresholds.
    pub listening: ListeningConfig,
    /// Response generation settings (timeouts and backend chain).
    pub generation: GenerationConfig,
    /// Transcription lifecycle settings.
    pub transcription: TranscriptionConfig,
    /// Level-based barge-in used while transcript processing is paused.
    pub barge_in: BargeInConfig,
    /// Session defaults.
    pub session: SessionConfig,
}

/// Listening-phase thresholds.
///
/// These are UX policy rather than correctness requirements, so every value
/// is configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListeningConfig {
    /// Silence (ms without a new non-empty delta) that completes an utterance.
    ///
    /// Measured from the last transcript change, so a pause mid-sentence
    /// restarts the countdown.
    pub silence_threshold_ms: u64,
    /// A transcript delta counts as renewed speech (and preempts generation
    /// or playback) only when its trimmed length exceeds this many characters.
    pub min_barge_in_chars: usize,
    /// Return to standby if nothing is said within this window after
    /// activation.
    ///
    /// Set to 0 to wait indefinitely.
    pub no_speech_timeout_ms: u64,
}

impl Default for ListeningConfig {
    fn default() -> Self {
        Self {
            silence_threshold_ms: 1_200,
            min_barge_in_chars: 3,
            no_speech_timeout_ms: 8_000,
        }
    }
}

/// Which wire protocol a generation backend speaks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// OpenAI-compatible chat completions (`POST {api_url}/v1/chat/completions`).
    #[default]
    #[serde(alias = "openai")]
    OpenaiCompat,
}

/// One entry in the prioritized backend list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Display name used in logs and errors.
    pub name: String,
    /// Wire protocol.
    pub kind: BackendKind,
    /// Base URL of the service (a trailing `/v1` is tolerated).
    pub api_url: String,
    /// Model identifier sent with each request.
    pub model: String,
    /// API key sent as a bearer token. Empty means no auth header.
    pub api_key: String,
    /// Environment variable to read the API key from when `api_key` is empty.
    pub api_key_env: Option<String>,
    /// Maximum tokens to generate per response.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
}

impl BackendConfig {
    /// Resolve the effective API key (inline value first, then the env var).
    pub fn resolved_api_key(&self) -> String {
        if !self.api_key.is_empty() {
            return self.api_key.clone();
        }
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .unwrap_or_default()
    }
}

/// Response generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Overall budget for one generation request, across the whole fallback
    /// chain. Expiry is treated as exhaustion.
    pub timeout_ms: u64,
    /// Budget for a single backend attempt before moving to the next one.
    pub backend_timeout_ms: u64,
    /// System prompt prepended to every request.
    pub system_prompt: String,
    /// Maximum history turns sent with each request (0 = all).
    pub max_history_turns: usize,
    /// Ordered backend list; index 0 is tried first.
    pub backends: Vec<BackendConfig>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            backend_timeout_ms: 8_000,
            system_prompt: "You are a helpful voice assistant. Answer in one or two short spoken sentences.".to_owned(),
            max_history_turns: 20,
            backends: Vec::new(),
        }
    }
}

/// How transcript processing behaves while the agent itself is speaking.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackCaptureMode {
    /// Transcripts keep flowing during playback; renewed speech barges in.
    #[default]
    Duplex,
    /// Transcription is paused during playback so the agent's own voice is
    /// not transcribed. Barge-in then relies on input level or `interrupt()`.
    HalfDuplex,
}

/// Transcription lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Behaviour while the agent is speaking.
    pub playback_mode: PlaybackCaptureMode,
    /// Target latency for `resume()` to restore delta emission. Overruns are
    /// logged.
    pub resume_budget_ms: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            playback_mode: PlaybackCaptureMode::Duplex,
            resume_budget_ms: 200,
        }
    }
}

/// Level-based barge-in configuration (half-duplex mode only).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BargeInConfig {
    /// Whether input level may interrupt playback while transcripts are paused.
    pub enabled: bool,
    /// Minimum RMS input level treated as the user talking over the agent.
    pub min_rms: f32,
    /// Ignore level triggers for this long after playback starts (ms), which
    /// filters speaker leakage at playback onset.
    pub assistant_start_holdoff_ms: u64,
}

impl Default for BargeInConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_rms: 0.05,
            assistant_start_holdoff_ms: 500,
        }
    }
}

/// Session defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Language tag used when `start_session` does not name one.
    pub default_language: String,
    /// Message surfaced to the user when every backend failed.
    pub apology_text: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_language: "en-US".to_owned(),
            apology_text: "Sorry, I couldn't come up with an answer just now. Please try again."
                .to_owned(),
        }
    }
}

impl InteractionConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::InteractionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::InteractionError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path inside [`crate::app_dirs::config_dir`].
    pub fn default_config_path() -> PathBuf {
        crate::app_dirs::config_dir().join("config.toml")
    }

    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::InteractionError::Config`] describing the first
    /// violated constraint.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::InteractionError::Config;

        if self.listening.silence_threshold_ms == 0 {
            return Err(Config("listening.silence_threshold_ms must be > 0".into()));
        }
        if self.generation.timeout_ms == 0 {
            return Err(Config("generation.timeout_ms must be > 0".into()));
        }
        if self.generation.backend_timeout_ms == 0 {
            return Err(Config("generation.backend_timeout_ms must be > 0".into()));
        }
        for (idx, backend) in self.generation.backends.iter().enumerate() {
            if backend.name.trim().is_empty() {
                return Err(Config(format!("generation.backends[{idx}].name is empty")));
            }
            if backend.api_url.trim().is_empty() {
                return Err(Config(format!(
                    "generation.backends[{idx}] ({}) has no api_url",
                    backend.name
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.barge_in.min_rms) {
            return Err(Config("barge_in.min_rms must be within 0.0..=1.0".into()));
        }
        Ok(())
    }
}
