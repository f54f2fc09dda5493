//! Error types for response generation.
//!
//! Each [`BackendError`] variant carries a stable code (SCREAMING_SNAKE_CASE)
//! included in the Display output and accessible via [`BackendError::code()`].

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Invalid or missing backend configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// Authentication failed (invalid/missing API key).
    pub const AUTH_FAILED: &str = "AUTH_FAILED";

    /// Network-level request failure.
    pub const REQUEST_FAILED: &str = "REQUEST_FAILED";

    /// The backend is rate limiting us.
    pub const RATE_LIMITED: &str = "RATE_LIMITED";

    /// The backend answered with something we cannot use.
    pub const MALFORMED_RESPONSE: &str = "MALFORMED_RESPONSE";

    /// A single backend attempt exceeded its time budget.
    pub const TIMEOUT_ERROR: &str = "TIMEOUT_ERROR";

    /// Provider-side failure (5xx and friends).
    pub const PROVIDER_ERROR: &str = "PROVIDER_ERROR";
}

/// Failure of a single backend attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Invalid or missing configuration.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    Config(String),

    /// Authentication failed.
    #[error("[{}] {}", error_codes::AUTH_FAILED, .0)]
    Auth(String),

    /// Network-level request failure.
    #[error("[{}] {}", error_codes::REQUEST_FAILED, .0)]
    Request(String),

    /// Rate limited (HTTP 429).
    #[error("[{}] {}", error_codes::RATE_LIMITED, .0)]
    RateLimited(String),

    /// Response body could not be parsed or held no text.
    #[error("[{}] {}", error_codes::MALFORMED_RESPONSE, .0)]
    Malformed(String),

    /// The attempt exceeded the per-backend budget.
    #[error("[{}] {}", error_codes::TIMEOUT_ERROR, .0)]
    Timeout(String),

    /// Provider-side failure.
    #[error("[{}] {}", error_codes::PROVIDER_ERROR, .0)]
    Provider(String),
}

impl BackendError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => error_codes::CONFIG_INVALID,
            Self::Auth(_) => error_codes::AUTH_FAILED,
            Self::Request(_) => error_codes::REQUEST_FAILED,
            Self::RateLimited(_) => error_codes::RATE_LIMITED,
            Self::Malformed(_) => error_codes::MALFORMED_RESPONSE,
            Self::Timeout(_) => error_codes::TIMEOUT_ERROR,
            Self::Provider(_) => error_codes::PROVIDER_ERROR,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Config(m)
            | Self::Auth(m)
            | Self::Request(m)
            | Self::RateLimited(m)
            | Self::Malformed(m)
            | Self::Timeout(m)
            | Self::Provider(m) => m,
        }
    }

    /// Returns true for failures a different attempt might not hit
    /// (network, rate limit, malformed body, timeout, 5xx).
    ///
    /// Auth and config failures are permanent for that backend. The fallback
    /// chain advances on both kinds; the distinction shows up in logs and in
    /// the terminal error.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Config(_) | Self::Auth(_) => false,
            Self::Request(_)
            | Self::RateLimited(_)
            | Self::Malformed(_)
            | Self::Timeout(_)
            | Self::Provider(_) => true,
        }
    }
}

/// Terminal outcome of one `generate` call, after the whole fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// No backends are configured.
    #[error("no generation backends configured")]
    NoBackends,

    /// Every backend failed once; carries the last cause.
    #[error("all {attempts} generation backends failed; last ({backend}): {last}")]
    Exhausted {
        /// Number of backends attempted.
        attempts: usize,
        /// Name of the last backend tried.
        backend: String,
        /// The last backend's failure.
        last: BackendError,
    },

    /// The request was cancelled because a newer one superseded it.
    #[error("generation cancelled")]
    Cancelled,
}
