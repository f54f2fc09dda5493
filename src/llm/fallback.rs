//! Per-request fallback chain over the prioritized backend list.
//!
//! [`FallbackChain`] holds the ordered backend names for one `generate` call
//! and records each attempt. Unlike a retry loop, every backend is tried at
//! most once: any failure advances to the next entry, and the chain is
//! exhausted once the list runs out.
//!
//! ```rust
//! use interlocutor::llm::error::BackendError;
//! use interlocutor::llm::fallback::FallbackChain;
//!
//! let mut chain = FallbackChain::new(vec!["cloud".into(), "edge".into()]);
//!
//! assert_eq!(chain.next_backend(), Some("cloud".to_string()));
//! chain.report_failure("cloud", BackendError::RateLimited("429".into()));
//!
//! assert_eq!(chain.next_backend(), Some("edge".to_string()));
//! chain.report_success("edge");
//! assert_eq!(chain.succeeded(), Some("edge"));
//! ```

use crate::llm::error::BackendError;
use tracing::{info, warn};

/// Outcome of one backend attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed(BackendError),
}

/// Record of one backend attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub backend: String,
    pub outcome: AttemptOutcome,
}

/// Ordered, single-pass fallback chain for one generation request.
#[derive(Debug)]
pub struct FallbackChain {
    backends: Vec<String>,
    /// Index of the next backend to hand out.
    cursor: usize,
    attempts: Vec<Attempt>,
}

impl FallbackChain {
    /// Create a chain over the given ordered backend names.
    pub fn new(backends: Vec<String>) -> Self {
        Self {
            backends,
            cursor: 0,
            attempts: Vec::new(),
        }
    }

    /// Return the next backend to try, or `None` when exhausted or already
    /// successful.
    pub fn next_backend(&mut self) -> Option<String> {
        if self.succeeded().is_some() {
            return None;
        }
        let name = self.backends.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(name)
    }

    /// Record a failed attempt. The chain never hands the same backend out
    /// again within this request.
    pub fn report_failure(&mut self, backend: &str, error: BackendError) {
        if error.is_transient() {
            warn!(
                backend,
                code = error.code(),
                error = error.message(),
                "backend transient failure, falling back"
            );
        } else {
            warn!(
                backend,
                code = error.code(),
                error = error.message(),
                "backend permanent failure, falling back"
            );
        }
        self.attempts.push(Attempt {
            backend: backend.to_owned(),
            outcome: AttemptOutcome::Failed(error),
        });
    }

    /// Record a successful attempt; the chain stops handing out backends.
    pub fn report_success(&mut self, backend: &str) {
        info!(backend, attempts = self.attempts.len() + 1, "backend produced a response");
        self.attempts.push(Attempt {
            backend: backend.to_owned(),
            outcome: AttemptOutcome::Succeeded,
        });
    }

    /// Name of the backend that succeeded, if any.
    pub fn succeeded(&self) -> Option<&str> {
        self.attempts
            .iter()
            .find(|a| a.outcome == AttemptOutcome::Succeeded)
            .map(|a| a.backend.as_str())
    }

    /// The most recent failure, with the backend that produced it.
    pub fn last_failure(&self) -> Option<(&str, &BackendError)> {
        self.attempts.iter().rev().find_map(|a| match &a.outcome {
            AttemptOutcome::Failed(e) => Some((a.backend.as_str(), e)),
            AttemptOutcome::Succeeded => None,
        })
    }

    /// All attempts so far, in order.
    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    /// `true` once every backend has been handed out without success.
    pub fn is_exhausted(&self) -> bool {
        self.succeeded().is_none() && self.cursor >= self.backends.len()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
