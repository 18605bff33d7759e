//! Errors surfaced by the ensemble.
//!
//! Per-backend failures are absorbed into state transitions. Only
//! [`EnsembleError`] reaches the caller.

use std::fmt;
use thiserror::Error;

use concord_core::AggregationError;

use crate::backends::BackendError;
use crate::config::ConfigError;
use crate::fallback::FallbackState;
use crate::providers::ProviderError;

/// Single generic text shown to end users on any terminal failure.
pub const UNAVAILABLE_MESSAGE: &str = "Analysis is temporarily unavailable. Please try again later.";

/// Fewer successful ensemble responses than the quorum requires.
///
/// Triggers the fallback path. Reported on a successful outcome as the
/// "degraded" marker; never returned as an error by itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Quorum not met: {succeeded} of {attempted} backends succeeded, {required} required")]
pub struct QuorumNotMetError {
    pub required: usize,
    pub succeeded: usize,
    pub attempted: usize,
}

/// Both the ensemble attempt and the single-backend fallback failed.
#[derive(Error, Debug)]
#[error("Ensemble exhausted: {quorum}; fallback to '{primary}' failed")]
pub struct EnsembleExhaustedError {
    pub quorum: QuorumNotMetError,
    pub primary: String,
    #[source]
    pub fallback: BackendError,
    /// Failures absorbed during the ensemble attempt, in adapter order
    pub ensemble_failures: Vec<BackendError>,
    /// State trace ending in `TerminalError`
    pub transitions: Vec<FallbackState>,
}

impl EnsembleExhaustedError {
    /// Ids of every backend that failed, ensemble attempt first.
    pub fn failed_backends(&self) -> Vec<&str> {
        self.ensemble_failures
            .iter()
            .chain(std::iter::once(&self.fallback))
            .map(|e| e.backend_id.as_str())
            .collect()
    }
}

/// Errors returned by the ensemble service.
#[derive(Error, Debug)]
pub enum EnsembleError {
    #[error("No backends configured")]
    NoBackends,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Exhausted(#[from] EnsembleExhaustedError),

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Aggregation failed: {0}")]
    Aggregation(#[from] AggregationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider setup failed: {0}")]
    Provider(#[from] ProviderError),
}

impl EnsembleError {
    /// Text safe to show an end user. Never carries backend detail.
    pub fn user_message(&self) -> UserMessage {
        match self {
            EnsembleError::Cancelled => UserMessage("Analysis was cancelled."),
            EnsembleError::InvalidRequest(_) => {
                UserMessage("The image could not be analyzed. Please check the upload and try again.")
            }
            _ => UserMessage(UNAVAILABLE_MESSAGE),
        }
    }

    /// True when every backend, including the fallback, was down.
    pub fn is_total_outage(&self) -> bool {
        matches!(self, EnsembleError::Exhausted(_))
    }
}

/// End-user text for an [`EnsembleError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserMessage(&'static str);

impl UserMessage {
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for UserMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}
