//! Backend adapters: one per inference backend.
//!
//! An adapter sends the normalized request to its backend and turns the
//! free-text reply into a [`BackendResponse`]. Every failure comes back as a
//! [`BackendError`] tagged with the backend id; adapters never panic on a
//! malformed reply.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use concord_core::{AnalysisRequest, BackendResponse, ParseError};

use crate::providers::ProviderError;

mod provider;

pub use provider::ProviderBackend;

/// What went wrong inside one backend call.
#[derive(Error, Debug)]
pub enum BackendFailure {
    #[error("provider call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("unusable reply: {0}")]
    Parse(#[from] ParseError),

    #[error("no reply within {0:?}")]
    Timeout(Duration),

    #[error("adapter panicked")]
    Panicked,

    #[error("call aborted before it settled")]
    Aborted,
}

/// A single adapter failure. Always absorbed by the orchestrator.
#[derive(Error, Debug)]
#[error("Backend '{backend_id}' failed: {cause}")]
pub struct BackendError {
    pub backend_id: String,
    #[source]
    pub cause: BackendFailure,
}

impl BackendError {
    pub fn new(backend_id: impl Into<String>, cause: impl Into<BackendFailure>) -> Self {
        Self {
            backend_id: backend_id.into(),
            cause: cause.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self.cause,
            BackendFailure::Timeout(_) | BackendFailure::Provider(ProviderError::Timeout(_))
        )
    }
}

/// One inference backend.
///
/// # Isolation Contract
/// - MUST NOT share mutable state with other adapters
/// - MUST return missing optional fields as defaults, not errors
/// - SHOULD record the latency observed around the call
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Stable backend id, matching the weight table.
    fn id(&self) -> &str;

    /// Run the request against this backend.
    async fn invoke(&self, request: &AnalysisRequest) -> Result<BackendResponse, BackendError>;

    /// Cheap readiness probe.
    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_backend_without_raw_text() {
        let err = BackendError::new("gpt-4o", ParseError::NoJsonObject);
        assert_eq!(
            err.to_string(),
            "Backend 'gpt-4o' failed: unusable reply: No JSON object found in backend reply"
        );
    }

    #[test]
    fn test_timeout_detection() {
        assert!(BackendError::new("a", BackendFailure::Timeout(Duration::from_secs(1))).is_timeout());
        assert!(BackendError::new("a", ProviderError::Timeout(Duration::from_secs(1))).is_timeout());
        assert!(!BackendError::new("a", ProviderError::AuthError).is_timeout());
    }
}
