//! Parallel Orchestrator: concurrent fan-out with a join-all barrier.
//!
//! Every adapter call runs as its own task with its own deadline. One call
//! failing, timing out or panicking never cancels or delays another. Results
//! come back only after every call has settled, in adapter order rather than
//! completion order.

use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use concord_core::{AnalysisRequest, BackendResponse};

use crate::backends::{BackendAdapter, BackendError, BackendFailure};

/// Settled outcome of one adapter call.
pub type Outcome = Result<BackendResponse, BackendError>;

/// Runs adapter calls concurrently under explicit per-call deadlines.
#[derive(Debug, Clone, Default)]
pub struct ParallelOrchestrator {
    /// Applies to every backend without an override; `None` waits forever
    default_timeout: Option<Duration>,
    overrides: HashMap<String, Duration>,
}

impl ParallelOrchestrator {
    pub fn new(default_timeout: Option<Duration>) -> Self {
        Self {
            default_timeout,
            overrides: HashMap::new(),
        }
    }

    /// Give one backend its own deadline.
    pub fn with_backend_timeout(mut self, backend_id: impl Into<String>, timeout: Duration) -> Self {
        self.overrides.insert(backend_id.into(), timeout);
        self
    }

    pub fn timeout_for(&self, backend_id: &str) -> Option<Duration> {
        self.overrides
            .get(backend_id)
            .copied()
            .or(self.default_timeout)
    }

    /// Call every adapter concurrently and wait for all of them.
    ///
    /// `outcomes[i]` belongs to `adapters[i]`.
    pub async fn run_all(
        &self,
        adapters: &[Arc<dyn BackendAdapter>],
        request: Arc<AnalysisRequest>,
    ) -> Vec<Outcome> {
        let mut join_set = JoinSet::new();

        for (index, adapter) in adapters.iter().enumerate() {
            let adapter = Arc::clone(adapter);
            let request = Arc::clone(&request);
            let timeout = self.timeout_for(adapter.id());

            join_set.spawn(async move {
                let outcome = AssertUnwindSafe(call(adapter.as_ref(), &request, timeout))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(BackendError::new(adapter.id(), BackendFailure::Panicked)));
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<Outcome>> = adapters.iter().map(|_| None).collect();

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => tracing::warn!(error = %e, "Backend task did not complete"),
            }
        }

        let outcomes: Vec<Outcome> = slots
            .into_iter()
            .zip(adapters)
            .map(|(slot, adapter)| {
                slot.unwrap_or_else(|| Err(BackendError::new(adapter.id(), BackendFailure::Aborted)))
            })
            .collect();

        let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
        tracing::info!(
            attempted = adapters.len(),
            succeeded,
            failed = adapters.len() - succeeded,
            "Ensemble fan-out settled"
        );

        outcomes
    }

    /// Call one adapter under its deadline.
    pub async fn run_one(&self, adapter: &dyn BackendAdapter, request: &AnalysisRequest) -> Outcome {
        let timeout = self.timeout_for(adapter.id());
        match AssertUnwindSafe(call(adapter, request, timeout))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(BackendError::new(adapter.id(), BackendFailure::Panicked)),
        }
    }
}

async fn call(
    adapter: &dyn BackendAdapter,
    request: &AnalysisRequest,
    timeout: Option<Duration>,
) -> Outcome {
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, adapter.invoke(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(BackendError::new(adapter.id(), BackendFailure::Timeout(limit))),
        },
        None => adapter.invoke(request).await,
    };

    if let Err(e) = &outcome {
        if e.is_timeout() {
            tracing::warn!(backend = %e.backend_id, timeout = ?timeout, "Backend call timed out");
        } else {
            tracing::warn!(backend = %e.backend_id, error = %e.cause, "Backend call failed");
        }
    }

    outcome
}
