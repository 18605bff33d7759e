//! Fallback Controller: ensemble attempt, quorum gate, single-backend fallback.
//!
//! ```text
//! AttemptEnsemble ─┬─> QuorumMet ──> Aggregate ──> Done
//!                  └─> QuorumMissed ──> AttemptSingle ─┬─> Aggregate ──> Done
//!                                                      └─> TerminalError
//! ```
//!
//! The fallback hop runs exactly once. There is no retry loop.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use concord_core::{AnalysisRequest, Aggregator, ConsensusResult};

use crate::backends::{BackendAdapter, BackendError};
use crate::error::{EnsembleError, EnsembleExhaustedError, QuorumNotMetError};
use crate::orchestrator::ParallelOrchestrator;

/// States of one analysis attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FallbackState {
    AttemptEnsemble,
    QuorumMet,
    QuorumMissed,
    AttemptSingle,
    Aggregate,
    Done,
    TerminalError,
}

impl FallbackState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FallbackState::Done | FallbackState::TerminalError)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackState::AttemptEnsemble => "ATTEMPT_ENSEMBLE",
            FallbackState::QuorumMet => "QUORUM_MET",
            FallbackState::QuorumMissed => "QUORUM_MISSED",
            FallbackState::AttemptSingle => "ATTEMPT_SINGLE",
            FallbackState::Aggregate => "AGGREGATE",
            FallbackState::Done => "DONE",
            FallbackState::TerminalError => "TERMINAL_ERROR",
        }
    }
}

impl fmt::Display for FallbackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful run.
#[derive(Debug)]
pub struct FallbackRun {
    pub consensus: ConsensusResult,
    /// Ordered trace, always ending in `Done`
    pub transitions: Vec<FallbackState>,
    /// Backend failures absorbed along the way, in the order they occurred
    pub failures: Vec<BackendError>,
    /// Set when the fallback path produced the result
    pub degraded: Option<QuorumNotMetError>,
}

/// Drives one request through the fallback state machine.
pub struct FallbackController {
    adapters: Vec<Arc<dyn BackendAdapter>>,
    orchestrator: ParallelOrchestrator,
    aggregator: Aggregator,
    quorum: usize,
    primary: usize,
}

impl fmt::Debug for FallbackController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackController")
            .field(
                "adapters",
                &self.adapters.iter().map(|a| a.id()).collect::<Vec<_>>(),
            )
            .field("quorum", &self.quorum)
            .field("primary", &self.primary_id())
            .finish()
    }
}

impl FallbackController {
    /// Create a controller.
    ///
    /// `primary` must name one of `adapters`; when `None` the highest-weighted
    /// adapter is used, the first one winning ties.
    pub fn new(
        adapters: Vec<Arc<dyn BackendAdapter>>,
        orchestrator: ParallelOrchestrator,
        aggregator: Aggregator,
        quorum: usize,
        primary: Option<&str>,
    ) -> Result<Self, EnsembleError> {
        if adapters.is_empty() {
            return Err(EnsembleError::NoBackends);
        }

        let primary_id = match primary {
            Some(id) => Some(id),
            None => aggregator
                .weights()
                .primary_among(adapters.iter().map(|a| a.id())),
        };
        let primary = match primary_id {
            Some(id) => adapters.iter().position(|a| a.id() == id).ok_or_else(|| {
                EnsembleError::InvalidRequest(format!("primary '{}' is not a configured backend", id))
            })?,
            None => 0,
        };

        Ok(Self {
            adapters,
            orchestrator,
            aggregator,
            quorum: quorum.max(1),
            primary,
        })
    }

    pub fn primary_id(&self) -> &str {
        self.adapters[self.primary].id()
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    pub fn adapters(&self) -> &[Arc<dyn BackendAdapter>] {
        &self.adapters
    }

    /// Run one request through the state machine.
    ///
    /// `method` on the result follows the path taken: anything fused on the
    /// ensemble path is `Weighted`, even a lone success under `quorum: 1`.
    /// Only the primary-retry path yields `SingleFallback`.
    pub async fn run(&self, request: Arc<AnalysisRequest>) -> Result<FallbackRun, EnsembleError> {
        let mut transitions = vec![FallbackState::AttemptEnsemble];
        tracing::debug!(
            backends = self.adapters.len(),
            quorum = self.quorum,
            "Attempting ensemble"
        );

        let outcomes = self.orchestrator.run_all(&self.adapters, Arc::clone(&request)).await;

        let mut successes = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(response) => successes.push(response),
                Err(e) => failures.push(e),
            }
        }

        if successes.len() >= self.quorum {
            transitions.push(FallbackState::QuorumMet);
            transitions.push(FallbackState::Aggregate);
            let consensus = self.aggregator.fuse_ensemble(&successes)?;
            transitions.push(FallbackState::Done);

            tracing::info!(
                contributors = consensus.contributing_backends.len(),
                overall_score = consensus.overall_score,
                confidence = consensus.confidence,
                "Ensemble consensus reached"
            );

            return Ok(FallbackRun {
                consensus,
                transitions,
                failures,
                degraded: None,
            });
        }

        let quorum = QuorumNotMetError {
            required: self.quorum,
            succeeded: successes.len(),
            attempted: self.adapters.len(),
        };
        transitions.push(FallbackState::QuorumMissed);
        transitions.push(FallbackState::AttemptSingle);

        let primary = &self.adapters[self.primary];
        tracing::warn!(
            primary = %primary.id(),
            succeeded = quorum.succeeded,
            required = quorum.required,
            "Quorum missed, falling back to primary backend"
        );

        match self.orchestrator.run_one(primary.as_ref(), &request).await {
            Ok(response) => {
                transitions.push(FallbackState::Aggregate);
                let consensus = self.aggregator.fuse_single(&response);
                transitions.push(FallbackState::Done);

                tracing::info!(
                    primary = %primary.id(),
                    overall_score = consensus.overall_score,
                    "Single-backend fallback succeeded"
                );

                Ok(FallbackRun {
                    consensus,
                    transitions,
                    failures,
                    degraded: Some(quorum),
                })
            }
            Err(fallback) => {
                transitions.push(FallbackState::TerminalError);
                tracing::error!(
                    primary = %primary.id(),
                    error = %fallback,
                    failed = failures.len() + 1,
                    "Ensemble exhausted"
                );

                Err(EnsembleExhaustedError {
                    quorum,
                    primary: primary.id().to_string(),
                    fallback,
                    ensemble_failures: failures,
                    transitions,
                }
                .into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::tests::{adapters, FakeAdapter};
    use concord_core::{BackendWeights, ConsensusMethod};
    use proptest::prelude::*;
    use FallbackState::*;

    fn controller(list: Vec<Arc<dyn BackendAdapter>>) -> FallbackController {
        FallbackController::new(
            list,
            ParallelOrchestrator::new(None),
            Aggregator::default(),
            2,
            None,
        )
        .unwrap()
    }

    fn request() -> Arc<AnalysisRequest> {
        Arc::new(AnalysisRequest::new("img"))
    }

    #[tokio::test]
    async fn test_quorum_met_aggregates() {
        let run = controller(adapters(vec![
            FakeAdapter::ok("gpt-4o", 80.0),
            FakeAdapter::ok("claude-3-5-sonnet", 82.0),
            FakeAdapter::failing("gemini-1.5-flash"),
        ]))
        .run(request())
        .await
        .unwrap();

        assert_eq!(run.transitions, vec![AttemptEnsemble, QuorumMet, Aggregate, Done]);
        assert_eq!(run.consensus.method, ConsensusMethod::Weighted);
        assert_eq!(run.failures.len(), 1);
        assert!(run.degraded.is_none());
    }

    #[tokio::test]
    async fn test_primary_is_retried_once_on_miss() {
        let gpt = FakeAdapter::ok("gpt-4o", 75.0);
        let list = adapters(vec![
            gpt.clone(),
            FakeAdapter::failing("claude-3-5-sonnet"),
            FakeAdapter::failing("gemini-1.5-flash"),
        ]);
        let run = controller(list).run(request()).await.unwrap();

        assert_eq!(
            run.transitions,
            vec![AttemptEnsemble, QuorumMissed, AttemptSingle, Aggregate, Done]
        );
        assert_eq!(gpt.calls(), 2);
        assert_eq!(run.consensus.method, ConsensusMethod::SingleFallback);
        assert_eq!(run.consensus.contributing_backends, vec!["gpt-4o"]);
        assert_eq!(run.degraded.unwrap().succeeded, 1);
    }

    #[tokio::test]
    async fn test_terminal_error_is_distinct() {
        let err = controller(adapters(vec![
            FakeAdapter::failing("gpt-4o"),
            FakeAdapter::failing("claude-3-5-sonnet"),
        ]))
        .run(request())
        .await
        .unwrap_err();

        match err {
            EnsembleError::Exhausted(e) => {
                assert_eq!(e.primary, "gpt-4o");
                assert_eq!(e.quorum.succeeded, 0);
                assert_eq!(e.ensemble_failures.len(), 2);
                assert_eq!(
                    e.transitions,
                    vec![AttemptEnsemble, QuorumMissed, AttemptSingle, TerminalError]
                );
                assert!(e.transitions.last().unwrap().is_terminal());
            }
            other => panic!("expected exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_quorum_of_one_stays_on_ensemble_path() {
        let controller = FallbackController::new(
            adapters(vec![
                FakeAdapter::failing("gpt-4o"),
                FakeAdapter::ok("claude-3-5-sonnet", 77.0),
            ]),
            ParallelOrchestrator::new(None),
            Aggregator::default(),
            1,
            None,
        )
        .unwrap();
        let run = controller.run(request()).await.unwrap();

        assert_eq!(run.transitions, vec![AttemptEnsemble, QuorumMet, Aggregate, Done]);
        assert_eq!(run.consensus.method, ConsensusMethod::Weighted);
        assert_eq!(run.consensus.contributing_backends, vec!["claude-3-5-sonnet"]);
        assert!(run.degraded.is_none());
    }

    proptest! {
        #[test]
        fn prop_quorum_gate_follows_success_count(
            mask in proptest::collection::vec(any::<bool>(), 1..5),
            quorum in 1usize..5,
        ) {
            let list = mask
                .iter()
                .enumerate()
                .map(|(i, ok)| {
                    let id = format!("backend-{i}");
                    if *ok { FakeAdapter::ok(&id, 70.0) } else { FakeAdapter::failing(&id) }
                })
                .collect();
            let controller = FallbackController::new(
                adapters(list),
                ParallelOrchestrator::new(None),
                Aggregator::default(),
                quorum,
                Some("backend-0"),
            )
            .unwrap();

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let result = runtime.block_on(controller.run(request()));
            let successes = mask.iter().filter(|ok| **ok).count();

            match result {
                Ok(run) if successes >= quorum => {
                    prop_assert_eq!(run.consensus.method, ConsensusMethod::Weighted);
                    prop_assert!(run.degraded.is_none());
                }
                Ok(run) => {
                    prop_assert!(mask[0]);
                    prop_assert_eq!(run.consensus.method, ConsensusMethod::SingleFallback);
                }
                Err(EnsembleError::Exhausted(_)) => {
                    prop_assert!(successes < quorum && !mask[0]);
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_primary_follows_weights() {
        let weights =
            BackendWeights::new([("a", 0.2), ("b", 0.5), ("c", 0.3)]).unwrap();
        let controller = FallbackController::new(
            adapters(vec![
                FakeAdapter::ok("a", 1.0),
                FakeAdapter::ok("b", 1.0),
                FakeAdapter::ok("c", 1.0),
            ]),
            ParallelOrchestrator::new(None),
            Aggregator::new(weights),
            2,
            None,
        )
        .unwrap();
        assert_eq!(controller.primary_id(), "b");
    }

    #[test]
    fn test_unknown_primary_rejected() {
        let result = FallbackController::new(
            adapters(vec![FakeAdapter::ok("a", 1.0)]),
            ParallelOrchestrator::new(None),
            Aggregator::default(),
            1,
            Some("missing"),
        );
        assert!(matches!(result, Err(EnsembleError::InvalidRequest(_))));
    }

    #[test]
    fn test_no_adapters_rejected() {
        let result = FallbackController::new(
            Vec::new(),
            ParallelOrchestrator::new(None),
            Aggregator::default(),
            2,
            None,
        );
        assert!(matches!(result, Err(EnsembleError::NoBackends)));
    }

    #[test]
    fn test_state_names() {
        assert_eq!(QuorumMissed.to_string(), "QUORUM_MISSED");
        assert_eq!(
            serde_json::to_string(&TerminalError).unwrap(),
            "\"TERMINAL_ERROR\""
        );
    }
}
