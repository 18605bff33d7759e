//! The ensemble service: explicitly constructed, holds its adapters and weights.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use concord_core::{
    normalize, AnalysisRequest, Aggregator, BackendWeights, ConsensusResult, DownstreamReport,
};

use crate::backends::{BackendAdapter, BackendError, ProviderBackend};
use crate::config::{RuntimeConfig, DEFAULT_CALL_TIMEOUT, DEFAULT_QUORUM};
use crate::error::{EnsembleError, QuorumNotMetError};
use crate::fallback::{FallbackController, FallbackState};
use crate::orchestrator::ParallelOrchestrator;
use crate::providers::ProviderRegistry;

/// Everything one analysis produced.
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub consensus: ConsensusResult,
    pub report: DownstreamReport,
    pub transitions: Vec<FallbackState>,
    /// Backend failures absorbed on the way to the result
    pub failures: Vec<BackendError>,
    /// Present when the single-backend fallback produced the result
    pub degraded: Option<QuorumNotMetError>,
    pub elapsed: Duration,
    pub completed_at: DateTime<Utc>,
}

impl AnalysisOutcome {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// Fan-out analysis across a fixed set of backends.
#[derive(Debug)]
pub struct EnsembleService {
    controller: FallbackController,
}

impl EnsembleService {
    pub fn builder() -> EnsembleServiceBuilder {
        EnsembleServiceBuilder::default()
    }

    /// Build every configured backend through the provider registry.
    pub fn from_config(
        config: &RuntimeConfig,
        registry: &ProviderRegistry,
    ) -> Result<Self, EnsembleError> {
        config.validate()?;
        registry.check_backends(&config.backends)?;

        let mut builder = Self::builder()
            .weights(config.weights()?)
            .quorum(config.ensemble.quorum)
            .call_timeout(config.ensemble.call_timeout);

        for backend in &config.backends {
            let timeout = config.timeout_for(&backend.id);
            let adapter = ProviderBackend::from_config(backend, registry, timeout)?;
            builder = builder.adapter(Arc::new(adapter));
            if let Some(override_timeout) = backend.timeout {
                builder = builder.backend_timeout(backend.id.clone(), override_timeout);
            }
        }

        if let Some(primary) = config.primary_id() {
            builder = builder.primary(primary);
        }

        tracing::info!(
            backends = config.backends.len(),
            quorum = config.ensemble.quorum,
            primary = ?config.primary_id(),
            "Ensemble service configured"
        );

        builder.build()
    }

    pub fn backend_ids(&self) -> Vec<&str> {
        self.controller.adapters().iter().map(|a| a.id()).collect()
    }

    pub fn primary_id(&self) -> &str {
        self.controller.primary_id()
    }

    pub fn quorum(&self) -> usize {
        self.controller.quorum()
    }

    /// Run one request through the ensemble and normalize the result.
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisOutcome, EnsembleError> {
        if request.image_base64.trim().is_empty() {
            return Err(EnsembleError::InvalidRequest("empty image payload".to_string()));
        }

        let started = Instant::now();
        let run = self.controller.run(Arc::new(request)).await?;
        let report = normalize(&run.consensus);

        Ok(AnalysisOutcome {
            consensus: run.consensus,
            report,
            transitions: run.transitions,
            failures: run.failures,
            degraded: run.degraded,
            elapsed: started.elapsed(),
            completed_at: Utc::now(),
        })
    }

    /// Like [`analyze`](Self::analyze), aborting when `cancel` fires.
    pub async fn analyze_with_cancel(
        &self,
        request: AnalysisRequest,
        cancel: CancellationToken,
    ) -> Result<AnalysisOutcome, EnsembleError> {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Analysis cancelled");
                Err(EnsembleError::Cancelled)
            }
            outcome = self.analyze(request) => outcome,
        }
    }

    /// Probe every backend concurrently; results in configuration order.
    pub async fn health_check(&self) -> Vec<(String, bool)> {
        let adapters = self.controller.adapters();
        let probes = adapters.iter().map(|a| a.health_check());
        let results = join_all(probes).await;

        adapters
            .iter()
            .zip(results)
            .map(|(adapter, healthy)| {
                if !healthy {
                    tracing::warn!(backend = %adapter.id(), "Backend health check failed");
                }
                (adapter.id().to_string(), healthy)
            })
            .collect()
    }
}

/// Builder for [`EnsembleService`].
pub struct EnsembleServiceBuilder {
    adapters: Vec<Arc<dyn BackendAdapter>>,
    weights: BackendWeights,
    quorum: usize,
    call_timeout: Option<Duration>,
    backend_timeouts: Vec<(String, Duration)>,
    primary: Option<String>,
}

impl Default for EnsembleServiceBuilder {
    fn default() -> Self {
        Self {
            adapters: Vec::new(),
            weights: BackendWeights::default(),
            quorum: DEFAULT_QUORUM,
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
            backend_timeouts: Vec::new(),
            primary: None,
        }
    }
}

impl EnsembleServiceBuilder {
    pub fn adapter(mut self, adapter: Arc<dyn BackendAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn adapters(mut self, adapters: impl IntoIterator<Item = Arc<dyn BackendAdapter>>) -> Self {
        self.adapters.extend(adapters);
        self
    }

    pub fn weights(mut self, weights: BackendWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn quorum(mut self, quorum: usize) -> Self {
        self.quorum = quorum;
        self
    }

    /// Default per-call deadline; `None` waits forever.
    pub fn call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn backend_timeout(mut self, backend_id: impl Into<String>, timeout: Duration) -> Self {
        self.backend_timeouts.push((backend_id.into(), timeout));
        self
    }

    /// Backend retried alone when quorum is missed.
    pub fn primary(mut self, backend_id: impl Into<String>) -> Self {
        self.primary = Some(backend_id.into());
        self
    }

    pub fn build(self) -> Result<EnsembleService, EnsembleError> {
        let orchestrator = self.backend_timeouts.into_iter().fold(
            ParallelOrchestrator::new(self.call_timeout),
            |orchestrator, (id, timeout)| orchestrator.with_backend_timeout(id, timeout),
        );
        let controller = FallbackController::new(
            self.adapters,
            orchestrator,
            Aggregator::new(self.weights),
            self.quorum,
            self.primary.as_deref(),
        )?;
        Ok(EnsembleService { controller })
    }
}
