//! # concord-runtime
//!
//! Ensemble fan-out over AI inference backends.
//!
//! `concord-core` decides how replies are fused. This crate gets the replies:
//! it calls every configured backend concurrently, waits for all of them,
//! checks the quorum and falls back to the primary backend alone when too
//! few answered.
//!
//! ## Flow
//!
//! 1. [`ParallelOrchestrator`] runs every [`BackendAdapter`] under its own
//!    deadline and collects every outcome (join-all, never a race)
//! 2. [`FallbackController`] applies the quorum gate and, when it is
//!    missed, retries the primary backend exactly once
//! 3. [`EnsembleService`] normalizes the consensus into a report
//!
//! Only [`EnsembleError`] reaches the caller. Per-backend failures are
//! absorbed and returned as diagnostics on the outcome.
//!
//! ## Example
//!
//! ```rust,ignore
//! use concord_runtime::{EnsembleService, ProviderRegistry, RuntimeConfig};
//! use concord_core::AnalysisRequest;
//!
//! let config = RuntimeConfig::from_yaml_file("concord.yaml")?;
//! let service = EnsembleService::from_config(&config, &ProviderRegistry::with_defaults())?;
//!
//! match service.analyze(AnalysisRequest::new(image_base64)).await {
//!     Ok(outcome) => println!("{}", outcome.report.overall_score),
//!     Err(e) => eprintln!("{}", e.user_message()),
//! }
//! ```

pub mod backends;
pub mod config;
pub mod error;
pub mod fallback;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod service;

pub use backends::{BackendAdapter, BackendError, BackendFailure, ProviderBackend};
pub use config::{BackendConfig, ConfigError, EnsembleConfig, RuntimeConfig};
pub use error::{EnsembleError, EnsembleExhaustedError, QuorumNotMetError, UserMessage};
pub use fallback::{FallbackController, FallbackRun, FallbackState};
pub use orchestrator::ParallelOrchestrator;
pub use providers::{
    ApiCredential, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    ProviderFactory, ProviderRegistry,
};
pub use service::{AnalysisOutcome, EnsembleService, EnsembleServiceBuilder};
