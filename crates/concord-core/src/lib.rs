//! # concord-core
//!
//! Deterministic consensus fusion for multi-backend structured inference.
//!
//! Several inference backends analyse the same input. This crate turns their
//! replies into one confidence-scored result:
//! - Parse each free-text reply into a strict [`BackendResponse`]
//! - Fuse the surviving responses with renormalized weights
//! - Map the consensus onto the downstream report shape
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same responses in the same order give the same result
//! 2. **No I/O**: Network calls live in `concord-runtime`
//! 3. **No fabrication**: Absent metrics stay absent, they are never zero-filled
//!
//! ## Example
//!
//! ```rust,ignore
//! use concord_core::{fuse, normalize, parse_reply};
//!
//! let a = parse_reply(&gpt_text)?.into_response("gpt-4o", 2100, gpt_text);
//! let b = parse_reply(&claude_text)?.into_response("claude-3-5-sonnet", 2800, claude_text);
//!
//! let consensus = fuse(&[a, b])?;
//! let report = normalize(&consensus);
//! println!("{} ({:.0}% confident)", report.overall_score, report.confidence * 100.0);
//! ```

pub mod aggregator;
pub mod normalizer;
pub mod payload;
pub mod types;
pub mod weights;

// Re-export main types at crate root
pub use aggregator::{estimate_confidence, AggregationError, Aggregator};
pub use normalizer::{
    normalize, DownstreamReport, Grade, MetricReport, Priority, Recommendation, Trend,
    STANDARD_METRICS,
};
pub use payload::{parse_reply, parse_value, ParseError, ParsedPayload};
pub use types::{
    AnalysisRequest, AnalysisType, BackendResponse, ConsensusMethod, ConsensusResult, Finding,
    Language, MergedFinding, Severity,
};
pub use weights::{BackendWeights, WeightError, DEFAULT_BACKEND_WEIGHTS};

/// Fuse responses with the default weight table.
///
/// This is the main entry point for offline fusion.
pub fn fuse(responses: &[BackendResponse]) -> Result<ConsensusResult, AggregationError> {
    fuse_with_weights(responses, &BackendWeights::default())
}

/// Fuse responses with a caller-supplied weight table.
///
/// A single response yields a `single-fallback` result.
pub fn fuse_with_weights(
    responses: &[BackendResponse],
    weights: &BackendWeights,
) -> Result<ConsensusResult, AggregationError> {
    Aggregator::new(weights.clone()).fuse_offline(responses)
}
