//! Two-stage parsing of free-text backend replies.
//!
//! Stage 1 locates the JSON object inside the reply. Stage 2 checks its shape
//! and maps it onto [`ParsedPayload`], filling documented defaults for absent
//! fields. A reply that merely omits fields is never an error.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

use super::schema::validate_payload_schema;
use crate::types::{BackendResponse, Finding, Severity};

/// Overall score used when a backend omits it.
pub const DEFAULT_OVERALL_SCORE: f64 = 0.0;

/// Confidence used when a finding omits it.
pub const DEFAULT_FINDING_CONFIDENCE: f64 = 0.5;

/// Severity used when a finding omits it or sends an unknown label.
pub const DEFAULT_SEVERITY: Severity = Severity::Moderate;

/// Upper bound of every metric and overall score.
pub const MAX_SCORE: f64 = 100.0;

lazy_static! {
    /// First `{` through last `}` (greedy, spans newlines).
    static ref JSON_OBJECT_PATTERN: Regex = Regex::new(r"(?s)\{.*\}").unwrap();
}

/// Errors from parsing a backend reply.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("No JSON object found in backend reply")]
    NoJsonObject,

    #[error("Invalid JSON in backend reply: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Payload does not match schema: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),
}

/// Structured payload extracted from one reply, defaults applied.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedPayload {
    pub metric_scores: BTreeMap<String, f64>,
    pub findings: Vec<Finding>,
    pub suggestions: Vec<String>,
    pub overall_score: f64,
}

impl ParsedPayload {
    /// Attach call metadata and produce the immutable response value.
    pub fn into_response(
        self,
        backend_id: impl Into<String>,
        latency_ms: u64,
        raw_text: impl Into<String>,
    ) -> BackendResponse {
        BackendResponse {
            backend_id: backend_id.into(),
            metric_scores: self.metric_scores,
            findings: self.findings,
            free_text_suggestions: self.suggestions,
            overall_score: self.overall_score,
            latency_ms,
            raw_text: raw_text.into(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawPayload {
    #[serde(default)]
    findings: Option<Vec<RawFinding>>,
    #[serde(default)]
    concerns: Option<Vec<RawFinding>>,
    #[serde(default)]
    metric_scores: Option<BTreeMap<String, Option<f64>>>,
    #[serde(default)]
    visia_scores: Option<BTreeMap<String, Option<f64>>>,
    #[serde(default)]
    recommendations: Option<Vec<String>>,
    #[serde(default)]
    suggestions: Option<Vec<String>>,
    #[serde(default)]
    overall_score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawFinding {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    severity: Option<RawSeverity>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSeverity {
    Label(String),
    Score(f64),
}

/// Locate the JSON object span inside free text.
pub fn extract_json_object(text: &str) -> Option<&str> {
    JSON_OBJECT_PATTERN.find(text).map(|m| m.as_str())
}

/// Parse a backend's free-text reply into a [`ParsedPayload`].
pub fn parse_reply(text: &str) -> Result<ParsedPayload, ParseError> {
    let json = extract_json_object(text).ok_or(ParseError::NoJsonObject)?;
    let value: serde_json::Value = serde_json::from_str(json)?;
    parse_value(value)
}

/// Stage 2 on an already-decoded JSON value.
pub fn parse_value(value: serde_json::Value) -> Result<ParsedPayload, ParseError> {
    validate_payload_schema(&value).map_err(ParseError::SchemaViolation)?;
    let raw: RawPayload = serde_json::from_value(value)?;
    Ok(normalize(raw))
}

fn normalize(raw: RawPayload) -> ParsedPayload {
    let metric_scores = raw
        .metric_scores
        .or(raw.visia_scores)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, score)| clamp_score(score?).map(|s| (name, s)))
        .collect();

    let findings = raw
        .findings
        .or(raw.concerns)
        .unwrap_or_default()
        .into_iter()
        .filter_map(normalize_finding)
        .collect();

    let suggestions = raw
        .recommendations
        .or(raw.suggestions)
        .unwrap_or_default();

    let overall_score = raw
        .overall_score
        .and_then(clamp_score)
        .unwrap_or(DEFAULT_OVERALL_SCORE);

    ParsedPayload {
        metric_scores,
        findings,
        suggestions,
        overall_score,
    }
}

fn normalize_finding(raw: RawFinding) -> Option<Finding> {
    let category = raw
        .kind
        .or(raw.category)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    let Some(category) = category else {
        tracing::debug!("Dropping finding without a type");
        return None;
    };

    let severity = match raw.severity {
        Some(RawSeverity::Label(label)) => Severity::from_label(&label).unwrap_or_else(|| {
            tracing::debug!(category = %category, label = %label, "Unknown severity label");
            DEFAULT_SEVERITY
        }),
        Some(RawSeverity::Score(score)) if score.is_finite() => {
            Severity::from_score(score.clamp(0.0, MAX_SCORE))
        }
        _ => DEFAULT_SEVERITY,
    };

    let confidence = raw
        .confidence
        .and_then(normalize_confidence)
        .unwrap_or(DEFAULT_FINDING_CONFIDENCE);

    Some(Finding {
        category,
        severity,
        confidence,
        location: raw.location.filter(|s| !s.trim().is_empty()),
        description: raw.description.filter(|s| !s.trim().is_empty()),
    })
}

fn clamp_score(score: f64) -> Option<f64> {
    score.is_finite().then(|| score.clamp(0.0, MAX_SCORE))
}

/// Values above 1 are read as percentages.
fn normalize_confidence(confidence: f64) -> Option<f64> {
    if !confidence.is_finite() {
        return None;
    }
    let scaled = if confidence > 1.0 {
        confidence / 100.0
    } else {
        confidence
    };
    Some(scaled.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FENCED_REPLY: &str = r#"Here is my analysis:
```json
{
  "concerns": [
    {"type": "Acne", "severity": "Moderate", "confidence": 0.92, "location": "forehead", "description": "Inflamed papules"},
    {"type": "redness", "severity": "mild", "confidence": 85}
  ],
  "visiaScores": {"wrinkles": 85, "spots": 78, "pores": 70},
  "recommendations": ["Gentle cleanser", "SPF 50"],
  "overallScore": 82
}
```
Let me know if you need more."#;

    #[test]
    fn test_extracts_json_from_prose() {
        let payload = parse_reply(FENCED_REPLY).unwrap();

        assert_eq!(payload.overall_score, 82.0);
        assert_eq!(payload.metric_scores.len(), 3);
        assert_eq!(payload.metric_scores["spots"], 78.0);
        assert_eq!(payload.suggestions, vec!["Gentle cleanser", "SPF 50"]);

        assert_eq!(payload.findings.len(), 2);
        assert_eq!(payload.findings[0].category, "Acne");
        assert_eq!(payload.findings[0].severity, Severity::Moderate);
        assert_eq!(payload.findings[0].location.as_deref(), Some("forehead"));
    }

    #[test]
    fn test_percentage_confidence_is_scaled() {
        let payload = parse_reply(FENCED_REPLY).unwrap();
        assert!((payload.findings[1].confidence - 0.85).abs() < 1e-12);
    }

    #[test]
    fn test_no_json_object_is_error() {
        let result = parse_reply("I cannot analyze this image.");
        assert!(matches!(result, Err(ParseError::NoJsonObject)));
    }

    #[test]
    fn test_broken_json_is_error() {
        let result = parse_reply("{ \"overallScore\": 80, }");
        assert!(matches!(result, Err(ParseError::InvalidJson(_))));
    }

    #[test]
    fn test_wrong_shape_is_error() {
        let result = parse_reply(r#"{"overallScore": "high"}"#);
        assert!(matches!(result, Err(ParseError::SchemaViolation(_))));
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let payload = parse_reply("{}").unwrap();
        assert!(payload.findings.is_empty());
        assert!(payload.metric_scores.is_empty());
        assert!(payload.suggestions.is_empty());
        assert_eq!(payload.overall_score, DEFAULT_OVERALL_SCORE);
    }

    #[test]
    fn test_null_lists_and_maps_get_defaults() {
        let payload = parse_reply(
            r#"{"findings": null, "concerns": null, "metricScores": null, "visiaScores": null,
                "recommendations": null, "suggestions": null, "overallScore": 70}"#,
        )
        .unwrap();
        assert!(payload.findings.is_empty());
        assert!(payload.metric_scores.is_empty());
        assert!(payload.suggestions.is_empty());
        assert_eq!(payload.overall_score, 70.0);
    }

    #[test]
    fn test_null_primary_falls_back_to_alias() {
        let payload = parse_reply(
            r#"{"findings": null, "concerns": [{"type": "acne"}], "metricScores": null, "visiaScores": {"pores": 61}}"#,
        )
        .unwrap();
        assert_eq!(payload.findings.len(), 1);
        assert_eq!(payload.metric_scores["pores"], 61.0);
    }

    #[test]
    fn test_finding_defaults_and_drops() {
        let payload = parse_reply(
            r#"{"findings": [
                {"type": "dryness"},
                {"severity": "mild"},
                {"category": "spots", "severity": "unheard-of"},
                {"type": "wrinkles", "severity": 80}
            ]}"#,
        )
        .unwrap();

        assert_eq!(payload.findings.len(), 3);
        assert_eq!(payload.findings[0].severity, DEFAULT_SEVERITY);
        assert_eq!(payload.findings[0].confidence, DEFAULT_FINDING_CONFIDENCE);
        assert_eq!(payload.findings[1].category, "spots");
        assert_eq!(payload.findings[1].severity, DEFAULT_SEVERITY);
        assert_eq!(payload.findings[2].severity, Severity::Severe);
    }

    #[test]
    fn test_scores_are_clamped_and_nulls_skipped() {
        let payload = parse_reply(
            r#"{"metricScores": {"pores": 140, "texture": -5, "radiance": null}, "overallScore": 101}"#,
        )
        .unwrap();
        assert_eq!(payload.metric_scores["pores"], 100.0);
        assert_eq!(payload.metric_scores["texture"], 0.0);
        assert!(!payload.metric_scores.contains_key("radiance"));
        assert_eq!(payload.overall_score, 100.0);
    }

    #[test]
    fn test_primary_vocabulary_wins_over_alias() {
        let payload = parse_reply(
            r#"{"metricScores": {"pores": 60}, "visiaScores": {"pores": 10}}"#,
        )
        .unwrap();
        assert_eq!(payload.metric_scores["pores"], 60.0);
    }

    #[test]
    fn test_into_response_carries_metadata() {
        let response = parse_reply(FENCED_REPLY)
            .unwrap()
            .into_response("gpt-4o", 1234, FENCED_REPLY);
        assert_eq!(response.backend_id, "gpt-4o");
        assert_eq!(response.latency_ms, 1234);
        assert_eq!(response.free_text_suggestions.len(), 2);
        assert!(response.raw_text.contains("Let me know"));
    }
}
