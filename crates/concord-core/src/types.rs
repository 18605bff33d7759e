//! Core data model shared by every stage of the ensemble.
//!
//! All values here are built fresh for one request and never mutated after
//! construction. The aggregator produces new values from its inputs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Language the backends should answer in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Th,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Th => "th",
        }
    }

    /// Human-readable name used in prompts.
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Th => "Thai",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Language::En),
            "th" | "thai" => Ok(Language::Th),
            other => Err(format!("unknown language '{}': expected en or th", other)),
        }
    }
}

/// Depth of analysis requested from the backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    #[default]
    Quick,
    Detailed,
    Medical,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::Quick => "quick",
            AnalysisType::Detailed => "detailed",
            AnalysisType::Medical => "medical",
        }
    }
}

impl FromStr for AnalysisType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "quick" => Ok(AnalysisType::Quick),
            "detailed" => Ok(AnalysisType::Detailed),
            "medical" => Ok(AnalysisType::Medical),
            other => Err(format!(
                "unknown analysis type '{}': expected quick, detailed or medical",
                other
            )),
        }
    }
}

/// Inbound request, fanned out unchanged to every backend.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    /// Base64-encoded image payload
    pub image_base64: String,

    #[serde(default)]
    pub language: Language,

    #[serde(default)]
    pub analysis_type: AnalysisType,
}

impl AnalysisRequest {
    pub fn new(image_base64: impl Into<String>) -> Self {
        Self {
            image_base64: image_base64.into(),
            language: Language::default(),
            analysis_type: AnalysisType::default(),
        }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_analysis_type(mut self, analysis_type: AnalysisType) -> Self {
        self.analysis_type = analysis_type;
        self
    }
}

// The image payload can be megabytes of base64; keep it out of logs.
impl fmt::Debug for AnalysisRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisRequest")
            .field("image_base64", &format_args!("<{} bytes>", self.image_base64.len()))
            .field("language", &self.language)
            .field("analysis_type", &self.analysis_type)
            .finish()
    }
}

/// Severity of a finding.
///
/// Declaration order is the tie-break order for majority votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    /// Fixed enumeration order.
    pub const ALL: [Severity; 3] = [Severity::Mild, Severity::Moderate, Severity::Severe];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
        }
    }

    /// Case-insensitive label lookup.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "mild" | "low" | "minor" => Some(Severity::Mild),
            "moderate" | "medium" => Some(Severity::Moderate),
            "severe" | "high" | "major" => Some(Severity::Severe),
            _ => None,
        }
    }

    /// Map a 0-100 severity score onto the three buckets.
    pub fn from_score(score: f64) -> Self {
        if score < 34.0 {
            Severity::Mild
        } else if score < 67.0 {
            Severity::Moderate
        } else {
            Severity::Severe
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A categorical judgment reported by one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Identity key, compared case-insensitively
    pub category: String,

    pub severity: Severity,

    /// In [0, 1]
    pub confidence: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Finding {
    pub fn new(category: impl Into<String>, severity: Severity, confidence: f64) -> Self {
        Self {
            category: category.into(),
            severity,
            confidence,
            location: None,
            description: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Grouping key used when merging across backends.
    pub fn key(&self) -> String {
        self.category.to_lowercase()
    }
}

/// One backend's parsed answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendResponse {
    pub backend_id: String,

    /// Metric name -> score in [0, 100]
    #[serde(default)]
    pub metric_scores: BTreeMap<String, f64>,

    #[serde(default)]
    pub findings: Vec<Finding>,

    #[serde(default)]
    pub free_text_suggestions: Vec<String>,

    /// In [0, 100]
    #[serde(default)]
    pub overall_score: f64,

    #[serde(default)]
    pub latency_ms: u64,

    /// Diagnostic only; never surfaced to end users
    #[serde(default)]
    pub raw_text: String,
}

impl BackendResponse {
    pub fn new(backend_id: impl Into<String>, overall_score: f64) -> Self {
        Self {
            backend_id: backend_id.into(),
            metric_scores: BTreeMap::new(),
            findings: Vec::new(),
            free_text_suggestions: Vec::new(),
            overall_score,
            latency_ms: 0,
            raw_text: String::new(),
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, score: f64) -> Self {
        self.metric_scores.insert(name.into(), score);
        self
    }

    pub fn with_finding(mut self, finding: Finding) -> Self {
        self.findings.push(finding);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.free_text_suggestions.push(suggestion.into());
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_raw_text(mut self, raw_text: impl Into<String>) -> Self {
        self.raw_text = raw_text.into();
        self
    }
}

/// A finding after cross-backend merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedFinding {
    #[serde(flatten)]
    pub finding: Finding,

    /// Fraction of contributing backends that reported this category, in (0, 1]
    pub agreement_score: f64,
}

impl MergedFinding {
    pub fn category(&self) -> &str {
        &self.finding.category
    }

    pub fn severity(&self) -> Severity {
        self.finding.severity
    }

    pub fn confidence(&self) -> f64 {
        self.finding.confidence
    }
}

/// How a consensus result was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsensusMethod {
    /// Weighted fusion across a quorum of backends
    Weighted,
    /// Primary backend alone after the ensemble missed quorum
    SingleFallback,
}

impl ConsensusMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsensusMethod::Weighted => "weighted",
            ConsensusMethod::SingleFallback => "single-fallback",
        }
    }
}

impl fmt::Display for ConsensusMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fused, confidence-scored result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusResult {
    pub fused_metric_scores: BTreeMap<String, f64>,

    pub merged_findings: Vec<MergedFinding>,

    pub overall_score: f64,

    /// In [0.70, 1.00]; exactly 0.70 for a single contributor
    pub confidence: f64,

    pub contributing_backends: Vec<String>,

    pub method: ConsensusMethod,

    /// De-duplicated suggestions, first-seen order
    #[serde(default)]
    pub suggestions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_enumeration_order() {
        assert_eq!(
            Severity::ALL,
            [Severity::Mild, Severity::Moderate, Severity::Severe]
        );
        assert!(Severity::Mild < Severity::Severe);
    }

    #[test]
    fn test_severity_from_label_is_case_insensitive() {
        assert_eq!(Severity::from_label("MILD"), Some(Severity::Mild));
        assert_eq!(Severity::from_label(" Moderate "), Some(Severity::Moderate));
        assert_eq!(Severity::from_label("severe"), Some(Severity::Severe));
        assert_eq!(Severity::from_label("catastrophic"), None);
    }

    #[test]
    fn test_severity_from_score_buckets() {
        assert_eq!(Severity::from_score(10.0), Severity::Mild);
        assert_eq!(Severity::from_score(50.0), Severity::Moderate);
        assert_eq!(Severity::from_score(90.0), Severity::Severe);
    }

    #[test]
    fn test_method_serializes_kebab_case() {
        let json = serde_json::to_string(&ConsensusMethod::SingleFallback).unwrap();
        assert_eq!(json, "\"single-fallback\"");
    }

    #[test]
    fn test_merged_finding_flattens_finding_fields() {
        let merged = MergedFinding {
            finding: Finding::new("acne", Severity::Mild, 0.8).with_location("cheeks"),
            agreement_score: 0.5,
        };
        let value = serde_json::to_value(&merged).unwrap();
        assert_eq!(value["category"], "acne");
        assert_eq!(value["severity"], "mild");
        assert_eq!(value["location"], "cheeks");
        assert_eq!(value["agreementScore"], 0.5);
        assert!(value.get("description").is_none());
    }

    #[test]
    fn test_request_debug_hides_image() {
        let request = AnalysisRequest::new("aGVsbG8gd29ybGQ=");
        let debug = format!("{:?}", request);
        assert!(!debug.contains("aGVsbG8gd29ybGQ="));
        assert!(debug.contains("16 bytes"));
    }

    #[test]
    fn test_language_parse() {
        assert_eq!("TH".parse::<Language>().unwrap(), Language::Th);
        assert!("fr".parse::<Language>().is_err());
    }
}
