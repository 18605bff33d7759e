//! Console rendering of reports.

use std::fmt::Write;

use concord_core::{ConsensusMethod, DownstreamReport, Language};
use concord_runtime::AnalysisOutcome;

use crate::cli::OutputFormat;

pub fn render_report(
    report: &DownstreamReport,
    language: Language,
    format: OutputFormat,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Text => Ok(report_text(report, language)),
    }
}

/// Text report followed by the diagnostics of a live run.
pub fn render_outcome(
    outcome: &AnalysisOutcome,
    language: Language,
    format: OutputFormat,
) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        return render_report(&outcome.report, language, format);
    }

    let mut out = report_text(&outcome.report, language);
    let trace: Vec<&str> = outcome.transitions.iter().map(|s| s.as_str()).collect();
    let _ = writeln!(out);
    let _ = writeln!(out, "Path: {}", trace.join(" -> "));
    let _ = writeln!(out, "Elapsed: {:.1}s", outcome.elapsed.as_secs_f64());
    if let Some(degraded) = &outcome.degraded {
        let _ = writeln!(out, "Degraded: {}", degraded);
    }
    for failure in &outcome.failures {
        let _ = writeln!(out, "  ! {}", failure);
    }
    Ok(out)
}

fn report_text(report: &DownstreamReport, language: Language) -> String {
    let mut out = String::new();

    let method = match report.analysis_method {
        ConsensusMethod::Weighted => "weighted ensemble",
        ConsensusMethod::SingleFallback => "single backend (fallback)",
    };
    let _ = writeln!(
        out,
        "Overall score: {:.0}   Confidence: {:.0}%   Method: {}",
        report.overall_score,
        report.confidence * 100.0,
        method
    );
    let _ = writeln!(out, "Backends: {}", report.contributing_backends.join(", "));

    let _ = writeln!(out);
    let _ = writeln!(out, "Metrics:");
    for (name, metric) in &report.metrics {
        let description = match language {
            Language::En => &metric.description_en,
            Language::Th => &metric.description_th,
        };
        match (metric.score, metric.grade) {
            (Some(score), Some(grade)) => {
                let _ = writeln!(out, "  {:<12} {:>3.0} ({})  {}", name, score, grade, description);
            }
            _ => {
                let _ = writeln!(out, "  {:<12}   -       {}", name, description);
            }
        }
    }

    if !report.findings.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Findings:");
        for finding in &report.findings {
            let _ = write!(
                out,
                "  {} [{}] confidence {:.2}, agreement {:.2}",
                finding.category(),
                finding.severity(),
                finding.confidence(),
                finding.agreement_score
            );
            if let Some(location) = &finding.finding.location {
                let _ = write!(out, " @ {}", location);
            }
            let _ = writeln!(out);
        }
    }

    if !report.recommendations.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Recommendations:");
        for (i, rec) in report.recommendations.iter().enumerate() {
            let _ = writeln!(out, "  {}. {} ({:?})", i + 1, rec.title, rec.priority);
        }
    }

    out
}
