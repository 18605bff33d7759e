//! Result Normalizer: maps a [`ConsensusResult`] onto the report shape that
//! downstream consumers (report builder, UI) read.
//!
//! The mapping is pure. Numbers are copied from the consensus, never
//! recomputed, and every merged finding is carried through in order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::{ConsensusMethod, ConsensusResult, MergedFinding};

/// Recommendations at an index below this are high priority.
pub const HIGH_PRIORITY_RECOMMENDATIONS: usize = 2;

/// Score at or above which a metric reads as excellent.
const EXCELLENT_THRESHOLD: f64 = 85.0;

/// Score at or above which a metric reads as good.
const GOOD_THRESHOLD: f64 = 70.0;

/// Text pair used when no backend reported a standard metric.
pub const NOT_ASSESSED: (&str, &str) = ("Not assessed.", "ไม่ได้รับการประเมิน");

/// Letter grade for a 0-100 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Grade::A
        } else if score >= 80.0 {
            Grade::B
        } else if score >= 70.0 {
            Grade::C
        } else if score >= 60.0 {
            Grade::D
        } else {
            Grade::F
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };
        f.write_str(letter)
    }
}

/// Direction a metric is moving. A single analysis has no history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    #[default]
    Stable,
    Declining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
}

/// Per-metric entry in the downstream report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricReport {
    /// `None` when no backend reported the metric
    pub score: Option<f64>,
    pub grade: Option<Grade>,
    pub trend: Trend,
    pub description_en: String,
    pub description_th: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub title: String,
    pub priority: Priority,
}

/// Shape consumed by the report builder and UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownstreamReport {
    pub overall_score: f64,
    pub metrics: BTreeMap<String, MetricReport>,
    pub findings: Vec<MergedFinding>,
    pub recommendations: Vec<Recommendation>,
    pub confidence: f64,
    pub contributing_backends: Vec<String>,
    pub analysis_method: ConsensusMethod,
}

impl DownstreamReport {
    pub fn metric(&self, name: &str) -> Option<&MetricReport> {
        self.metrics.get(name)
    }
}

/// One standard metric and its three description bands (excellent, good, poor).
struct StandardMetric {
    name: &'static str,
    en: [&'static str; 3],
    th: [&'static str; 3],
}

/// The eight metrics every report carries, in report order.
pub const STANDARD_METRICS: [&str; 8] = [
    "wrinkles", "spots", "pores", "texture", "evenness", "firmness", "radiance", "hydration",
];

const METRIC_TEXT: [StandardMetric; 8] = [
    StandardMetric {
        name: "wrinkles",
        en: [
            "Excellent skin condition. Minimal fine lines detected.",
            "Fine lines visible around eyes and forehead. Good skin elasticity maintained.",
            "Moderate wrinkles detected. Consider anti-aging treatments.",
        ],
        th: [
            "สภาพผิวยอดเยี่ยม ตรวจพบริ้วรอยน้อยมาก",
            "มีริ้วรอยเล็กน้อยรอบดวงตาและหน้าผาก ความยืดหยุ่นของผิวยังดี",
            "พบริ้วรอยปานกลาง แนะนำการรักษาต้านริ้วรอย",
        ],
    },
    StandardMetric {
        name: "spots",
        en: [
            "Clear skin with minimal pigmentation.",
            "Some pigmentation and age spots detected. Recommend brightening treatments.",
            "Multiple dark spots detected. Brightening treatment recommended.",
        ],
        th: [
            "ผิวใส มีจุดด่างดำน้อยมาก",
            "พบจุดด่างดำและฝ้าบางส่วน แนะนำการรักษาเพื่อปรับสีผิว",
            "พบจุดด่างดำหลายจุด แนะนำการรักษาเพื่อผิวกระจ่างใส",
        ],
    },
    StandardMetric {
        name: "pores",
        en: [
            "Excellent pore condition. Very fine pores.",
            "Pores slightly visible in T-zone. Overall good pore condition.",
            "Enlarged pores detected. Pore tightening treatment recommended.",
        ],
        th: [
            "สภาพรูขุมขนยอดเยี่ยม รูขุมขนละเอียดมาก",
            "รูขุมขนมองเห็นเล็กน้อยบริเวณ T-zone สภาพรูขุมขนโดยรวมดี",
            "พบรูขุมขนกว้าง แนะนำการรักษาเพื่อกระชับรูขุมขน",
        ],
    },
    StandardMetric {
        name: "texture",
        en: [
            "Smooth skin texture with minimal roughness. Excellent condition.",
            "Good skin texture. Some minor uneven areas detected.",
            "Rough skin texture detected. Resurfacing treatment recommended.",
        ],
        th: [
            "พื้นผิวผิวเรียบเนียนมีความขรุขระน้อยมาก สภาพดีเยี่ยม",
            "พื้นผิวผิวดี พบบริเวณที่ไม่เรียบเล็กน้อย",
            "พบพื้นผิวผิวขรุขระ แนะนำการรักษาเพื่อปรับผิว",
        ],
    },
    StandardMetric {
        name: "evenness",
        en: [
            "Very even skin tone throughout.",
            "Mild uneven skin tone. Some areas of hyperpigmentation noted.",
            "Uneven skin tone. Color correction treatment recommended.",
        ],
        th: [
            "สีผิวสม่ำเสมอมาก",
            "สีผิวไม่สม่ำเสมอเล็กน้อย พบบริเวณที่มีเม็ดสีเข้มขึ้นบางส่วน",
            "สีผิวไม่สม่ำเสมอ แนะนำการรักษาเพื่อปรับสีผิว",
        ],
    },
    StandardMetric {
        name: "firmness",
        en: [
            "Excellent skin firmness and elasticity.",
            "Good skin firmness and elasticity. Minimal sagging observed.",
            "Loss of firmness detected. Skin tightening treatment recommended.",
        ],
        th: [
            "ความกระชับและยืดหยุ่นของผิวยอดเยี่ยม",
            "ความกระชับและยืดหยุ่นของผิวดี มีความหย่อนคล้อยน้อยมาก",
            "พบการสูญเสียความกระชับ แนะนำการรักษาเพื่อกระชับผิว",
        ],
    },
    StandardMetric {
        name: "radiance",
        en: [
            "Radiant and glowing skin.",
            "Skin appears slightly dull. Could benefit from brightening treatments.",
            "Dull skin detected. Brightening treatment highly recommended.",
        ],
        th: [
            "ผิวกระจ่างใสและเปล่งปลั่ง",
            "ผิวดูหมองคล้ำเล็กน้อย อาจได้รับประโยชน์จากการบำรุงเพื่อเพิ่มความกระจ่างใส",
            "พบผิวหมองคล้ำ แนะนำการรักษาเพื่อผิวกระจ่างใสอย่างยิ่ง",
        ],
    },
    StandardMetric {
        name: "hydration",
        en: [
            "Well-hydrated skin with good moisture retention.",
            "Slightly dehydrated areas. A daily moisturizer is recommended.",
            "Dehydrated skin detected. Intensive hydration care highly recommended.",
        ],
        th: [
            "ผิวชุ่มชื้นดี กักเก็บความชุ่มชื้นได้ดี",
            "ผิวขาดน้ำเล็กน้อยในบางบริเวณ แนะนำให้ใช้มอยส์เจอไรเซอร์ทุกวัน",
            "พบผิวขาดน้ำ แนะนำการบำรุงเพิ่มความชุ่มชื้นอย่างเข้มข้น",
        ],
    },
];

/// Bands for metrics outside the standard set.
const GENERIC_TEXT: StandardMetric = StandardMetric {
    name: "",
    en: [
        "Excellent condition.",
        "Good condition with minor concerns.",
        "Needs attention.",
    ],
    th: [
        "สภาพดีเยี่ยม",
        "สภาพดี มีข้อกังวลเล็กน้อย",
        "ควรได้รับการดูแล",
    ],
};

fn band(score: f64) -> usize {
    if score >= EXCELLENT_THRESHOLD {
        0
    } else if score >= GOOD_THRESHOLD {
        1
    } else {
        2
    }
}

fn text_for(name: &str) -> &'static StandardMetric {
    METRIC_TEXT
        .iter()
        .find(|m| m.name == name)
        .unwrap_or(&GENERIC_TEXT)
}

fn metric_report(name: &str, score: Option<f64>) -> MetricReport {
    match score {
        Some(score) => {
            let text = text_for(name);
            let band = band(score);
            MetricReport {
                score: Some(score),
                grade: Some(Grade::from_score(score)),
                trend: Trend::default(),
                description_en: text.en[band].to_string(),
                description_th: text.th[band].to_string(),
            }
        }
        None => MetricReport {
            score: None,
            grade: None,
            trend: Trend::default(),
            description_en: NOT_ASSESSED.0.to_string(),
            description_th: NOT_ASSESSED.1.to_string(),
        },
    }
}

/// Map a consensus onto the downstream report.
pub fn normalize(consensus: &ConsensusResult) -> DownstreamReport {
    let mut metrics: BTreeMap<String, MetricReport> = STANDARD_METRICS
        .iter()
        .map(|name| {
            let score = consensus.fused_metric_scores.get(*name).copied();
            (name.to_string(), metric_report(name, score))
        })
        .collect();

    for (name, score) in &consensus.fused_metric_scores {
        if !metrics.contains_key(name) {
            metrics.insert(name.clone(), metric_report(name, Some(*score)));
        }
    }

    let recommendations = consensus
        .suggestions
        .iter()
        .enumerate()
        .map(|(index, title)| Recommendation {
            title: title.clone(),
            priority: if index < HIGH_PRIORITY_RECOMMENDATIONS {
                Priority::High
            } else {
                Priority::Medium
            },
        })
        .collect();

    DownstreamReport {
        overall_score: consensus.overall_score,
        metrics,
        findings: consensus.merged_findings.clone(),
        recommendations,
        confidence: consensus.confidence,
        contributing_backends: consensus.contributing_backends.clone(),
        analysis_method: consensus.method,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Finding, Severity};

    fn consensus() -> ConsensusResult {
        ConsensusResult {
            fused_metric_scores: BTreeMap::from([
                ("wrinkles".to_string(), 88.0),
                ("pores".to_string(), 72.0),
                ("spots".to_string(), 55.0),
                ("redness".to_string(), 64.0),
            ]),
            merged_findings: vec![
                MergedFinding {
                    finding: Finding::new("acne", Severity::Moderate, 0.85),
                    agreement_score: 1.0,
                },
                MergedFinding {
                    finding: Finding::new("dryness", Severity::Mild, 0.4),
                    agreement_score: 0.5,
                },
            ],
            overall_score: 74.0,
            confidence: 0.93,
            contributing_backends: vec!["gpt-4o".to_string(), "claude-3-5-sonnet".to_string()],
            method: ConsensusMethod::Weighted,
            suggestions: vec!["SPF 50".into(), "Retinol".into(), "Hydrate".into()],
        }
    }

    #[test]
    fn test_grade_thresholds() {
        assert_eq!(Grade::from_score(90.0), Grade::A);
        assert_eq!(Grade::from_score(89.9), Grade::B);
        assert_eq!(Grade::from_score(70.0), Grade::C);
        assert_eq!(Grade::from_score(60.0), Grade::D);
        assert_eq!(Grade::from_score(59.0), Grade::F);
    }

    #[test]
    fn test_numbers_are_copied() {
        let source = consensus();
        let report = normalize(&source);

        assert_eq!(report.overall_score, source.overall_score);
        assert_eq!(report.confidence, source.confidence);
        assert_eq!(report.metric("wrinkles").unwrap().score, Some(88.0));
        assert_eq!(report.analysis_method, ConsensusMethod::Weighted);
        assert_eq!(report.contributing_backends, source.contributing_backends);
    }

    #[test]
    fn test_findings_kept_in_order() {
        let source = consensus();
        let report = normalize(&source);
        assert_eq!(report.findings, source.merged_findings);
    }

    #[test]
    fn test_descriptions_follow_bands() {
        let report = normalize(&consensus());
        assert_eq!(
            report.metric("wrinkles").unwrap().description_en,
            "Excellent skin condition. Minimal fine lines detected."
        );
        assert_eq!(
            report.metric("pores").unwrap().description_en,
            "Pores slightly visible in T-zone. Overall good pore condition."
        );
        assert_eq!(report.metric("spots").unwrap().grade, Some(Grade::F));
        assert_eq!(report.metric("spots").unwrap().trend, Trend::Stable);
    }

    #[test]
    fn test_hydration_bands_differ() {
        let descriptions: Vec<String> = [92.0, 75.0, 20.0]
            .into_iter()
            .map(|score| {
                let mut source = consensus();
                source.fused_metric_scores.insert("hydration".to_string(), score);
                normalize(&source).metric("hydration").unwrap().description_en.clone()
            })
            .collect();

        assert_eq!(descriptions[0], "Well-hydrated skin with good moisture retention.");
        assert!(descriptions[2].starts_with("Dehydrated skin"));
        assert_ne!(descriptions[0], descriptions[1]);
        assert_ne!(descriptions[1], descriptions[2]);
    }

    #[test]
    fn test_unreported_standard_metric_is_not_fabricated() {
        let report = normalize(&consensus());
        let hydration = report.metric("hydration").unwrap();
        assert_eq!(hydration.score, None);
        assert_eq!(hydration.grade, None);
        assert_eq!(hydration.description_en, NOT_ASSESSED.0);
    }

    #[test]
    fn test_extra_metrics_are_kept() {
        let report = normalize(&consensus());
        assert_eq!(report.metrics.len(), STANDARD_METRICS.len() + 1);
        let redness = report.metric("redness").unwrap();
        assert_eq!(redness.score, Some(64.0));
        assert_eq!(redness.grade, Some(Grade::D));
    }

    #[test]
    fn test_first_two_recommendations_are_high_priority() {
        let report = normalize(&consensus());
        let priorities: Vec<Priority> = report.recommendations.iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![Priority::High, Priority::High, Priority::Medium]);
        assert_eq!(report.recommendations[0].title, "SPF 50");
    }

    #[test]
    fn test_serializes_camel_case() {
        let value = serde_json::to_value(normalize(&consensus())).unwrap();
        assert_eq!(value["analysisMethod"], "weighted");
        assert_eq!(value["metrics"]["wrinkles"]["grade"], "A");
        assert_eq!(value["metrics"]["wrinkles"]["trend"], "stable");
        assert!(value["metrics"]["hydration"]["score"].is_null());
        assert_eq!(value["findings"][0]["agreementScore"], 1.0);
    }
}
