//! Prompts sent to every backend.
//!
//! All backends get the same system prompt for a request so their replies
//! can be fused. The prompt fixes the reply vocabulary the payload parser
//! reads: `findings`, `metricScores`, `recommendations`, `overallScore`.

use concord_core::{AnalysisRequest, AnalysisType};

/// Role and output contract shared by all analysis types.
const BASE_SYSTEM_PROMPT: &str = r#"You are an expert dermatologist AI analyzing a facial skin image.

Score each of these metrics from 0 to 100 (higher is healthier):
1. wrinkles - fine lines and deep wrinkles
2. spots - dark spots, age spots, melasma
3. pores - pore size and visibility
4. texture - smoothness and roughness
5. evenness - skin tone uniformity
6. firmness - elasticity and sagging
7. radiance - brightness and glow
8. hydration - moisture level

For each concern you find, report:
- type (acne, wrinkles, pigmentation, redness, dryness, ...)
- severity: "mild", "moderate" or "severe"
- confidence between 0 and 1
- location on the face
- a brief description

Give 3-5 personalised recommendations and an overall score from 0 to 100.

Reply with a single JSON object and nothing else:
{
  "findings": [{"type": "...", "severity": "mild", "confidence": 0.9, "location": "...", "description": "..."}],
  "metricScores": {"wrinkles": 85, "spots": 78, "pores": 70, "texture": 80, "evenness": 75, "firmness": 82, "radiance": 77, "hydration": 74},
  "recommendations": ["...", "..."],
  "overallScore": 80
}"#;

fn depth_instruction(analysis_type: AnalysisType) -> &'static str {
    match analysis_type {
        AnalysisType::Quick => {
            "Keep descriptions to one short sentence and report only the most visible concerns."
        }
        AnalysisType::Detailed => {
            "Examine every facial region and report all concerns you can see, with locations."
        }
        AnalysisType::Medical => {
            "Use clinical terminology, note anything that may warrant in-person review by a dermatologist, and be conservative with severity."
        }
    }
}

/// System prompt for a request.
pub fn system_prompt(request: &AnalysisRequest) -> String {
    format!(
        "{base}\n\n{depth}\n\nWrite every description and recommendation in {language}. Keep JSON keys and severity values in English.",
        base = BASE_SYSTEM_PROMPT,
        depth = depth_instruction(request.analysis_type),
        language = request.language.display_name(),
    )
}

/// User turn that accompanies the image.
pub fn user_prompt(request: &AnalysisRequest) -> String {
    format!(
        "Analyze this facial skin image. Language: {}. Analysis type: {}.",
        request.language.as_str(),
        request.analysis_type.as_str()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::{Language, STANDARD_METRICS};

    #[test]
    fn test_prompt_names_every_standard_metric() {
        let prompt = system_prompt(&AnalysisRequest::new("img"));
        for metric in STANDARD_METRICS {
            assert!(prompt.contains(metric), "missing {metric}");
        }
        assert!(prompt.contains("\"overallScore\""));
    }

    #[test]
    fn test_prompt_follows_language_and_type() {
        let request = AnalysisRequest::new("img")
            .with_language(Language::Th)
            .with_analysis_type(AnalysisType::Medical);
        let prompt = system_prompt(&request);
        assert!(prompt.contains("Thai"));
        assert!(prompt.contains("clinical terminology"));
        assert_eq!(
            user_prompt(&request),
            "Analyze this facial skin image. Language: th. Analysis type: medical."
        );
    }
}
