//! Google Gemini provider (generateContent) with `inline_data` image parts.
//!
//! The key travels in the `x-goog-api-key` header rather than the query
//! string so it cannot leak through URLs in error messages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

use super::{
    factory::ProviderFactory,
    http,
    secrets::{self, ApiCredential, EndpointSpec},
    split_system, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    TokenUsage,
};

/// Key and endpoint lookup for `provider: gemini` backends.
pub const GEMINI_ENDPOINT: EndpointSpec = EndpointSpec {
    label: "Gemini API key",
    env_var: "GEMINI_API_KEY",
    default_base_url: "https://generativelanguage.googleapis.com/v1beta",
};

pub struct GeminiProvider {
    credential: ApiCredential,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            credential: ApiCredential::inline(api_key, GEMINI_ENDPOINT.label),
            base_url: GEMINI_ENDPOINT.default_base_url.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from backend options; the key falls back to `GEMINI_API_KEY`.
    pub fn from_config(options: &JsonValue) -> Result<Self, ProviderError> {
        Ok(Self {
            credential: ApiCredential::resolve(options, &GEMINI_ENDPOINT)?,
            base_url: secrets::base_url(options, &GEMINI_ENDPOINT)?,
            client: reqwest::Client::new(),
        })
    }

    fn build_request(messages: Vec<ChatMessage>, config: &CompletionConfig) -> GeminiRequest {
        let (system, messages) = split_system(messages);

        let contents = messages
            .into_iter()
            .map(|msg| {
                let mut parts = vec![Part::Text { text: msg.content }];
                if let Some(image) = msg.image {
                    parts.push(Part::InlineData {
                        inline_data: InlineData {
                            mime_type: image.media_type,
                            data: image.data,
                        },
                    });
                }
                Content {
                    // Gemini calls the assistant "model"
                    role: if msg.role == "assistant" {
                        "model".to_string()
                    } else {
                        msg.role
                    },
                    parts,
                }
            })
            .collect();

        GeminiRequest {
            system_instruction: system.map(|text| SystemInstruction {
                parts: vec![Part::Text { text }],
            }),
            contents,
            generation_config: GenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_tokens,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = Self::build_request(messages, config);

        let builder = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, config.model
            ))
            .header("x-goog-api-key", self.credential.expose())
            .json(&request);

        let response = http::with_timeout(builder, config.timeout)
            .send()
            .await
            .map_err(|e| http::send_error(e, config.timeout))?;

        if !response.status().is_success() {
            return Err(http::error_for_status(response, http::nested_error_message).await);
        }

        let body: GeminiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let candidate = body
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ParseError("response has no candidates".to_string()))?;

        let content = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let usage = body
            .usage_metadata
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content,
            usage,
            model: body.model_version.unwrap_or_else(|| config.model.clone()),
            stop_reason: candidate.finish_reason,
        })
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_blank()
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Factory for Gemini providers.
///
/// ```json
/// { "api_key": "AIza...", "base_url": "https://..." }
/// ```
pub struct GeminiProviderFactory;

impl ProviderFactory for GeminiProviderFactory {
    fn provider_type(&self) -> &'static str {
        "gemini"
    }

    fn endpoint(&self) -> &'static EndpointSpec {
        &GEMINI_ENDPOINT
    }

    fn create(&self, options: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(GeminiProvider::from_config(options)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ImageAttachment;

    #[test]
    fn test_request_shape() {
        let messages = vec![
            ChatMessage::system("rules"),
            ChatMessage::user("Analyze").with_image(ImageAttachment::from_base64("/9j/AAAA")),
        ];
        let config = CompletionConfig {
            model: "gemini-1.5-flash".to_string(),
            temperature: 0.1,
            max_tokens: 2048,
            timeout: None,
        };
        let value = serde_json::to_value(GeminiProvider::build_request(messages, &config)).unwrap();

        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "rules");
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["contents"][0]["parts"][0]["text"], "Analyze");
        assert_eq!(
            value["contents"][0]["parts"][1]["inline_data"]["mime_type"],
            "image/jpeg"
        );
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 2048);
    }

    #[test]
    fn test_response_text_is_joined() {
        let body: GeminiResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": "{\"overall"}, {"text": "Score\": 70}"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5}
        }))
        .unwrap();
        let parts = &body.candidates[0].content.as_ref().unwrap().parts;
        let text: String = parts.iter().filter_map(|p| p.text.clone()).collect();
        assert_eq!(text, "{\"overallScore\": 70}");
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let secret_key = "AIza-secret-key-24680";
        let debug_output = format!("{:?}", GeminiProvider::new(secret_key));
        assert!(!debug_output.contains(secret_key));
    }
}
