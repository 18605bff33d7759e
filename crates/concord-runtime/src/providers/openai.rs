//! OpenAI provider (Chat Completions) with `image_url` data URI parts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

use super::{
    factory::ProviderFactory,
    http,
    secrets::{self, ApiCredential, EndpointSpec},
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
};

/// Key and endpoint lookup for `provider: openai` backends.
pub const OPENAI_ENDPOINT: EndpointSpec = EndpointSpec {
    label: "OpenAI API key",
    env_var: "OPENAI_API_KEY",
    default_base_url: "https://api.openai.com/v1",
};

pub struct OpenAiProvider {
    credential: ApiCredential,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            credential: ApiCredential::inline(api_key, OPENAI_ENDPOINT.label),
            base_url: OPENAI_ENDPOINT.default_base_url.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from backend options; the key falls back to `OPENAI_API_KEY`.
    pub fn from_config(options: &JsonValue) -> Result<Self, ProviderError> {
        Ok(Self {
            credential: ApiCredential::resolve(options, &OPENAI_ENDPOINT)?,
            base_url: secrets::base_url(options, &OPENAI_ENDPOINT)?,
            client: reqwest::Client::new(),
        })
    }

    fn build_request(messages: Vec<ChatMessage>, config: &CompletionConfig) -> OpenAiRequest {
        let messages = messages
            .into_iter()
            .map(|msg| {
                let content = match msg.image {
                    None => MessageContent::Text(msg.content),
                    Some(image) => MessageContent::Parts(vec![
                        ContentPart::Text { text: msg.content },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: image.data_uri(),
                            },
                        },
                    ]),
                };
                OpenAiMessage {
                    role: msg.role,
                    content,
                }
            })
            .collect();

        OpenAiRequest {
            model: config.model.clone(),
            messages,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
    model: String,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = Self::build_request(messages, config);

        let builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.credential.expose())
            .json(&request);

        let response = http::with_timeout(builder, config.timeout)
            .send()
            .await
            .map_err(|e| http::send_error(e, config.timeout))?;

        if !response.status().is_success() {
            return Err(http::error_for_status(response, http::nested_error_message).await);
        }

        let body: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ParseError("response has no choices".to_string()))?;

        let usage = body
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            usage,
            model: body.model,
            stop_reason: choice.finish_reason,
        })
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_blank()
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Factory for OpenAI providers.
///
/// ```json
/// { "api_key": "sk-...", "base_url": "https://..." }
/// ```
pub struct OpenAiProviderFactory;

impl ProviderFactory for OpenAiProviderFactory {
    fn provider_type(&self) -> &'static str {
        "openai"
    }

    fn endpoint(&self) -> &'static EndpointSpec {
        &OPENAI_ENDPOINT
    }

    fn create(&self, options: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(OpenAiProvider::from_config(options)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ImageAttachment;

    #[test]
    fn test_image_becomes_data_uri_part() {
        let messages = vec![
            ChatMessage::system("rules"),
            ChatMessage::user("Analyze").with_image(ImageAttachment::from_base64("iVBORw0KGgoAAAA")),
        ];
        let request = OpenAiProvider::build_request(messages, &CompletionConfig::default());
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["messages"][0]["content"], "rules");
        let parts = &value["messages"][1]["content"];
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(
            parts[1]["image_url"]["url"],
            "data:image/png;base64,iVBORw0KGgoAAAA"
        );
        assert_eq!(value["model"], "gpt-4o");
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let secret_key = "sk-proj-secret-key-98765";
        let debug_output = format!("{:?}", OpenAiProvider::new(secret_key));
        assert!(!debug_output.contains(secret_key));
    }

    #[test]
    fn test_factory_creates_with_inline_key() {
        let provider = OpenAiProviderFactory
            .create(&serde_json::json!({ "api_key": "k" }))
            .unwrap();
        assert_eq!(provider.name(), "openai");
    }
}
