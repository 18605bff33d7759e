//! Anthropic Claude provider (Messages API) with base64 image blocks.

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

/// Key and endpoint lookup for `provider: anthropic` backends.
pub const ANTHROPIC_ENDPOINT: EndpointSpec = EndpointSpec {
    label: "Anthropic API key",
    env_var: "ANTHROPIC_API_KEY",
    default_base_url: "https://api.anthropic.com/v1",
};

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    credential: ApiCredential,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            credential: ApiCredential::inline(api_key, ANTHROPIC_ENDPOINT.label),
            base_url: ANTHROPIC_ENDPOINT.default_base_url.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from backend options; the key falls back to `ANTHROPIC_API_KEY`.
    pub fn from_config(options: &JsonValue) -> Result<Self, ProviderError> {
        Ok(Self {
            credential: ApiCredential::resolve(options, &ANTHROPIC_ENDPOINT)?,
            base_url: secrets::base_url(options, &ANTHROPIC_ENDPOINT)?,
            client: reqwest::Client::new(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn build_request(messages: Vec<ChatMessage>, config: &CompletionConfig) -> AnthropicRequest {
        let (system, messages) = split_system(messages);

        let messages = messages
            .into_iter()
            .map(|msg| {
                let mut content = vec![ContentBlock::Text { text: msg.content }];
                if let Some(image) = msg.image {
                    content.push(ContentBlock::Image {
                        source: ImageSource {
                            kind: "base64",
                            media_type: image.media_type,
                            data: image.data,
                        },
                    });
                }
                AnthropicMessage {
                    role: msg.role,
                    content,
                }
            })
            .collect();

        AnthropicRequest {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            system,
            messages,
            temperature: config.temperature,
        }
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlockResponse>,
    model: String,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlockResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = Self::build_request(messages, config);

        let builder = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.credential.expose())
            .header("anthropic-version", API_VERSION)
            .json(&request);

        let response = http::with_timeout(builder, config.timeout)
            .send()
            .await
            .map_err(|e| http::send_error(e, config.timeout))?;

        if !response.status().is_success() {
            return Err(http::error_for_status(response, http::nested_error_message).await);
        }

        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let content = body
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: body.usage.input_tokens,
                completion_tokens: body.usage.output_tokens,
            },
            model: body.model,
            stop_reason: body.stop_reason,
        })
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_blank()
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

/// Factory for Anthropic providers.
///
/// ```json
/// { "api_key": "sk-ant-...", "base_url": "https://..." }
/// ```
pub struct AnthropicProviderFactory;

impl ProviderFactory for AnthropicProviderFactory {
    fn provider_type(&self) -> &'static str {
        "anthropic"
    }

    fn endpoint(&self) -> &'static EndpointSpec {
        &ANTHROPIC_ENDPOINT
    }

    fn create(&self, options: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(AnthropicProvider::from_config(options)?))
    }
}
