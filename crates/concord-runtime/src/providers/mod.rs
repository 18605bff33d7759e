//! LLM provider abstractions.
//!
//! This module defines the trait every vision-capable backend implements,
//! plus HTTP implementations for Anthropic, OpenAI and Gemini. Each concrete
//! provider sits behind its own cargo feature.
//!
//! ## Security
//!
//! All providers load keys through [`ApiCredential`], which redacts itself in
//! `Debug` and `Display` output.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

mod factory;
pub mod secrets;

#[cfg(feature = "reqwest")]
mod http;

#[cfg(feature = "anthropic")]
mod anthropic;
#[cfg(feature = "gemini")]
mod gemini;
#[cfg(feature = "openai")]
mod openai;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use secrets::{ApiCredential, CredentialSource, EndpointSpec};

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicProvider, AnthropicProviderFactory, ANTHROPIC_ENDPOINT};
#[cfg(feature = "gemini")]
pub use gemini::{GeminiProvider, GeminiProviderFactory, GEMINI_ENDPOINT};
#[cfg(feature = "openai")]
pub use openai::{OpenAiProvider, OpenAiProviderFactory, OPENAI_ENDPOINT};

/// Errors from LLM providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// Configuration for a completion request.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Model to use
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    pub temperature: f32,

    /// HTTP-level timeout; the orchestrator enforces its own deadline as well
    pub timeout: Option<Duration>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            max_tokens: 2048,
            temperature: 0.3,
            timeout: None,
        }
    }
}

/// A base64 image attached to a chat message.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAttachment {
    /// MIME type, e.g. `image/jpeg`
    pub media_type: String,

    /// Base64 payload without any `data:` prefix
    pub data: String,
}

impl ImageAttachment {
    /// Build from raw base64 or a `data:<mime>;base64,<payload>` URI.
    ///
    /// Without a data URI prefix the type is sniffed from the leading
    /// base64 characters, defaulting to JPEG.
    pub fn from_base64(input: &str) -> Self {
        let input = input.trim();
        if let Some(rest) = input.strip_prefix("data:") {
            if let Some((media_type, data)) = rest.split_once(";base64,") {
                return Self {
                    media_type: media_type.to_string(),
                    data: data.to_string(),
                };
            }
        }

        let media_type = if input.starts_with("iVBORw0KGgo") {
            "image/png"
        } else if input.starts_with("UklGR") {
            "image/webp"
        } else if input.starts_with("R0lGOD") {
            "image/gif"
        } else {
            "image/jpeg"
        };

        Self {
            media_type: media_type.to_string(),
            data: input.to_string(),
        }
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

impl fmt::Debug for ImageAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageAttachment")
            .field("media_type", &self.media_type)
            .field("data", &format_args!("<{} bytes>", self.data.len()))
            .finish()
    }
}

/// A chat message for LLM completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant"
    pub role: String,

    /// Message content
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageAttachment>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
            image: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            image: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
            image: None,
        }
    }

    /// Attach an image to this message.
    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.image = Some(image);
        self
    }

    pub fn is_system(&self) -> bool {
        self.role == "system"
    }
}

/// Response from an LLM completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated content
    pub content: String,

    pub usage: TokenUsage,

    /// Model that actually answered
    pub model: String,

    pub stop_reason: Option<String>,
}

/// Token usage from a completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Provider abstraction allows swapping LLM backends.
///
/// Backend adapters are the only callers. The aggregator never talks to a
/// provider.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Execute a chat completion.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Check if provider is usable.
    async fn health_check(&self) -> bool;

    /// Provider name for logs.
    fn name(&self) -> &str;
}

/// Split off the system message; later system messages replace earlier ones.
#[cfg_attr(not(feature = "reqwest"), allow(dead_code))]
pub(crate) fn split_system(messages: Vec<ChatMessage>) -> (Option<String>, Vec<ChatMessage>) {
    let mut system = None;
    let mut others = Vec::new();
    for msg in messages {
        if msg.is_system() {
            system = Some(msg.content);
        } else {
            others.push(msg);
        }
    }
    (system, others)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_creation() {
        assert_eq!(ChatMessage::system("s").role, "system");
        assert_eq!(ChatMessage::user("u").role, "user");
        assert_eq!(ChatMessage::assistant("a").role, "assistant");
        assert!(ChatMessage::user("u").image.is_none());
    }

    #[test]
    fn test_image_from_data_uri() {
        let image = ImageAttachment::from_base64("data:image/png;base64,AAAA");
        assert_eq!(image.media_type, "image/png");
        assert_eq!(image.data, "AAAA");
        assert_eq!(image.data_uri(), "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_image_type_sniffing() {
        assert_eq!(ImageAttachment::from_base64("/9j/4AAQ").media_type, "image/jpeg");
        assert_eq!(ImageAttachment::from_base64("iVBORw0KGgoAAA").media_type, "image/png");
        assert_eq!(ImageAttachment::from_base64("UklGRiQAAABXRUJQ").media_type, "image/webp");
    }

    #[test]
    fn test_image_debug_hides_payload() {
        let message = ChatMessage::user("look").with_image(ImageAttachment::from_base64("/9j/SECRETPIXELS"));
        let debug = format!("{:?}", message);
        assert!(!debug.contains("SECRETPIXELS"));
        assert!(debug.contains("image/jpeg"));
    }

    #[test]
    fn test_split_system() {
        let (system, rest) = split_system(vec![
            ChatMessage::system("rules"),
            ChatMessage::user("hello"),
        ]);
        assert_eq!(system.as_deref(), Some("rules"));
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].role, "user");
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 50,
        };
        assert_eq!(usage.total(), 150);
    }
}
