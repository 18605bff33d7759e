//! Adapter that drives an [`LlmProvider`] with the skin-analysis prompt.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;

use concord_core::{parse_reply, AnalysisRequest, BackendResponse};

use super::{BackendAdapter, BackendError};
use crate::config::BackendConfig;
use crate::prompts;
use crate::providers::{
    ChatMessage, CompletionConfig, ImageAttachment, LlmProvider, ProviderError, ProviderRegistry,
};

/// A backend backed by a chat-completion provider.
pub struct ProviderBackend {
    id: String,
    provider: Arc<dyn LlmProvider>,
    completion: CompletionConfig,
}

impl std::fmt::Debug for ProviderBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderBackend")
            .field("id", &self.id)
            .field("provider", &self.provider.name())
            .field("model", &self.completion.model)
            .finish()
    }
}

impl ProviderBackend {
    pub fn new(
        id: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
        completion: CompletionConfig,
    ) -> Self {
        Self {
            id: id.into(),
            provider,
            completion,
        }
    }

    /// Build from a backend entry, resolving its provider through the registry.
    pub fn from_config(
        backend: &BackendConfig,
        registry: &ProviderRegistry,
        timeout: Option<std::time::Duration>,
    ) -> Result<Self, ProviderError> {
        let provider = registry.create(&backend.provider, &backend.options)?;
        let completion = CompletionConfig {
            model: backend.model.clone(),
            max_tokens: backend.max_tokens,
            temperature: backend.temperature,
            timeout,
        };
        Ok(Self::new(backend.id.clone(), provider, completion))
    }

    pub fn completion_config(&self) -> &CompletionConfig {
        &self.completion
    }

    fn messages(request: &AnalysisRequest) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(prompts::system_prompt(request)),
            ChatMessage::user(prompts::user_prompt(request))
                .with_image(ImageAttachment::from_base64(&request.image_base64)),
        ]
    }
}

#[async_trait]
impl BackendAdapter for ProviderBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, request: &AnalysisRequest) -> Result<BackendResponse, BackendError> {
        let started = Instant::now();

        let completion = self
            .provider
            .complete(Self::messages(request), &self.completion)
            .await
            .map_err(|e| BackendError::new(&self.id, e))?;

        let latency_ms = started.elapsed().as_millis() as u64;
        tracing::trace!(backend = %self.id, raw = %completion.content, "Backend reply");

        let payload =
            parse_reply(&completion.content).map_err(|e| BackendError::new(&self.id, e))?;

        tracing::debug!(
            backend = %self.id,
            model = %completion.model,
            latency_ms,
            tokens = completion.usage.total(),
            findings = payload.findings.len(),
            "Backend responded"
        );

        Ok(payload.into_response(self.id.clone(), latency_ms, completion.content))
    }

    async fn health_check(&self) -> bool {
        self.provider.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::BackendFailure;
    use crate::providers::{CompletionResponse, TokenUsage};
    use concord_core::{ParseError, Severity};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replies with canned text and remembers what it was sent.
    struct ScriptedProvider {
        reply: Result<String, fn() -> ProviderError>,
        delay: Duration,
        seen: Mutex<Vec<ChatMessage>>,
    }

    impl ScriptedProvider {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(err: fn() -> ProviderError) -> Self {
            Self {
                reply: Err(err),
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            self.seen.lock().unwrap().extend(messages);
            tokio::time::sleep(self.delay).await;
            match &self.reply {
                Ok(text) => Ok(CompletionResponse {
                    content: text.clone(),
                    usage: TokenUsage::default(),
                    model: config.model.clone(),
                    stop_reason: None,
                }),
                Err(make) => Err(make()),
            }
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn backend(provider: ScriptedProvider) -> (ProviderBackend, Arc<ScriptedProvider>) {
        let provider = Arc::new(provider);
        let backend = ProviderBackend::new("gpt-4o", provider.clone(), CompletionConfig::default());
        (backend, provider)
    }

    #[tokio::test]
    async fn test_parses_reply_into_response() {
        let (backend, provider) = backend(ScriptedProvider::replying(
            r#"Sure! {"concerns": [{"type": "acne", "severity": "severe"}], "overallScore": 64}"#,
        ));
        let response = backend.invoke(&AnalysisRequest::new("/9j/AAAA")).await.unwrap();

        assert_eq!(response.backend_id, "gpt-4o");
        assert_eq!(response.overall_score, 64.0);
        assert_eq!(response.findings[0].severity, Severity::Severe);
        assert!(response.raw_text.starts_with("Sure!"));

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].is_system());
        assert_eq!(seen[1].image.as_ref().unwrap().media_type, "image/jpeg");
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_latency() {
        let mut provider = ScriptedProvider::replying("{}");
        provider.delay = Duration::from_millis(1500);
        let (backend, _) = backend(provider);

        let response = backend.invoke(&AnalysisRequest::new("img")).await.unwrap();
        assert!(response.latency_ms >= 1500);
    }

    #[tokio::test]
    async fn test_missing_json_is_backend_error() {
        let (backend, _) = backend(ScriptedProvider::replying("I can't help with that."));
        let err = backend.invoke(&AnalysisRequest::new("img")).await.unwrap_err();

        assert_eq!(err.backend_id, "gpt-4o");
        assert!(matches!(err.cause, BackendFailure::Parse(ParseError::NoJsonObject)));
    }

    #[tokio::test]
    async fn test_provider_error_is_tagged() {
        let (backend, _) = backend(ScriptedProvider::failing(|| ProviderError::AuthError));
        let err = backend.invoke(&AnalysisRequest::new("img")).await.unwrap_err();
        assert!(matches!(
            err.cause,
            BackendFailure::Provider(ProviderError::AuthError)
        ));
    }

    #[tokio::test]
    async fn test_empty_payload_gets_defaults() {
        let (backend, _) = backend(ScriptedProvider::replying("{}"));
        let response = backend.invoke(&AnalysisRequest::new("img")).await.unwrap();
        assert!(response.findings.is_empty());
        assert_eq!(response.overall_score, 0.0);
    }
}
