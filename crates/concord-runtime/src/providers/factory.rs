//! Provider factories, resolved by the `provider` field of a backend entry.
//!
//! ```ignore
//! let registry = ProviderRegistry::with_defaults();
//! registry.check_backends(&config.backends)?;
//! let provider = registry.create("gemini", &backend.options)?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::secrets::{self, EndpointSpec};
use super::{LlmProvider, ProviderError};
use crate::config::BackendConfig;

/// Builds one provider type from backend options.
pub trait ProviderFactory: Send + Sync {
    /// Name used in backend entries, e.g. "openai"
    fn provider_type(&self) -> &'static str;

    /// Key and endpoint lookup for this provider type.
    fn endpoint(&self) -> &'static EndpointSpec;

    fn create(&self, options: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError>;

    /// Check options without building a client.
    fn check(&self, options: &JsonValue) -> Result<(), ProviderError> {
        secrets::check_options(options, self.endpoint())
    }

    /// Options written out by `concord config`.
    fn default_options(&self) -> JsonValue {
        serde_json::json!({ "base_url": self.endpoint().default_base_url })
    }
}

/// Factories keyed by provider type.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<&'static str, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every provider compiled into this build.
    #[allow(unused_mut)]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        #[cfg(feature = "openai")]
        registry.register(Arc::new(super::OpenAiProviderFactory));
        #[cfg(feature = "anthropic")]
        registry.register(Arc::new(super::AnthropicProviderFactory));
        #[cfg(feature = "gemini")]
        registry.register(Arc::new(super::GeminiProviderFactory));
        registry
    }

    /// Add a factory; a later one with the same type replaces the earlier.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories.insert(factory.provider_type(), factory);
    }

    pub fn create(
        &self,
        provider_type: &str,
        options: &JsonValue,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        self.factory(provider_type)?.create(options)
    }

    /// Check every backend entry and report all problems at once.
    pub fn check_backends(&self, backends: &[BackendConfig]) -> Result<(), ProviderError> {
        let problems: Vec<String> = backends
            .iter()
            .filter_map(|backend| {
                self.factory(&backend.provider)
                    .and_then(|factory| factory.check(&backend.options))
                    .err()
                    .map(|e| format!("backend '{}': {}", backend.id, e))
            })
            .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::NotConfigured(problems.join("; ")))
        }
    }

    pub fn provider_types(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    pub fn supports(&self, provider_type: &str) -> bool {
        self.factories.contains_key(provider_type)
    }

    pub fn default_options(&self, provider_type: &str) -> Option<JsonValue> {
        self.factories.get(provider_type).map(|f| f.default_options())
    }

    fn factory(&self, provider_type: &str) -> Result<&Arc<dyn ProviderFactory>, ProviderError> {
        self.factories.get(provider_type).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "no '{}' provider in this build (available: {})",
                provider_type,
                self.provider_types().join(", ")
            ))
        })
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
