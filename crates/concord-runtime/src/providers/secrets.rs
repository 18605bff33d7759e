//! Credentials and endpoints for provider backends.
//!
//! Keys are wrapped in [`secrecy::SecretString`] the moment they are read and
//! only exposed when a request header is built.
//!
//! ```ignore
//! const OPENAI: EndpointSpec = EndpointSpec {
//!     label: "OpenAI API key",
//!     env_var: "OPENAI_API_KEY",
//!     default_base_url: "https://api.openai.com/v1",
//! };
//! let credential = ApiCredential::resolve(&backend.options, &OPENAI)?;
//! request.bearer_auth(credential.expose());
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::ProviderError;

/// Backend option holding an inline API key.
pub const API_KEY_OPTION: &str = "api_key";

/// Backend option overriding the API root (proxies, regional endpoints).
pub const BASE_URL_OPTION: &str = "base_url";

/// Where one provider type looks for its key and API root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointSpec {
    /// Human name used in error messages
    pub label: &'static str,
    /// Consulted when `options.api_key` is absent or blank
    pub env_var: &'static str,
    pub default_base_url: &'static str,
}

/// Where a credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// `options.api_key` of the backend entry
    Options,
    Environment,
    /// Passed directly to a provider constructor
    Inline,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CredentialSource::Options => "backend options",
            CredentialSource::Environment => "environment",
            CredentialSource::Inline => "inline",
        })
    }
}

/// An API key that never prints itself.
pub struct ApiCredential {
    secret: SecretString,
    source: CredentialSource,
    label: &'static str,
}

impl ApiCredential {
    pub fn inline(value: impl Into<String>, label: &'static str) -> Self {
        Self {
            secret: SecretString::from(value.into()),
            source: CredentialSource::Inline,
            label,
        }
    }

    /// Load the key from backend options, else from the endpoint's env var.
    ///
    /// Blank values count as missing in both places.
    pub fn resolve(options: &JsonValue, endpoint: &EndpointSpec) -> Result<Self, ProviderError> {
        let (value, source) = match inline_key(options) {
            Some(key) => (key.to_string(), CredentialSource::Options),
            None => match env_key(endpoint.env_var) {
                Some(key) => (key, CredentialSource::Environment),
                None => return Err(missing(endpoint)),
            },
        };

        Ok(Self {
            secret: SecretString::from(value),
            source,
            label: endpoint.label,
        })
    }

    /// Where [`resolve`](Self::resolve) would find a key, without building a credential.
    pub fn locate(options: &JsonValue, endpoint: &EndpointSpec) -> Option<CredentialSource> {
        if inline_key(options).is_some() {
            Some(CredentialSource::Options)
        } else if env_key(endpoint.env_var).is_some() {
            Some(CredentialSource::Environment)
        } else {
            None
        }
    }

    /// Only call this while building a request header.
    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }

    pub fn is_blank(&self) -> bool {
        self.secret.expose_secret().trim().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("label", &self.label)
            .field("source", &self.source)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) [REDACTED]", self.label, self.source)
    }
}

fn inline_key(options: &JsonValue) -> Option<&str> {
    options[API_KEY_OPTION]
        .as_str()
        .filter(|key| !key.trim().is_empty())
}

fn env_key(env_var: &str) -> Option<String> {
    std::env::var(env_var)
        .ok()
        .filter(|key| !key.trim().is_empty())
}

fn missing(endpoint: &EndpointSpec) -> ProviderError {
    ProviderError::NotConfigured(format!(
        "{} missing: set options.{} on the backend or the {} environment variable",
        endpoint.label, API_KEY_OPTION, endpoint.env_var
    ))
}

/// API root from options or the endpoint default, without a trailing slash.
pub(crate) fn base_url(options: &JsonValue, endpoint: &EndpointSpec) -> Result<String, ProviderError> {
    let url = options[BASE_URL_OPTION]
        .as_str()
        .unwrap_or(endpoint.default_base_url)
        .trim()
        .trim_end_matches('/');

    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ProviderError::NotConfigured(format!(
            "{} must start with http:// or https://, got '{}'",
            BASE_URL_OPTION, url
        )));
    }
    Ok(url.to_string())
}

/// Check options without touching the network or keeping the key.
pub(crate) fn check_options(options: &JsonValue, endpoint: &EndpointSpec) -> Result<(), ProviderError> {
    if ApiCredential::locate(options, endpoint).is_none() {
        return Err(missing(endpoint));
    }
    base_url(options, endpoint).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "sk-test-very-secret-0001";

    const SPEC: EndpointSpec = EndpointSpec {
        label: "Test API key",
        env_var: "CONCORD_TEST_UNSET_ENV_VAR",
        default_base_url: "https://api.example.com/v1",
    };

    #[test]
    fn test_debug_and_display_redact() {
        let cred = ApiCredential::inline(SECRET, "Test API key");
        let debug = format!("{:?}", cred);
        let display = format!("{}", cred);

        assert!(!debug.contains(SECRET));
        assert!(!display.contains(SECRET));
        assert!(debug.contains("[REDACTED]"));
        assert_eq!(display, "Test API key (inline) [REDACTED]");
    }

    #[test]
    fn test_options_key_wins() {
        let options = serde_json::json!({ "api_key": "from-options" });
        let cred = ApiCredential::resolve(&options, &SPEC).unwrap();
        assert_eq!(cred.expose(), "from-options");
        assert_eq!(cred.source(), CredentialSource::Options);
        assert_eq!(ApiCredential::locate(&options, &SPEC), Some(CredentialSource::Options));
    }

    #[test]
    fn test_blank_options_key_counts_as_missing() {
        let options = serde_json::json!({ "api_key": "   " });
        match ApiCredential::resolve(&options, &SPEC) {
            Err(ProviderError::NotConfigured(msg)) => {
                assert!(msg.contains("CONCORD_TEST_UNSET_ENV_VAR"));
                assert!(!msg.contains("   "));
            }
            other => panic!("expected NotConfigured, got {other:?}"),
        }
        assert!(check_options(&options, &SPEC).is_err());
    }

    #[test]
    fn test_inline_blank_detected() {
        assert!(ApiCredential::inline("  ", "k").is_blank());
        assert!(!ApiCredential::inline("x", "k").is_blank());
    }

    #[test]
    fn test_base_url_defaults_and_trims() {
        assert_eq!(
            base_url(&serde_json::json!({}), &SPEC).unwrap(),
            "https://api.example.com/v1"
        );
        assert_eq!(
            base_url(&serde_json::json!({ "base_url": "https://proxy.local/v1/" }), &SPEC).unwrap(),
            "https://proxy.local/v1"
        );
        assert!(base_url(&serde_json::json!({ "base_url": "ftp://x" }), &SPEC).is_err());
    }
}
