//! Shared HTTP plumbing for the reqwest-backed providers.

use std::time::Duration;

use super::ProviderError;

/// Map a send failure, keeping timeouts distinguishable.
pub(crate) fn send_error(err: reqwest::Error, timeout: Option<Duration>) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(timeout.unwrap_or_default())
    } else {
        // Strip the URL: some APIs carry credentials in it
        ProviderError::HttpError(err.without_url().to_string())
    }
}

/// Turn a non-success response into a [`ProviderError`].
///
/// `extract` pulls the provider's error message out of a JSON body; when the
/// body is not the expected JSON the status reason is used instead.
pub(crate) async fn error_for_status(
    response: reqwest::Response,
    extract: fn(&serde_json::Value) -> Option<String>,
) -> ProviderError {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        return ProviderError::RateLimited { retry_after };
    }

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return ProviderError::AuthError;
    }

    let message = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .as_ref()
        .and_then(extract)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

    ProviderError::ApiError {
        status: status.as_u16(),
        message,
    }
}

/// `{"error": {"message": "..."}}`, the shape all three APIs share.
pub(crate) fn nested_error_message(body: &serde_json::Value) -> Option<String> {
    body["error"]["message"].as_str().map(str::to_string)
}

/// Apply an optional per-request timeout.
pub(crate) fn with_timeout(
    request: reqwest::RequestBuilder,
    timeout: Option<Duration>,
) -> reqwest::RequestBuilder {
    match timeout {
        Some(timeout) => request.timeout(timeout),
        None => request,
    }
}
