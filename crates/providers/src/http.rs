//! HTTP helpers shared by the adapters.

use std::time::Duration;

use looper_core::ProviderError;
use serde::Deserialize;
use tracing::warn;

pub(crate) fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// Send a request and turn non-success statuses into provider errors.
pub(crate) async fn send(
    request: reqwest::RequestBuilder,
    provider: &str,
) -> Result<reqwest::Response, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::Network(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!(provider, status = status.as_u16(), body = %body, "Provider returned error");
    Err(error_from_body(status.as_u16(), &body))
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    message: String,
}

/// Map an error response body to a [`ProviderError`].
///
/// Both backends wrap failures as `{"error": {"type": ..., "message": ...}}`.
pub(crate) fn error_from_body(status: u16, body: &str) -> ProviderError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok();
    match (status, parsed) {
        (401 | 403, Some(env)) => ProviderError::AuthenticationFailed(env.error.message),
        (401 | 403, None) => ProviderError::AuthenticationFailed(body.to_string()),
        (400, Some(env)) => ProviderError::InvalidRequest(env.error.message),
        (_, Some(env)) if env.error.kind.as_deref() == Some("invalid_request_error") => {
            ProviderError::InvalidRequest(env.error.message)
        }
        (_, Some(env)) => ProviderError::Api {
            kind: env.error.kind.unwrap_or_else(|| "api_error".into()),
            message: env.error.message,
        },
        (_, None) => ProviderError::Http {
            status,
            body: body.to_string(),
        },
    }
}

/// Error carried inside an otherwise successful payload, if any.
pub(crate) fn embedded_error(value: &serde_json::Value) -> Option<ProviderError> {
    let err = value.get("error")?;
    if err.is_null() {
        return None;
    }
    Some(ProviderError::Api {
        kind: err["type"].as_str().unwrap_or("api_error").to_string(),
        message: err["message"].as_str().unwrap_or_default().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_error_maps_to_api() {
        let err = error_from_body(
            529,
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        );
        assert!(matches!(
            err,
            ProviderError::Api { ref kind, ref message } if kind == "overloaded_error" && message == "Overloaded"
        ));
    }

    #[test]
    fn auth_failures() {
        let err = error_from_body(401, r#"{"error":{"type":"invalid_api_key","message":"bad key"}}"#);
        assert!(matches!(err, ProviderError::AuthenticationFailed(ref m) if m == "bad key"));
    }

    #[test]
    fn rejected_requests_are_invalid_request() {
        let err = error_from_body(
            400,
            r#"{"type":"error","error":{"type":"invalid_request_error","message":"max_tokens: too large"}}"#,
        );
        assert!(matches!(err, ProviderError::InvalidRequest(ref m) if m == "max_tokens: too large"));

        let err = error_from_body(404, r#"{"error":{"type":"invalid_request_error","message":"no such model"}}"#);
        assert!(matches!(err, ProviderError::InvalidRequest(ref m) if m == "no such model"));

        let err = error_from_body(400, "not json");
        assert!(matches!(err, ProviderError::Http { status: 400, .. }));
    }

    #[test]
    fn unstructured_body_keeps_status() {
        let err = error_from_body(502, "Bad Gateway");
        assert!(matches!(err, ProviderError::Http { status: 502, ref body } if body == "Bad Gateway"));
    }

    #[test]
    fn embedded_error_detection() {
        let value = serde_json::json!({"error": {"type": "server_error", "message": "boom"}});
        assert!(embedded_error(&value).is_some());
        assert!(embedded_error(&serde_json::json!({"error": null})).is_none());
        assert!(embedded_error(&serde_json::json!({"choices": []})).is_none());
    }
}
