//! Shared HTTP plumbing for the provider adapters.
//!
//! Maps transport failures and HTTP status codes onto [`ProviderError`] so
//! adapters only deal with decoded bodies.

use omega_core::ProviderError;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Longest response excerpt carried in an error.
const BODY_EXCERPT_LEN: usize = 200;

/// Builds the client shared by all adapters of one process.
///
/// # Errors
/// - `ProviderError::Unavailable` - TLS backend could not be initialized
pub fn build_client(user_agent: &str) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .build()
        .map_err(|e| ProviderError::unavailable("http", e))
}

/// Sends a request and decodes a JSON body.
///
/// # Errors
/// - `ProviderError::Unavailable` - Connection failure or 5xx/429 status
/// - `ProviderError::Rejected` - Any other non-success status
/// - `ProviderError::InvalidResponse` - Body is not the expected JSON
pub async fn send_json<T: DeserializeOwned>(
    provider: &str,
    request: RequestBuilder,
) -> Result<T, ProviderError> {
    let response = send(provider, request).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| ProviderError::invalid_response(provider, e))
}

/// Sends a request and checks its status, leaving the body unread.
///
/// # Errors
/// - `ProviderError::Unavailable` - Connection failure or 5xx/429 status
/// - `ProviderError::Rejected` - Any other non-success status
pub async fn send(provider: &str, request: RequestBuilder) -> Result<Response, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::unavailable(provider, e.without_url()))?;
    let status = response.status();
    debug!("{provider} answered {status} for {}", response.url().path());

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(provider, status, &body))
}

fn status_error(provider: &str, status: StatusCode, body: &str) -> ProviderError {
    let excerpt: String = body.chars().take(BODY_EXCERPT_LEN).collect();
    let reason = if excerpt.trim().is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {}", excerpt.trim())
    };

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        ProviderError::unavailable(provider, reason)
    } else {
        ProviderError::rejected(provider, reason)
    }
}

/// Returns the credential or a `MissingCredential` error.
///
/// # Errors
/// - `ProviderError::MissingCredential` - The key is absent
pub fn require_key<'a>(
    provider: &str,
    credential: &'static str,
    key: Option<&'a String>,
) -> Result<&'a str, ProviderError> {
    key.map(String::as_str)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| ProviderError::missing_credential(provider, credential))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_unavailable() {
        let error = status_error("torbox", StatusCode::BAD_GATEWAY, "");
        assert_eq!(
            error,
            ProviderError::unavailable("torbox", "HTTP 502 Bad Gateway")
        );
        assert!(matches!(
            status_error("torbox", StatusCode::TOO_MANY_REQUESTS, "slow down"),
            ProviderError::Unavailable { .. }
        ));
    }

    #[test]
    fn test_client_errors_are_rejections_with_excerpt() {
        let body = "x".repeat(500);
        let ProviderError::Rejected { reason, .. } =
            status_error("tmdb", StatusCode::UNAUTHORIZED, &body)
        else {
            panic!("expected a rejection");
        };
        assert!(reason.starts_with("HTTP 401 Unauthorized: "));
        assert!(reason.len() < 260);
    }

    #[test]
    fn test_require_key_treats_empty_as_missing() {
        let empty = String::new();
        assert!(require_key("torbox", "torbox API key", Some(&empty)).is_err());
        assert!(require_key("torbox", "torbox API key", None).is_err());
        let key = "abc".to_string();
        assert_eq!(require_key("torbox", "torbox API key", Some(&key)), Ok("abc"));
    }
}
