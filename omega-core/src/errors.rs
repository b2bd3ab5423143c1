//! Error types shared by every provider adapter.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Failure taxonomy shared by every surface.
///
/// Only `NoSourceFound` (after every fallback), `AssistantUnavailable` and
/// missing credentials end a request. The other kinds are recoverable and
/// reported inside otherwise successful results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    ProviderUnavailable,
    NoSourceFound,
    AssistantUnavailable,
    BudgetExceeded,
    UngroundedReference,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::NoSourceFound => "NoSourceFound",
            ErrorKind::AssistantUnavailable => "AssistantUnavailable",
            ErrorKind::BudgetExceeded => "BudgetExceeded",
            ErrorKind::UngroundedReference => "UngroundedReference",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single outbound provider call.
///
/// Every variant is classified as `ProviderUnavailable` by the resolver and
/// the tool registry; the variants only exist to keep the log lines useful.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProviderError {
    /// Provider could not be reached or answered with a server error.
    #[error("{provider} unavailable: {reason}")]
    Unavailable {
        /// Provider name
        provider: String,
        /// The reason for the failure
        reason: String,
    },

    /// Provider did not answer within the configured bound.
    #[error("{provider} timed out after {after:?}")]
    Timeout {
        /// Provider name
        provider: String,
        /// Elapsed bound
        after: Duration,
    },

    /// Provider answered with something that could not be parsed.
    #[error("{provider} returned an invalid response: {reason}")]
    InvalidResponse {
        /// Provider name
        provider: String,
        /// The reason for the parse failure
        reason: String,
    },

    /// Provider refused the request (bad credentials, quota, bad input).
    #[error("{provider} rejected the request: {reason}")]
    Rejected {
        /// Provider name
        provider: String,
        /// The reason given by the provider
        reason: String,
    },

    /// Credential required by the provider was not supplied for this call.
    #[error("{provider} requires {credential}")]
    MissingCredential {
        /// Provider name
        provider: String,
        /// Credential name
        credential: &'static str,
    },
}

impl ProviderError {
    pub fn unavailable(provider: &str, reason: impl std::fmt::Display) -> Self {
        ProviderError::Unavailable {
            provider: provider.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_response(provider: &str, reason: impl std::fmt::Display) -> Self {
        ProviderError::InvalidResponse {
            provider: provider.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn rejected(provider: &str, reason: impl std::fmt::Display) -> Self {
        ProviderError::Rejected {
            provider: provider.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn missing_credential(provider: &str, credential: &'static str) -> Self {
        ProviderError::MissingCredential {
            provider: provider.to_string(),
            credential,
        }
    }

    /// Name of the provider that failed.
    pub fn provider(&self) -> &str {
        match self {
            ProviderError::Unavailable { provider, .. }
            | ProviderError::Timeout { provider, .. }
            | ProviderError::InvalidResponse { provider, .. }
            | ProviderError::Rejected { provider, .. }
            | ProviderError::MissingCredential { provider, .. } => provider,
        }
    }
}

/// Runs a provider future under a timeout, mapping elapsed time to
/// [`ProviderError::Timeout`].
///
/// # Errors
/// - `ProviderError::Timeout` - The future did not finish within `limit`
/// - Any error produced by the future itself
pub async fn with_timeout<T, F>(provider: &str, limit: Duration, call: F) -> Result<T, ProviderError>
where
    F: std::future::Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            provider: provider.to_string(),
            after: limit,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_reports_elapsed_bound() {
        let result: Result<(), ProviderError> =
            with_timeout("zilean", Duration::from_millis(5), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert_eq!(
            result,
            Err(ProviderError::Timeout {
                provider: "zilean".to_string(),
                after: Duration::from_millis(5),
            })
        );
    }

    #[tokio::test]
    async fn test_with_timeout_passes_through_results() {
        let ok = with_timeout("tmdb", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));

        let err: Result<u8, _> = with_timeout("tmdb", Duration::from_secs(1), async {
            Err(ProviderError::rejected("tmdb", "401"))
        })
        .await;
        assert_eq!(err.unwrap_err().provider(), "tmdb");
    }
}
