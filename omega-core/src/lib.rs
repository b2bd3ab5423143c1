//! Omega Core - Domain types and tiered stream resolution
//!
//! This crate holds what every VOID Omega component shares: media and
//! conversation types, provider capability traits, the two-tier resolver,
//! release-name scoring, configuration and tracing setup.

pub mod config;
pub mod conversation;
pub mod credentials;
pub mod errors;
pub mod media;
pub mod providers;
pub mod release;
pub mod resolver;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::OmegaConfig;
pub use conversation::{ConversationTurn, ModelReply, RequestedToolCall, Role, ToolCall, ToolSpec};
pub use credentials::ApiKeys;
pub use errors::{ErrorKind, ProviderError};
pub use media::{
    CandidateResult, GroundedReference, InfoHash, MediaKind, Resolution, ResolvedStream,
    SearchQuery, SourceTier,
};
pub use resolver::{FailureReason, ResolutionFailure, ResolveRequest, TierResolver};

/// Errors that can reach a caller of any VOID Omega surface.
#[derive(Debug, thiserror::Error)]
pub enum OmegaError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Resolution(#[from] ResolutionFailure),

    #[error("Assistant unavailable: {reason}")]
    AssistantUnavailable { reason: String },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

impl OmegaError {
    /// Taxonomy kind reported to callers.
    ///
    /// Bad caller input and server misconfiguration fall outside the
    /// taxonomy and have no kind.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            OmegaError::Provider(_) => Some(ErrorKind::ProviderUnavailable),
            OmegaError::Resolution(failure) => Some(match failure.reason {
                FailureReason::NoSourceFound => ErrorKind::NoSourceFound,
                FailureReason::AllProvidersUnavailable => ErrorKind::ProviderUnavailable,
            }),
            OmegaError::AssistantUnavailable { .. } => Some(ErrorKind::AssistantUnavailable),
            OmegaError::InvalidRequest { .. } | OmegaError::Configuration { .. } => None,
        }
    }

    /// Returns a user-friendly error message suitable for display.
    ///
    /// Transport details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            OmegaError::Provider(ProviderError::MissingCredential {
                provider,
                credential,
            }) => format!("{provider} needs {credential} to be supplied"),
            OmegaError::Provider(e) => format!("{} is currently unavailable", e.provider()),
            OmegaError::Resolution(failure) => match failure.reason {
                FailureReason::NoSourceFound => "No playable source was found".to_string(),
                FailureReason::AllProvidersUnavailable => {
                    "All stream providers are currently unavailable".to_string()
                }
            },
            OmegaError::AssistantUnavailable { .. } => {
                "The assistant is unavailable right now, please try again".to_string()
            }
            OmegaError::InvalidRequest { reason } => format!("Invalid request: {reason}"),
            OmegaError::Configuration { .. } => "Server configuration error".to_string(),
        }
    }

    /// Checks if this error is due to caller input.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            OmegaError::InvalidRequest { .. }
                | OmegaError::Provider(ProviderError::MissingCredential { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, OmegaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_hides_transport_details() {
        let error = OmegaError::from(ProviderError::unavailable(
            "torbox",
            "error sending request for url (https://api.torbox.app/v1/secret)",
        ));
        assert_eq!(error.kind(), Some(ErrorKind::ProviderUnavailable));
        assert_eq!(error.user_message(), "torbox is currently unavailable");
    }

    #[test]
    fn test_resolution_failure_kind_follows_reason() {
        let error = OmegaError::from(ResolutionFailure {
            reason: FailureReason::NoSourceFound,
            attempts: Vec::new(),
        });
        assert_eq!(error.kind(), Some(ErrorKind::NoSourceFound));
        assert!(!error.is_user_error());
    }

    #[test]
    fn test_caller_and_configuration_errors_have_no_kind() {
        let invalid = OmegaError::InvalidRequest {
            reason: "message must not be empty".to_string(),
        };
        let config = OmegaError::Configuration {
            reason: "unreadable config file".to_string(),
        };
        assert_eq!(invalid.kind(), None);
        assert!(invalid.is_user_error());
        assert_eq!(config.kind(), None);
        assert!(!config.is_user_error());
    }
}
