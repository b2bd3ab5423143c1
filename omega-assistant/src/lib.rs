//! Omega Assistant - Grounded tool-calling conversations
//!
//! The orchestrator lets the chat model call a small fixed tool set under a
//! per-turn budget, then removes any deep link the turn's lookups did not
//! ground.

pub mod grounding;
pub mod orchestrator;
pub mod registry;

use omega_core::{OmegaError, ProviderError};
use thiserror::Error;

pub use grounding::{DeepLinkFormat, GroundingLedger, GroundingValidator, StripReason, StrippedLink};
pub use orchestrator::{ChatOutcome, ChatRequest, ConversationOrchestrator};
pub use registry::{
    GroundingToolRegistry, HistoryQuery, Tool, ToolFailure, ToolOutcome, ToolResult, TurnBudget,
};

/// Ways a turn can end without an answer.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("Chat model failed: {0}")]
    Model(#[from] ProviderError),

    #[error("Chat model returned an empty reply")]
    EmptyReply,

    #[error("Chat model still requested tools after {rounds} rounds")]
    RoundLimit { rounds: usize },

    #[error("Message must not be empty")]
    EmptyMessage,
}

impl From<AssistantError> for OmegaError {
    fn from(error: AssistantError) -> Self {
        match error {
            AssistantError::Model(e @ ProviderError::MissingCredential { .. }) => OmegaError::Provider(e),
            AssistantError::EmptyMessage => OmegaError::InvalidRequest {
                reason: "message must not be empty".to_string(),
            },
            other => OmegaError::AssistantUnavailable {
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use omega_core::ErrorKind;

    use super::*;

    #[test]
    fn test_assistant_errors_map_to_taxonomy() {
        let timeout = OmegaError::from(AssistantError::Model(ProviderError::Timeout {
            provider: "gemini".to_string(),
            after: std::time::Duration::from_secs(60),
        }));
        let missing_key = OmegaError::from(AssistantError::Model(
            ProviderError::missing_credential("gemini", "a Gemini API key"),
        ));
        let blank = OmegaError::from(AssistantError::EmptyMessage);

        assert_eq!(timeout.kind(), Some(ErrorKind::AssistantUnavailable));
        assert!(missing_key.is_user_error());
        assert!(blank.is_user_error());
        assert_eq!(blank.kind(), None);
        assert_eq!(
            OmegaError::from(AssistantError::RoundLimit { rounds: 6 }).kind(),
            Some(ErrorKind::AssistantUnavailable)
        );
    }
}
