//! Grounding across turns: links are only kept when this turn verified them.

use std::sync::Arc;

use omega_assistant::{ChatRequest, ConversationOrchestrator, StripReason};
use omega_core::config::OmegaConfig;
use omega_core::conversation::{ModelReply, RequestedToolCall};
use omega_core::credentials::ApiKeys;
use omega_core::media::{GroundedReference, MediaKind, WatchedItem};
use omega_core::providers::mock::{
    ScriptedChatModel, StaticHistoryProvider, StaticIdentifierProvider,
};
use serde_json::json;

const EXPANSE_LINK: &str = "[The Expanse](void://show/63639)";

fn orchestrator(model: ScriptedChatModel) -> ConversationOrchestrator {
    let identifier = StaticIdentifierProvider::new(vec![GroundedReference {
        display_title: "The Expanse".to_string(),
        canonical_id: 63639,
        media_kind: MediaKind::Show,
        year: Some(2015),
    }]);
    let history = StaticHistoryProvider::new(vec![WatchedItem {
        title: "The Expanse".to_string(),
        kind: MediaKind::Show,
        year: Some(2015),
        tmdb_id: Some(63639),
        episode: None,
        watched_at: None,
    }]);
    ConversationOrchestrator::new(
        Arc::new(model),
        Arc::new(identifier),
        Arc::new(history),
        OmegaConfig::for_testing().assistant,
    )
}

fn one_call(name: &str, arguments: serde_json::Value) -> ModelReply {
    ModelReply::ToolCalls {
        preamble: String::new(),
        calls: vec![RequestedToolCall::new(name, arguments)],
    }
}

#[tokio::test]
async fn test_grounding_does_not_carry_over_between_turns() {
    let orchestrator = orchestrator(ScriptedChatModel::replying(vec![
        one_call("tmdb_search", json!({"title": "The Expanse", "kind": "show"})),
        ModelReply::Text(format!("Try {EXPANSE_LINK}.")),
        ModelReply::Text(format!("As I said, {EXPANSE_LINK}.")),
    ]));

    let first = orchestrator
        .chat(ChatRequest::new("Something like Battlestar?"))
        .await
        .unwrap();
    assert_eq!(first.text, format!("Try {EXPANSE_LINK}."));

    let second = orchestrator
        .chat(ChatRequest::new("Say that again").with_history(first.new_turns))
        .await
        .unwrap();
    assert_eq!(second.text, "As I said, The Expanse.");
    assert_eq!(second.stripped.len(), 1);
    assert_eq!(second.stripped[0].reason, StripReason::Ungrounded);
}

#[tokio::test]
async fn test_watch_history_alone_does_not_ground() {
    let keys = ApiKeys {
        trakt: Some("trakt-token".to_string()),
        ..ApiKeys::default()
    };
    let orchestrator = orchestrator(ScriptedChatModel::replying(vec![
        one_call("watch_history", json!({"limit": 5})),
        ModelReply::Text(format!("You finished {EXPANSE_LINK}.")),
    ]));

    let outcome = orchestrator
        .chat(ChatRequest::new("What did I watch?").with_keys(keys))
        .await
        .unwrap();

    assert_eq!(outcome.text, "You finished The Expanse.");
    assert!(outcome.grounded.is_empty());
    assert_eq!(outcome.tool_calls.len(), 1);
}
