//! Router tests for the JSON-RPC tool server.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use omega_assistant::ConversationOrchestrator;
use omega_core::config::OmegaConfig;
use omega_core::conversation::{ModelReply, RequestedToolCall};
use omega_core::media::{CandidateResult, GroundedReference, InfoHash, MediaKind, SourceTier};
use omega_core::providers::mock::{
    ScriptedChatModel, ScriptedDebrid, ScriptedInstantCache, StaticHistoryProvider,
    StaticIdentifierProvider,
};
use omega_core::TierResolver;
use omega_web::{AppState, router};
use serde_json::{Value, json};
use tower::ServiceExt;

const HASH: &str = "0123456789abcdef0123456789abcdef01234567";

struct Setup {
    instant: ScriptedInstantCache,
    debrid: ScriptedDebrid,
    model: ScriptedChatModel,
    config: OmegaConfig,
}

impl Default for Setup {
    fn default() -> Self {
        let mut config = OmegaConfig::for_testing();
        config.default_keys.torbox = Some("server-key".to_string());
        Self {
            instant: ScriptedInstantCache::miss(),
            debrid: ScriptedDebrid::uncached(),
            model: ScriptedChatModel::default(),
            config,
        }
    }
}

fn app(setup: Setup) -> axum::Router {
    let resolver = TierResolver::new(
        Arc::new(setup.instant),
        Arc::new(setup.debrid),
        setup.config.resolver.clone(),
    );
    let orchestrator = ConversationOrchestrator::new(
        Arc::new(setup.model),
        Arc::new(StaticIdentifierProvider::new(vec![GroundedReference {
            display_title: "The Expanse".to_string(),
            canonical_id: 63639,
            media_kind: MediaKind::Show,
            year: Some(2015),
        }])),
        Arc::new(StaticHistoryProvider::default()),
        setup.config.assistant.clone(),
    );
    router(AppState::new(resolver, orchestrator, &setup.config))
}

async fn post_rpc(app: axum::Router, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/mcp/messages")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn call(id: u64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
}

/// Parses the JSON text payload of a tool result.
fn text_payload(response: &Value) -> Value {
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

#[tokio::test]
async fn test_health_route() {
    let response = app(Setup::default())
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["message"], "VOID Omega MCP is running");
}

#[tokio::test]
async fn test_initialize_and_notification() {
    let (status, json) = post_rpc(
        app(Setup::default()),
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"]["protocolVersion"], "0.1.0");
    assert_eq!(json["result"]["serverInfo"]["name"], "VOID Omega MCP");
    assert_eq!(json["result"]["capabilities"]["tools"]["listChanged"], true);

    let (status, json) = post_rpc(
        app(Setup::default()),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(json, Value::Null);
}

#[tokio::test]
async fn test_unknown_method_is_404() {
    let (status, json) = post_rpc(
        app(Setup::default()),
        json!({"jsonrpc": "2.0", "id": "a", "method": "resources/list"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], -32601);
    assert_eq!(json["id"], "a");
}

#[tokio::test]
async fn test_malformed_body_is_parse_error() {
    let request = Request::builder()
        .method("POST")
        .uri("/mcp/messages")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app(Setup::default()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tools_list_names() {
    let (_, json) = post_rpc(
        app(Setup::default()),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
    )
    .await;
    let names: Vec<&str> = json["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|tool| tool["name"].as_str())
        .collect();
    assert_eq!(names, vec!["search", "resolve", "chat"]);
}

#[tokio::test]
async fn test_search_lists_instant_candidates() {
    let hash: InfoHash = HASH.parse().unwrap();
    let setup = Setup {
        instant: ScriptedInstantCache::hit(vec![
            CandidateResult::new(hash, SourceTier::Instant, 250)
                .cached(true)
                .with_size(2_000_000_000)
                .with_metadata("filename", "Dune.2021.2160p.mkv")
                .with_metadata("quality", "4K"),
        ]),
        ..Setup::default()
    };

    let (status, json) = post_rpc(app(setup), call(3, "search", json!({"title": "Dune", "year": 2021}))).await;

    assert_eq!(status, StatusCode::OK);
    let results = text_payload(&json);
    assert_eq!(results[0]["info_hash"], HASH);
    assert_eq!(results[0]["title"], "Dune.2021.2160p.mkv");
    assert_eq!(results[0]["quality"], "4K");
    assert_eq!(results[0]["type"], "movie");
}

#[tokio::test]
async fn test_resolve_through_debrid() {
    let setup = Setup {
        debrid: ScriptedDebrid::cached("https://cdn.example/expanse.mkv"),
        ..Setup::default()
    };

    let (status, json) = post_rpc(
        app(setup),
        call(4, "resolve", json!({"info_hash": HASH, "api_keys": {"torbox": "user-key"}})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let payload = text_payload(&json);
    assert_eq!(payload["success"], true);
    assert_eq!(payload["stream"]["url"], "https://cdn.example/expanse.mkv");
    assert_eq!(payload["stream"]["source_tier"], "debrid");
}

#[tokio::test]
async fn test_resolve_argument_errors() {
    let (_, missing) = post_rpc(app(Setup::default()), call(5, "resolve", json!({}))).await;
    assert_eq!(missing["error"]["code"], -32602);

    let (_, bad_hash) = post_rpc(
        app(Setup::default()),
        call(6, "resolve", json!({"info_hash": "not-a-hash"})),
    )
    .await;
    assert_eq!(bad_hash["error"]["code"], -32602);
}

#[tokio::test]
async fn test_resolve_failures_carry_kind() {
    let unavailable = Setup {
        instant: ScriptedInstantCache::failing(),
        debrid: ScriptedDebrid::failing(),
        ..Setup::default()
    };
    let (_, json) = post_rpc(app(unavailable), call(7, "resolve", json!({"info_hash": HASH}))).await;
    assert_eq!(json["error"]["code"], -32001);
    assert_eq!(json["error"]["data"]["reason"], "AllProvidersUnavailable");

    let mut keyless = Setup {
        instant: ScriptedInstantCache::failing(),
        debrid: ScriptedDebrid::failing(),
        ..Setup::default()
    };
    keyless.config.default_keys.torbox = None;
    let (_, json) = post_rpc(app(keyless), call(8, "resolve", json!({"info_hash": HASH}))).await;
    assert_eq!(json["error"]["code"], -32000);
}

#[tokio::test]
async fn test_chat_returns_validated_text() {
    let setup = Setup {
        model: ScriptedChatModel::replying(vec![
            ModelReply::ToolCalls {
                preamble: String::new(),
                calls: vec![RequestedToolCall::new(
                    "tmdb_search",
                    json!({"title": "The Expanse", "kind": "show"}),
                )],
            },
            ModelReply::Text(
                "[The Expanse](void://show/63639) beats [The Wire](void://show/9999)".to_string(),
            ),
        ]),
        ..Setup::default()
    };

    let (status, json) = post_rpc(
        app(setup),
        call(9, "chat", json!({"message": "Space opera please"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["result"]["content"][0]["text"],
        "[The Expanse](void://show/63639) beats The Wire"
    );
    let structured = &json["result"]["structuredContent"];
    assert_eq!(structured["grounded"][0]["canonical_id"], 63639);
    assert_eq!(structured["stripped"][0]["reason"], "ungrounded");
    assert_eq!(structured["new_turns"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_chat_model_failure_is_assistant_unavailable() {
    let (status, json) = post_rpc(
        app(Setup::default()),
        call(10, "chat", json!({"message": "Hello"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["error"]["code"], -32002);
    assert_eq!(json["error"]["data"]["kind"], "AssistantUnavailable");
}

#[tokio::test]
async fn test_blank_chat_message_is_invalid_params_without_kind() {
    let (status, json) = post_rpc(
        app(Setup::default()),
        call(11, "chat", json!({"message": "   "})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["error"]["code"], -32602);
    assert!(json["error"].get("data").is_none());
}
