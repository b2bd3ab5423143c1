//! Discovery workflow: ask the assistant, then resolve what it recommended.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use http_body_util::BodyExt;
use omega_core::config::OmegaConfig;
use omega_web::{AppState, router};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tower::ServiceExt;

const EXPANSE_HASH: &str = "0123456789abcdef0123456789abcdef01234567";
const MODEL: &str = "gemini-test";

#[derive(Default)]
struct Upstream {
    model_calls: AtomicUsize,
    tmdb_queries: Mutex<Vec<String>>,
}

fn gemini_reply(upstream: &Upstream) -> Value {
    match upstream.model_calls.fetch_add(1, Ordering::SeqCst) {
        0 => json!({"candidates": [{"content": {"role": "model", "parts": [
            {"functionCall": {"name": "tmdb_search", "args": {"title": "The Expanse", "kind": "show"}}}
        ]}}]}),
        _ => json!({"candidates": [{"content": {"role": "model", "parts": [
            {"text": "Watch [The Expanse](void://show/63639), or [The Wire](void://show/9999)."}
        ]}}]}),
    }
}

fn upstream_router(upstream: Arc<Upstream>) -> Router {
    Router::new()
        .route(
            "/dmm/filtered",
            get(|| async { Json(json!([])) }),
        )
        .route(
            "/search/tv",
            get(
                |State(upstream): State<Arc<Upstream>>, Query(params): Query<HashMap<String, String>>| async move {
                    upstream
                        .tmdb_queries
                        .lock()
                        .push(params.get("query").cloned().unwrap_or_default());
                    Json(json!({
                        "results": [{"id": 63639, "name": "The Expanse", "first_air_date": "2015-12-14"}]
                    }))
                },
            ),
        )
        .route(
            &format!("/v1beta/models/{MODEL}:generateContent"),
            post(|State(upstream): State<Arc<Upstream>>| async move { Json(gemini_reply(&upstream)) }),
        )
        .route(
            "/api/torrents/checkcached",
            get(|| async { Json(json!({"success": true, "data": [{"hash": EXPANSE_HASH}]})) }),
        )
        .route(
            "/api/torrents/createtorrent",
            post(|| async { Json(json!({"success": true, "data": {"torrent_id": 77}})) }),
        )
        .route(
            "/api/torrents/mylist",
            get(|| async {
                Json(json!({"success": true, "data": {
                    "id": 77, "download_state": "cached", "download_finished": true, "download_present": true,
                    "files": [
                        {"id": 0, "name": "The.Expanse.S01E01.1080p.mkv", "size": 100},
                        {"id": 1, "name": "The.Expanse.S01E02.1080p.mkv", "size": 90}
                    ]
                }}))
            }),
        )
        .route(
            "/api/torrents/requestdl",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let file_id = params.get("file_id").cloned().unwrap_or_default();
                Json(json!({"success": true, "data": format!("https://cdn.torbox.test/77/{file_id}")}))
            }),
        )
        .with_state(upstream)
}

async fn spawn_upstream(upstream: Arc<Upstream>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, upstream_router(upstream)).await.unwrap();
    });
    format!("http://{addr}")
}

fn config_for(base: &str) -> OmegaConfig {
    let mut config = OmegaConfig::for_testing();
    let providers = &mut config.providers;
    providers.zilean_url = base.to_string();
    providers.torbox_url = base.to_string();
    providers.tmdb_url = base.to_string();
    providers.gemini_url = base.to_string();
    providers.gemini_model = MODEL.to_string();
    config.default_keys.tmdb = Some("tmdb-key".to_string());
    config.default_keys.gemini = Some("gemini-key".to_string());
    config
}

async fn call_tool(app: Router, id: u64, name: &str, arguments: Value) -> Value {
    let body = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    });
    let request = Request::builder()
        .method("POST")
        .uri("/mcp/messages")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_recommend_then_resolve_the_expanse() {
    let upstream = Arc::new(Upstream::default());
    let base = spawn_upstream(upstream.clone()).await;
    let app = router(AppState::from_config(&config_for(&base)).unwrap());

    let chat = call_tool(
        app.clone(),
        1,
        "chat",
        json!({"message": "Hard science fiction series?"}),
    )
    .await;
    assert_eq!(
        chat["result"]["content"][0]["text"],
        "Watch [The Expanse](void://show/63639), or The Wire."
    );
    assert_eq!(upstream.model_calls.load(Ordering::SeqCst), 2);
    assert_eq!(*upstream.tmdb_queries.lock(), vec!["The Expanse".to_string()]);

    let resolved = call_tool(
        app,
        2,
        "resolve",
        json!({
            "info_hash": EXPANSE_HASH,
            "title": "The Expanse",
            "season": 1,
            "episode": 1,
            "api_keys": {"torbox": "torbox-key"}
        }),
    )
    .await;
    let payload: Value =
        serde_json::from_str(resolved["result"]["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(payload["stream"]["source_tier"], "debrid");
    assert_eq!(payload["stream"]["url"], "https://cdn.torbox.test/77/0");
    assert_eq!(payload["stream"]["info_hash"], EXPANSE_HASH);
}

#[tokio::test]
async fn test_unreachable_upstreams_fail_with_kind() {
    let app = router(AppState::from_config(&config_for("http://127.0.0.1:9")).unwrap());

    let resolved = call_tool(
        app,
        3,
        "resolve",
        json!({"title": "The Expanse", "type": "show", "api_keys": {"torbox": "torbox-key"}}),
    )
    .await;

    assert_eq!(resolved["error"]["code"], -32001);
    assert_eq!(resolved["error"]["data"]["reason"], "AllProvidersUnavailable");
    assert!(
        !resolved["error"]["message"]
            .as_str()
            .unwrap()
            .contains("127.0.0.1")
    );
}
