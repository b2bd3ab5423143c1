//! HTTP request handlers organized by functionality

pub mod messages;
pub mod tools;

use axum::response::Json;
use serde_json::{Value, json};

pub use messages::mcp_messages;

/// Liveness message served at `/`.
pub async fn health() -> Json<Value> {
    Json(json!({ "message": "VOID Omega MCP is running" }))
}
