//! Omega Web - JSON-RPC tool server
//!
//! Exposes `search`, `resolve` and `chat` as tools behind a single
//! `POST /mcp/messages` endpoint, plus a liveness route at `/`.

pub mod handlers;
pub mod rpc;
pub mod server;

// Re-export main types
pub use server::{AppState, WebError, router, run_server};
