//! Tool server assembly.
//!
//! The router is a thin adapter: it decodes JSON-RPC, calls the resolver or
//! the orchestrator and encodes the answer.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use omega_assistant::ConversationOrchestrator;
use omega_core::config::{DebridChoice, OmegaConfig};
use omega_core::credentials::ApiKeys;
use omega_core::{ProviderError, TierResolver};
use omega_providers::ProviderSet;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::handlers::{health, mcp_messages};

/// Errors that stop the server from starting or running.
#[derive(Debug, Error)]
pub enum WebError {
    #[error("Failed to build providers: {0}")]
    Providers(#[from] ProviderError),

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared, read-only state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub resolver: TierResolver,
    pub orchestrator: Arc<ConversationOrchestrator>,
    pub default_keys: Arc<ApiKeys>,
    pub debrid: DebridChoice,
}

impl AppState {
    pub fn new(
        resolver: TierResolver,
        orchestrator: ConversationOrchestrator,
        config: &OmegaConfig,
    ) -> Self {
        Self {
            resolver,
            orchestrator: Arc::new(orchestrator),
            default_keys: Arc::new(config.default_keys.clone()),
            debrid: config.providers.debrid,
        }
    }

    /// Wires the production providers from configuration.
    ///
    /// # Errors
    /// - `WebError::Providers` - The HTTP client could not be built
    pub fn from_config(config: &OmegaConfig) -> Result<Self, WebError> {
        let providers = ProviderSet::from_config(config)?;
        let orchestrator = ConversationOrchestrator::new(
            providers.model.clone(),
            providers.identifier.clone(),
            providers.history.clone(),
            config.assistant.clone(),
        );
        Ok(Self::new(providers.resolver(config), orchestrator, config))
    }
}

/// Routes of the tool server.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/mcp/messages", post(mcp_messages))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the tool server until Ctrl-C.
///
/// # Errors
/// - `WebError::Providers` - Providers could not be built
/// - `WebError::Io` - The address could not be bound
pub async fn run_server(config: OmegaConfig) -> Result<(), WebError> {
    let state = AppState::from_config(&config)?;
    let app = router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("VOID Omega MCP running on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down");
            }
        })
        .await?;
    Ok(())
}
