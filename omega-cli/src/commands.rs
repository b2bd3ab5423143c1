//! CLI command implementations

use std::net::IpAddr;

use anyhow::{Context, bail};
use clap::Subcommand;
use omega_assistant::{ChatRequest, ConversationOrchestrator};
use omega_core::config::OmegaConfig;
use omega_core::media::{InfoHash, MediaKind, Resolution, SearchQuery};
use omega_core::resolver::ResolveRequest;
use omega_core::OmegaError;
use omega_providers::ProviderSet;
use tracing::info;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the JSON-RPC tool server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<IpAddr>,
        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List instant cache candidates for a title
    Search {
        title: String,
        /// movie or show
        #[arg(short, long, default_value = "movie")]
        kind: MediaKind,
        #[arg(long)]
        season: Option<u32>,
        #[arg(long, requires = "season")]
        episode: Option<u32>,
    },
    /// Resolve a title or info hash to a playable stream
    Resolve {
        title: Option<String>,
        /// 40 character hex info hash
        #[arg(long)]
        hash: Option<InfoHash>,
        #[arg(short, long, default_value = "movie")]
        kind: MediaKind,
        #[arg(long)]
        season: Option<u32>,
        #[arg(long, requires = "season")]
        episode: Option<u32>,
    },
    /// Ask the recommendation assistant
    Chat {
        message: String,
        /// Trakt access token for watch history
        #[arg(long)]
        user_token: Option<String>,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns the failure of the command that ran, with context
pub async fn handle_command(command: Commands, config: OmegaConfig) -> anyhow::Result<()> {
    match command {
        Commands::Serve { host, port } => serve(config, host, port).await,
        Commands::Search {
            title,
            kind,
            season,
            episode,
        } => search(&config, build_query(title, kind, season, episode)).await,
        Commands::Resolve {
            title,
            hash,
            kind,
            season,
            episode,
        } => {
            let query = title.map(|title| build_query(title, kind, season, episode));
            let request = match (query, hash) {
                (Some(query), Some(hash)) => ResolveRequest::for_query(query).with_hash(hash),
                (Some(query), None) => ResolveRequest::for_query(query),
                (None, Some(hash)) => ResolveRequest::for_hash(hash),
                (None, None) => bail!("resolve needs a title or --hash"),
            };
            resolve(&config, request).await
        }
        Commands::Chat {
            message,
            user_token,
        } => chat(&config, message, user_token).await,
    }
}

fn build_query(
    title: String,
    kind: MediaKind,
    season: Option<u32>,
    episode: Option<u32>,
) -> SearchQuery {
    let kind = if season.is_some() { MediaKind::Show } else { kind };
    let mut query = SearchQuery::new(title, kind);
    match (season, episode) {
        (Some(season), Some(episode)) => query = query.with_episode(season, episode),
        (season, _) => query.season = season,
    }
    query
}

/// Start the tool server
///
/// # Errors
/// - `WebError` - Providers could not be built or the address is in use
pub async fn serve(
    mut config: OmegaConfig,
    host: Option<IpAddr>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    println!("Starting VOID Omega MCP...");
    println!(
        "Tool endpoint: http://{}:{}/mcp/messages",
        config.server.host, config.server.port
    );
    println!("Tier 2 debrid: {}", config.providers.debrid.display_name());
    println!("Press Ctrl+C to stop the server");

    omega_web::run_server(config)
        .await
        .context("tool server stopped with an error")
}

/// Print instant cache candidates
///
/// # Errors
/// - `ProviderError` - The instant cache failed
pub async fn search(config: &OmegaConfig, query: SearchQuery) -> anyhow::Result<()> {
    let providers = ProviderSet::from_config(config)?;
    let resolver = providers.resolver(config);

    let candidates = resolver
        .search(&query)
        .await
        .map_err(|e| anyhow::anyhow!(OmegaError::from(e).user_message()))?;

    println!("Results for '{}' ({})", query.title, query.kind);
    println!("{:-<60}", "");
    if candidates.is_empty() {
        println!("Nothing cached for this title.");
        return Ok(());
    }
    for candidate in &candidates {
        let size = candidate
            .size_bytes
            .map(|bytes| format!("{:.2} GB", bytes as f64 / 1_073_741_824.0))
            .unwrap_or_else(|| "unknown size".to_string());
        println!(
            "{}  rank {:>5}  {:>12}  {}",
            candidate.info_hash,
            candidate.rank,
            size,
            candidate.filename().unwrap_or(&query.title)
        );
    }
    Ok(())
}

/// Resolve a stream and print its URL
///
/// # Errors
/// - `ResolutionFailure` - Every tier missed or was unavailable
pub async fn resolve(config: &OmegaConfig, request: ResolveRequest) -> anyhow::Result<()> {
    let providers = ProviderSet::from_config(config)?;
    let resolver = providers.resolver(config);

    match resolver.resolve(&request, &config.default_keys).await {
        Ok(Resolution::Ready(stream)) => {
            info!("Resolved {} via {}", stream.info_hash, stream.source_tier);
            println!("Source: {}", stream.source_tier);
            println!("Info hash: {}", stream.info_hash);
            if let Some(expiry) = stream.expiry {
                println!("Expires: {expiry}");
            }
            println!("{}", stream.url);
            Ok(())
        }
        Ok(Resolution::Pending(pending)) => {
            println!(
                "{} accepted {} but it is not ready yet: {}",
                pending.provider, pending.info_hash, pending.detail
            );
            println!("Run the same command again in a few minutes.");
            Ok(())
        }
        Err(failure) => {
            for attempt in &failure.attempts {
                println!(
                    "  {} ({}): {}",
                    attempt.provider,
                    attempt.tier,
                    serde_json::to_string(&attempt.outcome)?
                );
            }
            bail!(OmegaError::from(failure).user_message())
        }
    }
}

/// Run one assistant turn and print the grounded answer
///
/// # Errors
/// - `AssistantError` - The model failed or the turn ran out of rounds
pub async fn chat(
    config: &OmegaConfig,
    message: String,
    user_token: Option<String>,
) -> anyhow::Result<()> {
    let providers = ProviderSet::from_config(config)?;
    let orchestrator = ConversationOrchestrator::new(
        providers.model.clone(),
        providers.identifier.clone(),
        providers.history.clone(),
        config.assistant.clone(),
    );

    let mut keys = config.default_keys.clone();
    if user_token.is_some() {
        keys.trakt = user_token;
    }
    let outcome = orchestrator
        .chat(ChatRequest::new(message).with_keys(keys))
        .await
        .map_err(|e| anyhow::anyhow!(OmegaError::from(e).user_message()))?;

    println!("{}", outcome.text);
    if !outcome.grounded.is_empty() {
        println!();
        for reference in &outcome.grounded {
            println!(
                "  {} -> {}",
                reference.display_title,
                orchestrator.registry().links().link(reference)
            );
        }
    }
    if !outcome.stripped.is_empty() {
        println!("({} unverified link(s) removed)", outcome.stripped.len());
    }
    Ok(())
}
