//! `tools/list` catalog and `tools/call` implementations.
//!
//! Arguments are validated here; everything else is delegated to the
//! resolver and the orchestrator.

use omega_assistant::ChatRequest;
use omega_core::conversation::ConversationTurn;
use omega_core::credentials::ApiKeys;
use omega_core::media::{CandidateResult, InfoHash, MediaKind, Resolution, SearchQuery};
use omega_core::resolver::ResolveRequest;
use omega_core::{OmegaError, ProviderError};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::rpc::{RpcError, text_content};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Title fields shared by `search` and `resolve`.
#[derive(Debug, Default, Deserialize)]
struct TitleArgs {
    #[serde(default, alias = "query")]
    title: Option<String>,
    #[serde(default, alias = "type")]
    kind: Option<MediaKind>,
    #[serde(default)]
    imdb_id: Option<String>,
    #[serde(default)]
    year: Option<u16>,
    #[serde(default)]
    season: Option<u32>,
    #[serde(default)]
    episode: Option<u32>,
}

impl TitleArgs {
    /// Builds a query when a title was given. Episodes imply a show.
    fn query(&self) -> Option<SearchQuery> {
        let title = self.title.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
        let kind = self.kind.unwrap_or(if self.season.is_some() {
            MediaKind::Show
        } else {
            MediaKind::Movie
        });

        let mut query = SearchQuery::new(title, kind);
        if let (Some(season), Some(episode)) = (self.season, self.episode) {
            query = query.with_episode(season, episode);
        } else {
            query.season = self.season;
        }
        if let Some(year) = self.year {
            query = query.with_year(year);
        }
        if let Some(imdb_id) = self.imdb_id.as_deref().filter(|id| !id.trim().is_empty()) {
            query = query.with_imdb_id(imdb_id.trim());
        }
        Some(query)
    }
}

#[derive(Debug, Deserialize)]
struct ResolveArgs {
    #[serde(default, alias = "source_id")]
    info_hash: Option<String>,
    #[serde(flatten)]
    title: TitleArgs,
    #[serde(default)]
    api_keys: ApiKeys,
}

#[derive(Debug, Deserialize)]
struct ChatArgs {
    message: String,
    #[serde(default)]
    history: Vec<ConversationTurn>,
    #[serde(default)]
    user_token: Option<String>,
    #[serde(default)]
    api_keys: ApiKeys,
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, RpcError> {
    let arguments = if arguments.is_null() {
        json!({})
    } else {
        arguments
    };
    serde_json::from_value(arguments)
        .map_err(|e| RpcError::invalid_params(format!("Invalid arguments for {tool}: {e}")))
}

/// Tools announced by `tools/list`.
pub fn catalog() -> Value {
    let title_properties = json!({
        "title": {"type": "string"},
        "type": {"type": "string", "enum": ["movie", "show"]},
        "imdb_id": {"type": "string"},
        "year": {"type": "integer"},
        "season": {"type": "integer"},
        "episode": {"type": "integer"}
    });
    let mut resolve_properties = title_properties.clone();
    if let Some(properties) = resolve_properties.as_object_mut() {
        properties.insert("info_hash".to_string(), json!({"type": "string"}));
        properties.insert(
            "api_keys".to_string(),
            json!({
                "type": "object",
                "properties": {
                    "torbox": {"type": "string"},
                    "realdebrid": {"type": "string"}
                }
            }),
        );
    }

    json!([
        {
            "name": "search",
            "description": "Search the instant cache (Zilean) for streams",
            "inputSchema": {
                "type": "object",
                "properties": title_properties,
                "required": ["title"]
            }
        },
        {
            "name": "resolve",
            "description": "Resolve a title or info hash to a playable stream",
            "inputSchema": {
                "type": "object",
                "properties": resolve_properties
            }
        },
        {
            "name": "chat",
            "description": "Ask the recommendation assistant",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "message": {"type": "string"},
                    "history": {"type": "array", "items": {"type": "object"}},
                    "user_token": {"type": "string"},
                    "api_keys": {
                        "type": "object",
                        "properties": {
                            "tmdb": {"type": "string"},
                            "gemini": {"type": "string"}
                        }
                    }
                },
                "required": ["message"]
            }
        }
    ])
}

/// Runs one `tools/call` request.
///
/// # Errors
/// - `RpcError` with `INVALID_PARAMS` - Unknown tool or bad arguments
/// - `RpcError` mapped from `OmegaError` - The tool itself failed
pub async fn call(state: &AppState, params: Option<Value>) -> Result<Value, RpcError> {
    let params: CallParams = parse_args("tools/call", params.unwrap_or(Value::Null))?;
    info!("Tool call: {}", params.name);

    match params.name.as_str() {
        "search" => search(state, parse_args("search", params.arguments)?).await,
        "resolve" => resolve(state, parse_args("resolve", params.arguments)?).await,
        "chat" => chat(state, parse_args("chat", params.arguments)?).await,
        other => Err(RpcError::invalid_params(format!("Unknown tool: {other}"))),
    }
}

fn candidate_summary(candidate: &CandidateResult, query: &SearchQuery) -> Value {
    json!({
        "id": candidate.info_hash,
        "info_hash": candidate.info_hash,
        "provider": candidate.metadata.get("provider").cloned().unwrap_or_else(|| json!("omega")),
        "title": candidate.filename().unwrap_or(&query.title),
        "size": candidate.size_bytes,
        "quality": candidate.metadata.get("quality").cloned().unwrap_or(Value::Null),
        "rank": candidate.rank,
        "cached": candidate.cached,
        "type": query.kind,
    })
}

async fn search(state: &AppState, args: TitleArgs) -> Result<Value, RpcError> {
    let query = args
        .query()
        .ok_or_else(|| RpcError::invalid_params("search needs a title"))?;

    let candidates = state.resolver.search(&query).await.map_err(|e| {
        warn!("Search for '{}' failed: {e}", query.title);
        RpcError::from(&OmegaError::from(e))
    })?;
    let summaries: Vec<Value> = candidates
        .iter()
        .map(|candidate| candidate_summary(candidate, &query))
        .collect();
    Ok(text_content(Value::Array(summaries).to_string()))
}

async fn resolve(state: &AppState, args: ResolveArgs) -> Result<Value, RpcError> {
    let info_hash = args
        .info_hash
        .as_deref()
        .map(str::trim)
        .filter(|hash| !hash.is_empty())
        .map(|hash| {
            hash.parse::<InfoHash>()
                .map_err(|e| RpcError::invalid_params(format!("Invalid info_hash: {e}")))
        })
        .transpose()?;

    let request = match (args.title.query(), info_hash) {
        (Some(query), Some(hash)) => ResolveRequest::for_query(query).with_hash(hash),
        (Some(query), None) => ResolveRequest::for_query(query),
        (None, Some(hash)) => ResolveRequest::for_hash(hash),
        (None, None) => return Err(RpcError::invalid_params("Missing info_hash or title")),
    };
    let keys = args.api_keys.merged_with(&state.default_keys);

    match state.resolver.resolve(&request, &keys).await {
        Ok(Resolution::Ready(stream)) => Ok(text_content(
            json!({"success": true, "stream": stream}).to_string(),
        )),
        Ok(Resolution::Pending(pending)) => Ok(text_content(
            json!({"success": true, "pending": pending}).to_string(),
        )),
        Err(failure) => {
            if state.debrid.api_key(&keys).is_none() {
                let missing = ProviderError::missing_credential(
                    state.debrid.display_name(),
                    "an API key",
                );
                return Err(RpcError::from(&OmegaError::from(missing)));
            }
            Err(RpcError::from(&OmegaError::from(failure)))
        }
    }
}

async fn chat(state: &AppState, args: ChatArgs) -> Result<Value, RpcError> {
    let mut keys = args.api_keys.merged_with(&state.default_keys);
    if let Some(token) = args.user_token.filter(|t| !t.trim().is_empty()) {
        keys.trakt = Some(token);
    }
    let request = ChatRequest::new(args.message)
        .with_history(args.history)
        .with_keys(keys);

    let outcome = state
        .orchestrator
        .chat(request)
        .await
        .map_err(|e| RpcError::from(&OmegaError::from(e)))?;

    let mut result = text_content(outcome.text.clone());
    if let Some(object) = result.as_object_mut() {
        let structured = serde_json::to_value(&outcome)
            .map_err(|e| RpcError::internal(format!("Could not encode chat outcome: {e}")))?;
        object.insert("structuredContent".to_string(), structured);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_args_infer_show_from_season() {
        let args: TitleArgs = serde_json::from_value(json!({
            "query": " The Expanse ", "season": 1, "episode": 2
        }))
        .unwrap();
        let query = args.query().unwrap();
        assert_eq!(query.kind, MediaKind::Show);
        assert_eq!(query.episode_tag().as_deref(), Some("S01E02"));
        assert_eq!(query.title, "The Expanse");
    }

    #[test]
    fn test_blank_title_is_no_query() {
        let args: TitleArgs = serde_json::from_value(json!({"title": "  "})).unwrap();
        assert!(args.query().is_none());
    }

    #[test]
    fn test_catalog_lists_three_tools() {
        let catalog = catalog();
        let names: Vec<&str> = catalog
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|tool| tool["name"].as_str())
            .collect();
        assert_eq!(names, vec!["search", "resolve", "chat"]);
        assert!(catalog[1]["inputSchema"]["properties"]["api_keys"].is_object());
    }
}
