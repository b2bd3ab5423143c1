//! Tools the chat model may call and the budget that bounds them.
//!
//! The registry validates arguments before anything leaves the process and
//! turns every failure into a tool result the model can read, so a bad call
//! never ends the conversation.

use std::sync::Arc;
use std::time::Duration;

use omega_core::conversation::{ToolCall, ToolSpec};
use omega_core::credentials::ApiKeys;
use omega_core::errors::with_timeout;
use omega_core::media::{
    GroundedReference, HistoryFilter, MediaKind, UpcomingEpisode, WatchStats, WatchedItem,
};
use omega_core::providers::{HistoryProvider, IdentifierProvider};
use omega_core::ProviderError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::grounding::DeepLinkFormat;

/// Tool calls allowed per assistant turn unless configured otherwise.
pub const DEFAULT_TOOL_BUDGET: usize = 4;

/// History entries returned when the model does not ask for a limit.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Upper bound on history entries returned to the model.
pub const MAX_HISTORY_LIMIT: usize = 100;

/// Calendar window when the model does not ask for one.
pub const DEFAULT_CALENDAR_DAYS: u32 = 7;

/// Longest calendar window, in days.
pub const MAX_CALENDAR_DAYS: u32 = 31;

// ============================================================================
// Tool Definitions
// ============================================================================

/// Tools offered to the chat model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// Authoritative title lookup, the only source of deep-link identifiers
    TmdbSearch,
    /// The user's watch history, offered only when a user token is present
    WatchHistory,
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Tool::TmdbSearch => "tmdb_search",
            Tool::WatchHistory => "watch_history",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Tool::TmdbSearch => {
                "Look up a movie or show by title and get its canonical id. \
                 Required before linking to any title."
            }
            Tool::WatchHistory => {
                "Get what the user watched recently, most recent first. \
                 Pass a title to check whether the user has watched it. \
                 Set view to continue_watching for shows in progress, calendar for \
                 upcoming episodes or stats for lifetime totals."
            }
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "tmdb_search" => Some(Tool::TmdbSearch),
            "watch_history" => Some(Tool::WatchHistory),
            _ => None,
        }
    }

    /// JSON Schema of the arguments object.
    pub fn input_schema(&self) -> Value {
        match self {
            Tool::TmdbSearch => json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string", "description": "Title to look up"},
                    "kind": {"type": "string", "enum": ["movie", "show"]},
                    "year": {"type": "integer", "description": "Release or first air year"}
                },
                "required": ["title", "kind"]
            }),
            Tool::WatchHistory => json!({
                "type": "object",
                "properties": {
                    "view": {
                        "type": "string",
                        "enum": ["history", "continue_watching", "calendar", "stats"]
                    },
                    "days": {
                        "type": "integer",
                        "description": format!("Calendar window, at most {MAX_CALENDAR_DAYS} days")
                    },
                    "limit": {
                        "type": "integer",
                        "description": format!("Entries to return, at most {MAX_HISTORY_LIMIT}")
                    },
                    "kind": {"type": "string", "enum": ["movie", "show"]},
                    "title": {"type": "string", "description": "Only entries matching this title"}
                }
            }),
        }
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchArgs {
    title: String,
    kind: MediaKind,
    #[serde(default)]
    year: Option<u16>,
}

/// Which slice of the user's account `watch_history` reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum HistoryView {
    #[default]
    History,
    ContinueWatching,
    Calendar,
    Stats,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct HistoryArgs {
    #[serde(default)]
    view: HistoryView,
    #[serde(default)]
    days: Option<u32>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    kind: Option<MediaKind>,
    #[serde(default)]
    title: Option<String>,
}

impl HistoryArgs {
    fn into_query(self) -> HistoryQuery {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        match self.view {
            HistoryView::History => HistoryQuery::Watched(HistoryFilter {
                limit,
                kind: self.kind,
                title: self
                    .title
                    .map(|title| title.trim().to_string())
                    .filter(|title| !title.is_empty()),
            }),
            HistoryView::ContinueWatching => HistoryQuery::ContinueWatching { limit },
            HistoryView::Calendar => HistoryQuery::Calendar {
                days: self
                    .days
                    .unwrap_or(DEFAULT_CALENDAR_DAYS)
                    .clamp(1, MAX_CALENDAR_DAYS),
            },
            HistoryView::Stats => HistoryQuery::Stats,
        }
    }
}

/// Validated `watch_history` request.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryQuery {
    Watched(HistoryFilter),
    ContinueWatching { limit: usize },
    Calendar { days: u32 },
    Stats,
}

// ============================================================================
// Budget Governance
// ============================================================================

/// Tool calls left in the current assistant turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnBudget {
    limit: usize,
    used: usize,
}

impl TurnBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit, used: 0 }
    }

    /// Takes one slot, or reports that none is left.
    pub fn try_consume(&mut self) -> bool {
        if self.is_exhausted() {
            return false;
        }
        self.used += 1;
        true
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.limit
    }

    pub fn remaining(&self) -> usize {
        self.limit - self.used
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for TurnBudget {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_BUDGET)
    }
}

// ============================================================================
// Tool Results
// ============================================================================

/// Why a tool call produced no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ToolFailure {
    /// The turn's call budget was already spent
    BudgetExceeded,
    /// The backing provider failed or timed out
    ProviderUnavailable,
    /// Arguments did not match the declared schema
    InvalidArguments,
    /// No tool by that name is offered
    UnknownTool,
}

/// What the model receives back for one call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Found {
        reference: GroundedReference,
        deep_link: String,
    },
    NotFound {
        title: String,
        kind: MediaKind,
    },
    History {
        items: Vec<WatchedItem>,
    },
    Upcoming {
        episodes: Vec<UpcomingEpisode>,
    },
    Stats {
        stats: WatchStats,
    },
    Failed {
        kind: ToolFailure,
        message: String,
    },
}

impl ToolOutcome {
    fn failed(kind: ToolFailure, message: impl Into<String>) -> Self {
        ToolOutcome::Failed {
            kind,
            message: message.into(),
        }
    }

    /// Reference produced by a successful identifier lookup.
    ///
    /// Only `tmdb_search` grounds; history views never do, even when their
    /// items carry identifiers.
    pub fn grounded_reference(&self) -> Option<&GroundedReference> {
        match self {
            ToolOutcome::Found { reference, .. } => Some(reference),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<ToolFailure> {
        match self {
            ToolOutcome::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// JSON payload handed back to the model.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            json!({"status": "failed", "kind": "ProviderUnavailable", "message": e.to_string()})
        })
    }
}

/// A call together with its outcome, as recorded in the turn trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub call: ToolCall,
    pub outcome: ToolOutcome,
}

/// A call that passed budget and schema checks, ready to run.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Run(Invocation),
    /// Answered without contacting any provider
    Refused(ToolOutcome),
}

/// Validated arguments of an admitted call.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    Search {
        title: String,
        kind: MediaKind,
        year: Option<u16>,
    },
    History {
        user_token: String,
        query: HistoryQuery,
    },
}

fn provider_failure(error: &ProviderError) -> ToolOutcome {
    let message = match error {
        ProviderError::MissingCredential { .. } => error.to_string(),
        _ => format!("{} is unavailable right now", error.provider()),
    };
    ToolOutcome::failed(ToolFailure::ProviderUnavailable, message)
}

// ============================================================================
// Registry
// ============================================================================

/// Fixed tool set backed by the identifier and history providers.
#[derive(Debug, Clone)]
pub struct GroundingToolRegistry {
    identifier: Arc<dyn IdentifierProvider>,
    history: Arc<dyn HistoryProvider>,
    links: DeepLinkFormat,
    tool_timeout: Duration,
}

impl GroundingToolRegistry {
    pub fn new(
        identifier: Arc<dyn IdentifierProvider>,
        history: Arc<dyn HistoryProvider>,
        links: DeepLinkFormat,
        tool_timeout: Duration,
    ) -> Self {
        Self {
            identifier,
            history,
            links,
            tool_timeout,
        }
    }

    pub fn links(&self) -> &DeepLinkFormat {
        &self.links
    }

    /// Tools offered for a call made with `keys`.
    pub fn available_tools(&self, keys: &ApiKeys) -> Vec<Tool> {
        let mut tools = vec![Tool::TmdbSearch];
        if keys.trakt.is_some() {
            tools.push(Tool::WatchHistory);
        }
        tools
    }

    pub fn declarations(&self, keys: &ApiKeys) -> Vec<ToolSpec> {
        self.available_tools(keys).iter().map(Tool::spec).collect()
    }

    /// Charges the budget for `call` and validates its arguments.
    ///
    /// Every requested call takes a slot, including ones that then fail
    /// validation. Once the budget is spent the call is refused with
    /// `BudgetExceeded`.
    pub fn admit(&self, call: &ToolCall, budget: &mut TurnBudget, keys: &ApiKeys) -> Admission {
        if !budget.try_consume() {
            warn!(
                "Tool budget of {} spent, refusing {} call #{}",
                budget.limit(),
                call.tool_name,
                call.call_index
            );
            return Admission::Refused(ToolOutcome::failed(
                ToolFailure::BudgetExceeded,
                format!(
                    "Tool budget of {} calls for this turn is spent. Answer with what you have.",
                    budget.limit()
                ),
            ));
        }

        let Some(tool) = Tool::from_name(&call.tool_name) else {
            return Admission::Refused(ToolOutcome::failed(
                ToolFailure::UnknownTool,
                format!("No tool named '{}'", call.tool_name),
            ));
        };
        let arguments = Value::Object(call.arguments.clone());

        match tool {
            Tool::TmdbSearch => match serde_json::from_value::<SearchArgs>(arguments) {
                Ok(args) if args.title.trim().is_empty() => Admission::Refused(
                    ToolOutcome::failed(ToolFailure::InvalidArguments, "title must not be empty"),
                ),
                Ok(args) => Admission::Run(Invocation::Search {
                    title: args.title.trim().to_string(),
                    kind: args.kind,
                    year: args.year,
                }),
                Err(e) => Admission::Refused(ToolOutcome::failed(
                    ToolFailure::InvalidArguments,
                    format!("Invalid tmdb_search arguments: {e}"),
                )),
            },
            Tool::WatchHistory => {
                let Some(user_token) = keys.trakt.clone() else {
                    return Admission::Refused(ToolOutcome::failed(
                        ToolFailure::UnknownTool,
                        "watch_history is not available without a signed-in user",
                    ));
                };
                match serde_json::from_value::<HistoryArgs>(arguments) {
                    Ok(args) => Admission::Run(Invocation::History {
                        user_token,
                        query: args.into_query(),
                    }),
                    Err(e) => Admission::Refused(ToolOutcome::failed(
                        ToolFailure::InvalidArguments,
                        format!("Invalid watch_history arguments: {e}"),
                    )),
                }
            }
        }
    }

    /// Runs an admitted call under the tool timeout.
    pub async fn execute(&self, admission: Admission, keys: &ApiKeys) -> ToolOutcome {
        let invocation = match admission {
            Admission::Run(invocation) => invocation,
            Admission::Refused(outcome) => return outcome,
        };

        match invocation {
            Invocation::Search { title, kind, year } => {
                let lookup = with_timeout(
                    self.identifier.name(),
                    self.tool_timeout,
                    self.identifier.search(&title, kind, year, keys),
                )
                .await;
                match lookup {
                    Ok(Some(reference)) => {
                        info!(
                            "Grounded '{}' as {}/{}",
                            title, reference.media_kind, reference.canonical_id
                        );
                        ToolOutcome::Found {
                            deep_link: self.links.link(&reference),
                            reference,
                        }
                    }
                    Ok(None) => {
                        debug!("No identifier match for '{title}' ({kind})");
                        ToolOutcome::NotFound { title, kind }
                    }
                    Err(e) => {
                        warn!("Identifier lookup for '{title}' failed: {e}");
                        provider_failure(&e)
                    }
                }
            }
            Invocation::History { user_token, query } => {
                let lookup = with_timeout(
                    self.history.name(),
                    self.tool_timeout,
                    self.read_history(&user_token, query),
                )
                .await;
                lookup.unwrap_or_else(|e| {
                    warn!("History lookup failed: {e}");
                    provider_failure(&e)
                })
            }
        }
    }

    async fn read_history(
        &self,
        user_token: &str,
        query: HistoryQuery,
    ) -> Result<ToolOutcome, ProviderError> {
        debug!("History lookup {query:?}");
        Ok(match query {
            HistoryQuery::Watched(filter) => ToolOutcome::History {
                items: self.history.history(user_token, &filter).await?,
            },
            HistoryQuery::ContinueWatching { limit } => ToolOutcome::History {
                items: self.history.continue_watching(user_token, limit).await?,
            },
            HistoryQuery::Calendar { days } => ToolOutcome::Upcoming {
                episodes: self.history.calendar(user_token, days).await?,
            },
            HistoryQuery::Stats => ToolOutcome::Stats {
                stats: self.history.stats(user_token).await?,
            },
        })
    }
}
