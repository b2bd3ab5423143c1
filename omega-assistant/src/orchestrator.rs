//! The model and tool loop for one assistant turn.
//!
//! A turn moves through `AwaitingModel -> ExecutingTools -> AwaitingModel ...
//! -> Finalizing`. Tool batches run concurrently and are joined before the
//! model sees their results. The final text is validated so only links
//! grounded during the turn survive.

use std::sync::Arc;

use futures::future::join_all;
use omega_core::config::AssistantConfig;
use omega_core::conversation::{ConversationTurn, ModelReply, RequestedToolCall, ToolCall};
use omega_core::credentials::ApiKeys;
use omega_core::errors::with_timeout;
use omega_core::media::GroundedReference;
use omega_core::providers::{ChatModel, HistoryProvider, IdentifierProvider};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::AssistantError;
use crate::grounding::{DeepLinkFormat, GroundingLedger, GroundingValidator, StrippedLink};
use crate::registry::{GroundingToolRegistry, ToolResult, TurnBudget};

/// Model rounds allowed beyond the tool budget. The last one is offered no
/// tools and must answer.
const EXTRA_ROUNDS: usize = 2;

/// One chat call: the new message plus the history the caller kept.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub message: String,
    pub history: Vec<ConversationTurn>,
    pub keys: ApiKeys,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_keys(mut self, keys: ApiKeys) -> Self {
        self.keys = keys;
        self
    }
}

/// Result of a completed turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub turn_id: Uuid,
    /// Final text with ungrounded links removed
    pub text: String,
    /// Every tool call of the turn with its result, in call order
    pub tool_calls: Vec<ToolResult>,
    pub grounded: Vec<GroundedReference>,
    pub stripped: Vec<StrippedLink>,
    /// Turns to append to the caller's history, starting with the user message
    pub new_turns: Vec<ConversationTurn>,
    pub rounds: usize,
}

#[derive(Debug)]
enum TurnState {
    AwaitingModel,
    ExecutingTools {
        preamble: String,
        calls: Vec<RequestedToolCall>,
    },
    Finalizing(String),
}

/// Working set of a single turn.
struct Turn {
    id: Uuid,
    turns: Vec<ConversationTurn>,
    produced_from: usize,
    budget: TurnBudget,
    ledger: GroundingLedger,
    trace: Vec<ToolResult>,
    next_call_index: u32,
    rounds: usize,
}

impl Turn {
    fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// Numbers the requested calls, continuing across rounds.
    fn number_calls(&mut self, calls: Vec<RequestedToolCall>) -> Vec<ToolCall> {
        calls
            .into_iter()
            .map(|requested| {
                let call = ToolCall {
                    tool_name: requested.name,
                    arguments: requested.arguments,
                    call_index: self.next_call_index,
                };
                self.next_call_index += 1;
                call
            })
            .collect()
    }
}

/// Runs assistant turns against the chat model and the tool registry.
#[derive(Debug, Clone)]
pub struct ConversationOrchestrator {
    model: Arc<dyn ChatModel>,
    registry: GroundingToolRegistry,
    validator: GroundingValidator,
    config: AssistantConfig,
}

impl ConversationOrchestrator {
    pub fn new(
        model: Arc<dyn ChatModel>,
        identifier: Arc<dyn IdentifierProvider>,
        history: Arc<dyn HistoryProvider>,
        config: AssistantConfig,
    ) -> Self {
        let links = DeepLinkFormat::new(&config.deep_link_scheme);
        Self {
            model,
            registry: GroundingToolRegistry::new(identifier, history, links.clone(), config.tool_timeout),
            validator: GroundingValidator::new(links),
            config,
        }
    }

    pub fn registry(&self) -> &GroundingToolRegistry {
        &self.registry
    }

    /// Model calls allowed in one turn.
    pub fn round_limit(&self) -> usize {
        self.config.tool_budget + EXTRA_ROUNDS
    }

    /// Instructions sent with every model call.
    pub fn system_directive(&self, tools_offered: bool) -> String {
        let scheme = self.validator.format().scheme();
        let mut directive = format!(
            "You are VOID Omega, a movie and TV recommendation assistant.\n\
             Link a title only as [Title]({scheme}://<kind>/<id>) where <kind> is movie or show \
             and <id> is the canonical id returned by tmdb_search during this turn. \
             Never guess or reuse ids from memory; mention titles you did not look up as plain text."
        );
        if tools_offered {
            directive.push_str(&format!(
                "\nYou may make at most {} tool calls this turn.",
                self.config.tool_budget
            ));
        } else {
            directive.push_str(
                "\nNo more tool calls are available this turn. Write your final answer now.",
            );
        }
        directive
    }

    /// Runs one turn to completion.
    ///
    /// # Errors
    /// - `AssistantError::EmptyMessage` - The message is blank
    /// - `AssistantError::Model` - The model failed, timed out or replied with nothing
    /// - `AssistantError::RoundLimit` - The model still asked for tools, with no
    ///   text, on the final round
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatOutcome, AssistantError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(AssistantError::EmptyMessage);
        }
        let keys = &request.keys;

        let mut turn = Turn {
            id: Uuid::new_v4(),
            produced_from: request.history.len(),
            turns: request.history,
            budget: TurnBudget::new(self.config.tool_budget),
            ledger: GroundingLedger::default(),
            trace: Vec::new(),
            next_call_index: 0,
            rounds: 0,
        };
        turn.push(ConversationTurn::user(message));
        info!(
            "Turn {} started with {} prior turns",
            turn.id, turn.produced_from
        );

        let mut state = TurnState::AwaitingModel;
        loop {
            state = match state {
                TurnState::AwaitingModel => self.await_model(&mut turn, keys).await?,
                TurnState::ExecutingTools { preamble, calls } => {
                    self.execute_tools(&mut turn, preamble, calls, keys).await;
                    TurnState::AwaitingModel
                }
                TurnState::Finalizing(text) => return Ok(self.finalize(turn, &text)),
            };
        }
    }

    async fn await_model(&self, turn: &mut Turn, keys: &ApiKeys) -> Result<TurnState, AssistantError> {
        turn.rounds += 1;
        let last_round = turn.rounds >= self.round_limit();

        let tools = if last_round || turn.budget.is_exhausted() {
            Vec::new()
        } else {
            self.registry.declarations(keys)
        };
        let system = self.system_directive(!tools.is_empty());
        debug!(
            "Turn {} round {}: {} turns, {} tools offered",
            turn.id,
            turn.rounds,
            turn.turns.len(),
            tools.len()
        );

        let reply = with_timeout(
            self.model.name(),
            self.config.model_timeout,
            self.model.complete(&system, &turn.turns, &tools, keys),
        )
        .await?;

        Ok(match reply {
            ModelReply::ToolCalls { preamble, calls } if !calls.is_empty() && !last_round => {
                TurnState::ExecutingTools { preamble, calls }
            }
            ModelReply::ToolCalls { preamble, calls } if !calls.is_empty() => {
                warn!(
                    "Turn {} hit the round cap of {} with {} tool call(s) pending",
                    turn.id,
                    turn.rounds,
                    calls.len()
                );
                if preamble.trim().is_empty() {
                    return Err(AssistantError::RoundLimit {
                        rounds: turn.rounds,
                    });
                }
                TurnState::Finalizing(preamble)
            }
            ModelReply::ToolCalls { preamble: text, .. } | ModelReply::Text(text) => {
                if text.trim().is_empty() {
                    return Err(AssistantError::EmptyReply);
                }
                TurnState::Finalizing(text)
            }
        })
    }

    async fn execute_tools(
        &self,
        turn: &mut Turn,
        preamble: String,
        calls: Vec<RequestedToolCall>,
        keys: &ApiKeys,
    ) {
        let calls = turn.number_calls(calls);
        info!(
            "Turn {} round {}: model requested {:?}",
            turn.id,
            turn.rounds,
            calls.iter().map(|c| c.tool_name.as_str()).collect::<Vec<_>>()
        );
        turn.push(ConversationTurn::assistant_calls(preamble, calls.clone()));

        let admissions: Vec<_> = calls
            .iter()
            .map(|call| self.registry.admit(call, &mut turn.budget, keys))
            .collect();
        let outcomes = join_all(
            admissions
                .into_iter()
                .map(|admission| self.registry.execute(admission, keys)),
        )
        .await;

        for (call, outcome) in calls.into_iter().zip(outcomes) {
            if let Some(reference) = outcome.grounded_reference() {
                turn.ledger.record(reference.clone());
            }
            turn.push(ConversationTurn::tool_result(call.clone(), &outcome.to_value()));
            turn.trace.push(ToolResult { call, outcome });
        }
    }

    fn finalize(&self, mut turn: Turn, text: &str) -> ChatOutcome {
        let validated = self.validator.validate(text, &turn.ledger);
        if !validated.stripped.is_empty() {
            warn!(
                "Turn {}: stripped {} ungrounded link(s)",
                turn.id,
                validated.stripped.len()
            );
        }
        turn.push(ConversationTurn::assistant(validated.text.clone()));
        info!(
            "Turn {} done after {} rounds, {} tool calls",
            turn.id,
            turn.rounds,
            turn.trace.len()
        );

        ChatOutcome {
            turn_id: turn.id,
            text: validated.text,
            tool_calls: turn.trace,
            grounded: turn.ledger.into_references(),
            stripped: validated.stripped,
            new_turns: turn.turns.split_off(turn.produced_from),
            rounds: turn.rounds,
        }
    }
}
