//! Gemini chat model with function calling.
//!
//! Uses the `generateContent` API. Assistant turns map to `model` content,
//! tool results to `functionResponse` parts sent with the `user` role.

use async_trait::async_trait;
use omega_core::conversation::{ConversationTurn, ModelReply, RequestedToolCall, Role, ToolSpec};
use omega_core::credentials::ApiKeys;
use omega_core::providers::ChatModel;
use omega_core::ProviderError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::transport;

const PROVIDER: &str = "gemini";
const CREDENTIAL: &str = "a Gemini API key";

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDeclarations>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
struct ToolDeclarations {
    #[serde(rename = "functionDeclarations")]
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback", default)]
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(rename = "functionCall", default)]
    function_call: Option<FunctionCall>,
}

// ============================================================================
// Conversion
// ============================================================================

fn text_part(text: impl Into<String>) -> Part {
    Part::Text { text: text.into() }
}

/// Tool results travel as objects; anything else is wrapped.
fn tool_response_payload(content: &str) -> Value {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) => Value::Object(map),
        Ok(other) => serde_json::json!({ "result": other }),
        Err(_) => serde_json::json!({ "result": content }),
    }
}

/// Maps the conversation onto Gemini contents.
///
/// Consecutive tool turns are merged so every batch of function calls is
/// answered by one content holding all of its responses.
fn build_contents(turns: &[ConversationTurn]) -> Vec<Content> {
    let mut contents: Vec<Content> = Vec::with_capacity(turns.len());

    for turn in turns {
        match turn.role {
            Role::User => contents.push(Content {
                role: "user",
                parts: vec![text_part(&turn.content)],
            }),
            Role::Assistant => {
                let mut parts = Vec::with_capacity(turn.tool_calls.len() + 1);
                if !turn.content.is_empty() {
                    parts.push(text_part(&turn.content));
                }
                parts.extend(turn.tool_calls.iter().map(|call| Part::FunctionCall {
                    function_call: FunctionCall {
                        name: call.tool_name.clone(),
                        args: Value::Object(call.arguments.clone()),
                    },
                }));
                if parts.is_empty() {
                    parts.push(text_part(""));
                }
                contents.push(Content {
                    role: "model",
                    parts,
                });
            }
            Role::Tool => {
                let name = turn
                    .tool_calls
                    .first()
                    .map(|call| call.tool_name.clone())
                    .unwrap_or_default();
                let part = Part::FunctionResponse {
                    function_response: FunctionResponse {
                        name,
                        response: tool_response_payload(&turn.content),
                    },
                };
                match contents.last_mut() {
                    Some(last)
                        if last.role == "user"
                            && matches!(last.parts.first(), Some(Part::FunctionResponse { .. })) =>
                    {
                        last.parts.push(part);
                    }
                    _ => contents.push(Content {
                        role: "user",
                        parts: vec![part],
                    }),
                }
            }
        }
    }

    contents
}

fn build_tools(tools: &[ToolSpec]) -> Vec<ToolDeclarations> {
    if tools.is_empty() {
        return Vec::new();
    }
    vec![ToolDeclarations {
        function_declarations: tools
            .iter()
            .map(|tool| FunctionDeclaration {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.input_schema.clone(),
            })
            .collect(),
    }]
}

fn parse_reply(response: GenerateResponse) -> Result<ModelReply, ProviderError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let feedback = response
            .prompt_feedback
            .map(|f| f.to_string())
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(ProviderError::invalid_response(PROVIDER, feedback));
    };

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    let mut text = String::new();
    let mut calls = Vec::new();
    for part in parts {
        if let Some(chunk) = part.text {
            text.push_str(&chunk);
        }
        if let Some(call) = part.function_call {
            let arguments = match call.args {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            calls.push(RequestedToolCall {
                name: call.name,
                arguments,
            });
        }
    }

    if !calls.is_empty() {
        return Ok(ModelReply::ToolCalls {
            preamble: text,
            calls,
        });
    }
    if text.trim().is_empty() {
        let reason = candidate
            .finish_reason
            .unwrap_or_else(|| "empty reply".to_string());
        return Err(ProviderError::invalid_response(PROVIDER, reason));
    }
    Ok(ModelReply::Text(text))
}

// ============================================================================
// Provider
// ============================================================================

/// Gemini `generateContent` client.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(
        &self,
        system: &str,
        turns: &[ConversationTurn],
        tools: &[ToolSpec],
        keys: &ApiKeys,
    ) -> Result<ModelReply, ProviderError> {
        let key = transport::require_key(PROVIDER, CREDENTIAL, keys.gemini.as_ref())?;
        let body = GenerateRequest {
            contents: build_contents(turns),
            system_instruction: (!system.is_empty()).then(|| SystemInstruction {
                parts: vec![text_part(system)],
            }),
            tools: build_tools(tools),
        };
        debug!(
            "Gemini request: {} contents, {} tools",
            body.contents.len(),
            tools.len()
        );

        let request = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", key)
            .json(&body);
        let response: GenerateResponse = transport::send_json(PROVIDER, request).await?;
        parse_reply(response)
    }
}

#[cfg(test)]
mod tests {
    use omega_core::conversation::ToolCall;

    use super::*;

    fn search_call() -> ToolCall {
        ToolCall {
            tool_name: "tmdb_search".to_string(),
            arguments: serde_json::json!({"title": "The Expanse", "kind": "show"})
                .as_object()
                .cloned()
                .unwrap(),
            call_index: 0,
        }
    }

    #[test]
    fn test_tool_turns_become_function_responses() {
        let turns = vec![
            ConversationTurn::user("Recommend a space show"),
            ConversationTurn::assistant_calls("", vec![search_call(), search_call()]),
            ConversationTurn::tool_result(search_call(), &serde_json::json!({"canonical_id": 63639})),
            ConversationTurn::tool_result(search_call(), &serde_json::json!(["not", "an", "object"])),
        ];

        let contents = build_contents(&turns);

        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1].role, "model");
        assert_eq!(contents[1].parts.len(), 2);
        assert_eq!(contents[2].role, "user");
        assert_eq!(contents[2].parts.len(), 2);
        let json = serde_json::to_value(&contents[2]).unwrap();
        assert_eq!(
            json["parts"][0]["functionResponse"]["response"]["canonical_id"],
            63639
        );
        assert_eq!(
            json["parts"][1]["functionResponse"]["response"]["result"][0],
            "not"
        );
    }

    #[test]
    fn test_function_call_reply_keeps_preamble() {
        let response: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [
                {"text": "Let me check."},
                {"functionCall": {"name": "tmdb_search", "args": {"title": "Dune", "kind": "movie"}}}
            ]}}]
        }))
        .unwrap();

        let ModelReply::ToolCalls { preamble, calls } = parse_reply(response).unwrap() else {
            panic!("expected tool calls");
        };
        assert_eq!(preamble, "Let me check.");
        assert_eq!(calls[0].name, "tmdb_search");
        assert_eq!(calls[0].arguments["title"], "Dune");
    }

    #[test]
    fn test_blocked_prompt_is_invalid_response() {
        let response: GenerateResponse = serde_json::from_value(serde_json::json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        assert!(matches!(
            parse_reply(response),
            Err(ProviderError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_request_serializes_declarations() {
        let body = GenerateRequest {
            contents: build_contents(&[ConversationTurn::user("hi")]),
            system_instruction: Some(SystemInstruction {
                parts: vec![text_part("be brief")],
            }),
            tools: build_tools(&[ToolSpec {
                name: "tmdb_search".to_string(),
                description: "Look up a title".to_string(),
                input_schema: serde_json::json!({"type": "object"}),
            }]),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(
            json["tools"][0]["functionDeclarations"][0]["name"],
            "tmdb_search"
        );
        assert_eq!(json["contents"][0]["role"], "user");
    }
}
