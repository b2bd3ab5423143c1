//! Conversation turns and tool-call records exchanged with the chat model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// Tool invocation recorded in the turn sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    /// Position of the call within its assistant turn, starting at 0.
    pub call_index: u32,
}

/// One entry of the running conversation.
///
/// Assistant turns list the tool calls they requested. Tool turns carry the
/// JSON result in `content` and the single call they answer in `tool_calls`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
        }
    }

    pub fn tool_result(call: ToolCall, result: &Value) -> Self {
        Self {
            role: Role::Tool,
            content: result.to_string(),
            tool_calls: vec![call],
        }
    }
}

/// Tool declaration offered to the chat model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Tool call as emitted by the model, before the orchestrator numbers it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl RequestedToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// What the chat model produced for one round.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// Final answer for the user.
    Text(String),
    /// Tools the model wants run before it answers. Any text the model
    /// produced alongside the calls is kept as the preamble.
    ToolCalls {
        preamble: String,
        calls: Vec<RequestedToolCall>,
    },
}
