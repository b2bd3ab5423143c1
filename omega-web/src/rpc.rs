//! JSON-RPC 2.0 envelopes and the error codes the tool server uses.

use omega_core::{ErrorKind, OmegaError, ProviderError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Protocol version announced by `initialize`.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Server name announced by `initialize`.
pub const SERVER_NAME: &str = "VOID Omega MCP";

/// Server version announced by `initialize`.
pub const SERVER_VERSION: &str = "1.0.0";

pub const PARSE_ERROR: i32 = -32700;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const MISSING_CREDENTIAL: i32 = -32000;
pub const RESOLUTION_FAILED: i32 = -32001;
pub const ASSISTANT_UNAVAILABLE: i32 = -32002;

/// Incoming call or notification.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
}

impl RpcRequest {
    /// Notifications carry no id and get no response body.
    pub fn is_notification(&self) -> bool {
        self.id.is_none() && self.method.starts_with("notifications/")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.data = Some(json!({ "kind": kind }));
        self
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }
}

impl From<&OmegaError> for RpcError {
    fn from(error: &OmegaError) -> Self {
        let code = match error {
            OmegaError::Provider(ProviderError::MissingCredential { .. }) => MISSING_CREDENTIAL,
            OmegaError::InvalidRequest { .. } => INVALID_PARAMS,
            OmegaError::Provider(_) | OmegaError::Resolution(_) => RESOLUTION_FAILED,
            OmegaError::AssistantUnavailable { .. } => ASSISTANT_UNAVAILABLE,
            OmegaError::Configuration { .. } => INTERNAL_ERROR,
        };
        let mut rpc = RpcError::new(code, error.user_message());
        if let Some(kind) = error.kind() {
            rpc = rpc.with_kind(kind);
        }
        if let OmegaError::Resolution(failure) = error {
            rpc.data = Some(json!({
                "kind": error.kind(),
                "reason": failure.reason,
                "attempts": failure.attempts,
            }));
        }
        rpc
    }
}

/// Outgoing response; exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<Value>, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(error),
        }
    }
}

/// Wraps text as tool call content.
pub fn text_content(text: impl Into<String>) -> Value {
    json!({
        "content": [{ "type": "text", "text": text.into() }]
    })
}

#[cfg(test)]
mod tests {
    use omega_core::resolver::ResolutionFailure;
    use omega_core::FailureReason;

    use super::*;

    #[test]
    fn test_error_codes_follow_error_kind() {
        let missing = OmegaError::from(ProviderError::missing_credential("torbox", "a TorBox API key"));
        let failed = OmegaError::from(ResolutionFailure {
            reason: FailureReason::AllProvidersUnavailable,
            attempts: Vec::new(),
        });
        let assistant = OmegaError::AssistantUnavailable {
            reason: "gemini timed out".to_string(),
        };

        assert_eq!(RpcError::from(&missing).code, MISSING_CREDENTIAL);
        let failed = RpcError::from(&failed);
        assert_eq!(failed.code, RESOLUTION_FAILED);
        assert_eq!(
            failed.data.as_ref().map(|d| d["reason"].clone()),
            Some(json!("AllProvidersUnavailable"))
        );
        let assistant = RpcError::from(&assistant);
        assert_eq!(assistant.code, ASSISTANT_UNAVAILABLE);
        assert_eq!(assistant.data, Some(json!({"kind": "AssistantUnavailable"})));
        assert!(!assistant.message.contains("gemini"));
    }

    #[test]
    fn test_input_and_config_errors_carry_no_kind() {
        let invalid = RpcError::from(&OmegaError::InvalidRequest {
            reason: "message must not be empty".to_string(),
        });
        let config = RpcError::from(&OmegaError::Configuration {
            reason: "GEMINI_MODEL is blank".to_string(),
        });

        assert_eq!(invalid.code, INVALID_PARAMS);
        assert_eq!(invalid.data, None);
        assert_eq!(config.code, INTERNAL_ERROR);
        assert_eq!(config.data, None);
        assert!(!config.message.contains("GEMINI_MODEL"));
    }

    #[test]
    fn test_response_omits_unused_member() {
        let response = RpcResponse::success(Some(json!(7)), json!({"ok": true}));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 7);
        assert!(json.get("error").is_none());

        let response = RpcResponse::failure(None, RpcError::method_not_found("x"));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["id"], Value::Null);
        assert_eq!(json["error"]["code"], METHOD_NOT_FOUND);
        assert!(json.get("result").is_none());
    }
}
