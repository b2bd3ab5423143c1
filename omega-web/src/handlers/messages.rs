//! JSON-RPC method dispatch for `POST /mcp/messages`.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::tools;
use crate::rpc::{
    INTERNAL_ERROR, PARSE_ERROR, PROTOCOL_VERSION, RpcError, RpcRequest, RpcResponse,
    SERVER_NAME, SERVER_VERSION,
};
use crate::server::AppState;

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": { "listChanged": true }
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": SERVER_VERSION
        }
    })
}

fn respond(status: StatusCode, response: RpcResponse) -> Response {
    (status, Json(response)).into_response()
}

/// Handles one JSON-RPC message.
///
/// Unknown methods answer 404, parse failures 400 and internal errors 500.
/// Other tool failures are reported inside a 200 response.
pub async fn mcp_messages(
    State(state): State<AppState>,
    body: Result<Json<RpcRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Rejected JSON-RPC body: {rejection}");
            return respond(
                StatusCode::BAD_REQUEST,
                RpcResponse::failure(None, RpcError::new(PARSE_ERROR, rejection.body_text())),
            );
        }
    };
    debug!("JSON-RPC method: {}", request.method);

    match request.method.as_str() {
        "initialize" => respond(
            StatusCode::OK,
            RpcResponse::success(request.id, initialize_result()),
        ),
        _ if request.is_notification() => StatusCode::NO_CONTENT.into_response(),
        "tools/list" => respond(
            StatusCode::OK,
            RpcResponse::success(request.id, json!({ "tools": tools::catalog() })),
        ),
        "tools/call" => match tools::call(&state, request.params).await {
            Ok(result) => respond(StatusCode::OK, RpcResponse::success(request.id, result)),
            Err(error) => {
                warn!("Tool call failed with {}: {}", error.code, error.message);
                let status = if error.code == INTERNAL_ERROR {
                    StatusCode::INTERNAL_SERVER_ERROR
                } else {
                    StatusCode::OK
                };
                respond(status, RpcResponse::failure(request.id, error))
            }
        },
        method => respond(
            StatusCode::NOT_FOUND,
            RpcResponse::failure(request.id, RpcError::method_not_found(method)),
        ),
    }
}
