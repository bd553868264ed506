use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use finance::errors::AgentError;
use finance::mcp::protocol::{
    methods, CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListToolsResult, RequestId, INTERNAL_ERROR,
    INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION, METHOD_NOT_FOUND, PARSE_ERROR,
    PROTOCOL_VERSION, SESSION_HEADER,
};
use finance::models::tool::ToolCall;
use serde::Serialize;
use serde_json::{json, Value};

use crate::state::AppState;

type RpcResult = Result<Value, JsonRpcError>;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/mcp", post(handler).delete(close_session))
        .with_state(state)
}

async fn handler(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            return rpc_error(None, JsonRpcError::new(PARSE_ERROR, format!("Parse error: {}", e)))
        }
    };

    let request: JsonRpcRequest = match serde_json::from_value(value.clone()) {
        Ok(request) => request,
        Err(e) => {
            let id = value
                .get("id")
                .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());
            return rpc_error(id, JsonRpcError::new(INVALID_REQUEST, e.to_string()));
        }
    };
    if request.jsonrpc != JSONRPC_VERSION {
        return rpc_error(
            request.id,
            JsonRpcError::new(INVALID_REQUEST, "jsonrpc must be \"2.0\""),
        );
    }

    if request.method == methods::INITIALIZE {
        return initialize(&state, request).await;
    }

    // Everything after initialize must name a live session
    let Some(session_id) = session_id(&headers) else {
        return (StatusCode::BAD_REQUEST, "Missing session id").into_response();
    };
    if !state.sessions.read().await.contains(&session_id) {
        tracing::debug!(%session_id, "request for unknown session");
        return (StatusCode::NOT_FOUND, "Unknown session").into_response();
    }

    if request.is_notification() {
        tracing::debug!(method = %request.method, "notification");
        return StatusCode::ACCEPTED.into_response();
    }

    let result = match request.method.as_str() {
        methods::PING => Ok(json!({})),
        methods::TOOLS_LIST => list_tools(&state),
        methods::TOOLS_CALL => call_tool(&state, request.params).await,
        other => Err(JsonRpcError::new(
            METHOD_NOT_FOUND,
            format!("Method not found: {}", other),
        )),
    };

    match result {
        Ok(value) => Json(JsonRpcResponse::success(request.id, value)).into_response(),
        Err(error) => rpc_error(request.id, error),
    }
}

async fn initialize(state: &AppState, request: JsonRpcRequest) -> Response {
    match serde_json::from_value::<InitializeParams>(request.params) {
        Ok(params) => tracing::info!(
            client = %params.client_info.name,
            version = %params.client_info.version,
            protocol = %params.protocol_version,
            "client initializing"
        ),
        Err(e) => {
            return rpc_error(request.id, JsonRpcError::new(INVALID_PARAMS, e.to_string()))
        }
    }

    let result = InitializeResult {
        protocol_version: PROTOCOL_VERSION.to_string(),
        capabilities: json!({"tools": {}}),
        server_info: Implementation {
            name: state.system.name().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        instructions: None,
    };
    let result = match to_value(&result) {
        Ok(result) => result,
        Err(error) => return rpc_error(request.id, error),
    };

    let session_id = uuid::Uuid::new_v4().to_string();
    state.sessions.write().await.insert(session_id.clone());
    tracing::info!(%session_id, "session opened");

    (
        [(SESSION_HEADER, session_id)],
        Json(JsonRpcResponse::success(request.id, result)),
    )
        .into_response()
}

fn list_tools(state: &AppState) -> RpcResult {
    to_value(&ListToolsResult {
        tools: state.system.tools().to_vec(),
    })
}

async fn call_tool(state: &AppState, params: Value) -> RpcResult {
    let params: CallToolParams = serde_json::from_value(params)
        .map_err(|e| JsonRpcError::new(INVALID_PARAMS, e.to_string()))?;

    if !state.system.tools().iter().any(|tool| tool.name == params.name) {
        return Err(JsonRpcError::new(
            INVALID_PARAMS,
            format!("Unknown tool: {}", params.name),
        ));
    }

    tracing::info!(tool = %params.name, arguments = %params.arguments, "tool call");
    let result = match state
        .system
        .call(ToolCall::new(params.name, params.arguments))
        .await
    {
        Ok(content) => CallToolResult::success(content),
        Err(error) => CallToolResult::error(error_text(error)),
    };
    to_value(&result)
}

/// Text shown to the caller for a failed tool, without the error kind prefix
/// where the tool already wrote a complete message
fn error_text(error: AgentError) -> String {
    match error {
        AgentError::ExecutionError(message) | AgentError::Unavailable(message) => message,
        other => other.to_string(),
    }
}

async fn close_session(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    let Some(session_id) = session_id(&headers) else {
        return StatusCode::BAD_REQUEST;
    };
    if state.sessions.write().await.remove(&session_id) {
        tracing::info!(%session_id, "session closed");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(String::from)
}

fn to_value<T: Serialize>(value: &T) -> RpcResult {
    serde_json::to_value(value).map_err(|e| JsonRpcError::new(INTERNAL_ERROR, e.to_string()))
}

fn rpc_error(id: Option<RequestId>, error: JsonRpcError) -> Response {
    tracing::debug!(code = error.code, message = %error.message, "json-rpc error");
    Json(JsonRpcResponse::failure(id, error)).into_response()
}
