use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;

use super::protocol::{
    methods, CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, RequestId, PROTOCOL_VERSION, SESSION_HEADER,
};
use crate::models::tool::Tool;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum McpError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Server error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl McpError {
    /// Whether the failure means the server itself could not be reached
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            McpError::Connection(_) | McpError::Timeout(_) | McpError::Http { .. }
        )
    }
}

pub type McpResult<T> = Result<T, McpError>;

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Establishing the connection and the initialize handshake
    pub connect: Duration,
    pub discovery: Duration,
    pub call: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            discovery: Duration::from_secs(5),
            call: Duration::from_secs(30),
        }
    }
}

/// JSON-RPC client for a tool server reachable over HTTP
#[derive(Debug)]
pub struct McpClient {
    client: Client,
    url: String,
    session_id: Option<String>,
    next_id: AtomicI64,
    timeouts: Timeouts,
    server_info: Option<Implementation>,
}

impl McpClient {
    /// Connect to the server at `url` and complete the initialize handshake
    pub async fn connect(url: &str, timeouts: Timeouts) -> McpResult<Self> {
        let client = Client::builder()
            .connect_timeout(timeouts.connect)
            .build()
            .map_err(|e| McpError::Connection(e.to_string()))?;

        let mut mcp = Self {
            client,
            url: url.to_string(),
            session_id: None,
            next_id: AtomicI64::new(1),
            timeouts,
            server_info: None,
        };
        mcp.initialize().await?;
        Ok(mcp)
    }

    async fn initialize(&mut self) -> McpResult<()> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: json!({}),
            client_info: Implementation {
                name: "finance".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        let params = serde_json::to_value(params).map_err(|e| McpError::Protocol(e.to_string()))?;

        let (response, session_id) = self
            .send(
                JsonRpcRequest::new(self.next_request_id(), methods::INITIALIZE, params),
                self.timeouts.connect,
            )
            .await?;
        self.session_id = session_id;

        let result: InitializeResult = Self::unwrap_result(response)?;
        if result.protocol_version != PROTOCOL_VERSION {
            tracing::warn!(
                server = %result.protocol_version,
                client = PROTOCOL_VERSION,
                "protocol version mismatch"
            );
        }
        tracing::info!(
            server = %result.server_info.name,
            version = %result.server_info.version,
            "initialized tool server session"
        );
        self.server_info = Some(result.server_info);

        self.notify(methods::INITIALIZED, Value::Null).await
    }

    pub fn server_info(&self) -> Option<&Implementation> {
        self.server_info.as_ref()
    }

    pub async fn list_tools(&self) -> McpResult<Vec<Tool>> {
        let result: ListToolsResult = self
            .request(methods::TOOLS_LIST, json!({}), self.timeouts.discovery)
            .await?;
        tracing::debug!("listed {} tools", result.tools.len());
        Ok(result.tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<CallToolResult> {
        tracing::info!(tool = name, "calling tool");
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let params = serde_json::to_value(params).map_err(|e| McpError::Protocol(e.to_string()))?;
        self.request(methods::TOOLS_CALL, params, self.timeouts.call)
            .await
    }

    /// End the session on the server. A session the server no longer knows
    /// about counts as closed.
    pub async fn close(&self) -> McpResult<()> {
        let Some(session_id) = &self.session_id else {
            return Ok(());
        };

        let timeout = self.timeouts.discovery;
        let response = self
            .client
            .delete(&self.url)
            .header(SESSION_HEADER, session_id)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        match response.status() {
            status if status.is_success() || status == StatusCode::NOT_FOUND => {
                tracing::debug!(%session_id, "closed tool server session");
                Ok(())
            }
            status => Err(McpError::Http {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn request<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> McpResult<R> {
        let request = JsonRpcRequest::new(self.next_request_id(), method, params);
        let (response, _) = self.send(request, timeout).await?;
        Self::unwrap_result(response)
    }

    async fn notify(&self, method: &str, params: Value) -> McpResult<()> {
        let request = JsonRpcRequest::notification(method, params);
        self.send(request, self.timeouts.connect).await?;
        Ok(())
    }

    /// POST one JSON-RPC message; returns the parsed body (Null for accepted
    /// notifications) together with any session id the server handed out
    async fn send(
        &self,
        request: JsonRpcRequest,
        timeout: Duration,
    ) -> McpResult<(Value, Option<String>)> {
        let mut builder = self
            .client
            .post(&self.url)
            .header("accept", "application/json")
            .timeout(timeout)
            .json(&request);
        if let Some(session_id) = &self.session_id {
            builder = builder.header(SESSION_HEADER, session_id);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        match response.status() {
            StatusCode::ACCEPTED => Ok((Value::Null, session_id)),
            StatusCode::OK => {
                let body = response.json::<Value>().await.map_err(|e| {
                    if e.is_timeout() {
                        McpError::Timeout(timeout)
                    } else {
                        McpError::Protocol(format!("Invalid response body: {}", e))
                    }
                })?;
                Ok((body, session_id))
            }
            status => {
                let message = response.text().await.unwrap_or_default();
                Err(McpError::Http {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    fn unwrap_result<R: DeserializeOwned>(body: Value) -> McpResult<R> {
        let response: JsonRpcResponse = serde_json::from_value(body)
            .map_err(|e| McpError::Protocol(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = response.error {
            return Err(McpError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        let result = response
            .result
            .ok_or_else(|| McpError::Protocol("Response missing result field".to_string()))?;
        serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("Failed to deserialize result: {}", e)))
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

fn transport_error(error: reqwest::Error, timeout: Duration) -> McpError {
    if error.is_timeout() {
        McpError::Timeout(timeout)
    } else {
        McpError::Connection(error.to_string())
    }
}
