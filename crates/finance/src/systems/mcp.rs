use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::System;
use crate::connection::Connector;
use crate::errors::{AgentError, AgentResult};
use crate::mcp::{McpClient, McpError, McpResult, Timeouts};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};

const SERVER_GONE: &str = "MCP server is no longer available. The server may have been shut down. \
You can continue with general questions or restart the server and try again.";

/// A remote tool server, seen through one initialized session
pub struct McpSystem {
    client: McpClient,
    name: String,
    description: String,
    tools: Vec<Tool>,
    available: AtomicBool,
}

impl McpSystem {
    /// Connect, initialize and discover the server's tools. A server that
    /// offers no tools is treated as a failed connection.
    pub async fn connect(url: &str, timeouts: Timeouts) -> McpResult<Self> {
        let client = McpClient::connect(url, timeouts).await?;
        let tools = match client.list_tools().await {
            Ok(tools) if !tools.is_empty() => tools,
            discovery => {
                // The handshake already opened a session on the server
                if let Err(e) = client.close().await {
                    tracing::debug!(error = %e, "failed to close session after discovery");
                }
                return Err(match discovery {
                    Err(e) => e,
                    Ok(_) => McpError::Protocol("No tools found on server".to_string()),
                });
            }
        };

        let (name, description) = match client.server_info() {
            Some(info) => (info.name.clone(), format!("{} {}", info.name, info.version)),
            None => ("mcp".to_string(), url.to_string()),
        };

        Ok(Self {
            client,
            name,
            description,
            tools,
            available: AtomicBool::new(true),
        })
    }
}

#[async_trait]
impl System for McpSystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn tools(&self) -> &[Tool] {
        if self.is_available() {
            &self.tools
        } else {
            &[]
        }
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        if !self.is_available() {
            return Err(AgentError::Unavailable(SERVER_GONE.to_string()));
        }

        match self
            .client
            .call_tool(&tool_call.name, tool_call.arguments)
            .await
        {
            Ok(result) if result.is_error => Err(AgentError::ExecutionError(result.text())),
            Ok(result) if result.content.is_empty() => Ok(vec![Content::text(format!(
                "Tool {} executed but returned no content",
                tool_call.name
            ))]),
            Ok(result) => Ok(result.content),
            Err(e) if e.is_transport() => {
                tracing::warn!(tool = %tool_call.name, error = %e, "tool server unreachable");
                self.available.store(false, Ordering::SeqCst);
                Err(AgentError::Unavailable(SERVER_GONE.to_string()))
            }
            Err(e) => Err(AgentError::ExecutionError(format!(
                "Error calling tool {}: {}",
                tool_call.name, e
            ))),
        }
    }

    async fn close(&self) {
        if !self.is_available() {
            return;
        }
        if let Err(e) = self.client.close().await {
            tracing::warn!(error = %e, "failed to close tool server session");
        }
    }
}

/// Opens [`McpSystem`] sessions against a fixed server URL
pub struct McpConnector {
    url: String,
    timeouts: Timeouts,
}

impl McpConnector {
    pub fn new<S: Into<String>>(url: S, timeouts: Timeouts) -> Self {
        Self {
            url: url.into(),
            timeouts,
        }
    }
}

#[async_trait]
impl Connector for McpConnector {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn connect(&self) -> McpResult<Box<dyn System>> {
        let system = McpSystem::connect(&self.url, self.timeouts).await?;
        Ok(Box::new(system))
    }
}
