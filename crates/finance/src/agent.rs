use anyhow::Result;
use async_stream;
use futures::stream::BoxStream;

use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::message::{Message, ToolRequest};
use crate::models::tool::{Tool, ToolCall};
use crate::prompt_template::system_prompt;
use crate::providers::base::Provider;
use crate::systems::System;

/// How many rounds of tool calls a single user turn may trigger
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;

/// Agent integrates a foundational LLM with the tool server it can drive
pub struct Agent {
    provider: Box<dyn Provider>,
    system: Option<Box<dyn System>>,
    max_tool_rounds: usize,
}

impl Agent {
    /// Create a new Agent with the specified provider and no tools
    pub fn new(provider: Box<dyn Provider>) -> Self {
        Self {
            provider,
            system: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_max_tool_rounds(mut self, max_tool_rounds: usize) -> Self {
        self.max_tool_rounds = max_tool_rounds.max(1);
        self
    }

    /// Swap in a freshly connected system, or none to run without tools.
    /// The previous tool set is replaced as a whole.
    pub fn set_system(&mut self, system: Option<Box<dyn System>>) {
        self.system = system;
    }

    /// Detach the current system, if any, and close it
    pub async fn close_system(&mut self) {
        if let Some(system) = self.system.take() {
            system.close().await;
        }
    }

    /// Whether a system is attached but has gone away since it connected
    pub fn system_lost(&self) -> bool {
        self.system
            .as_ref()
            .map(|system| !system.is_available())
            .unwrap_or(false)
    }

    /// The tools currently offered to the model
    pub fn tools(&self) -> Vec<Tool> {
        match &self.system {
            Some(system) if system.is_available() => system.tools().to_vec(),
            _ => Vec::new(),
        }
    }

    /// Dispatch a single tool call, refusing names outside the offered set
    async fn dispatch_tool_call(
        &self,
        tool_call: AgentResult<ToolCall>,
        tools: &[Tool],
    ) -> AgentResult<Vec<Content>> {
        let call = tool_call?;
        if !tools.iter().any(|tool| tool.name == call.name) {
            return Err(AgentError::ToolNotFound(call.name));
        }
        let system = self
            .system
            .as_ref()
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;

        tracing::info!(tool = %call.name, arguments = %call.arguments, "dispatching tool call");
        let result = system.call(call).await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "tool call failed");
        }
        result
    }

    /// Create a stream that yields each message as it's generated by the agent.
    /// This includes both the assistant's responses and any tool responses.
    pub async fn reply(&self, messages: &[Message]) -> Result<BoxStream<'_, Result<Message>>> {
        let mut messages = messages.to_vec();

        Ok(Box::pin(async_stream::try_stream! {
            let mut rounds = 0;
            loop {
                // The tool set can be withdrawn between rounds if the server goes away
                let tools = self.tools();
                let prompt = system_prompt(&tools)
                    .map_err(|e| AgentError::Internal(e.to_string()))?;

                let (response, usage) = self.provider.complete(
                    &prompt,
                    &messages,
                    &tools,
                ).await?;
                tracing::debug!(
                    input_tokens = ?usage.input_tokens,
                    output_tokens = ?usage.output_tokens,
                    "completion"
                );

                yield response.clone();

                // Ensures the message above is delivered before long running tool calls start
                tokio::task::yield_now().await;

                let tool_requests: Vec<&ToolRequest> = response.tool_requests();
                if tool_requests.is_empty() {
                    break;
                }

                if rounds >= self.max_tool_rounds {
                    tracing::warn!(rounds, "tool round limit reached");
                    Err::<(), _>(AgentError::ToolLoopLimit(self.max_tool_rounds))?;
                }
                rounds += 1;

                // Run each call in request order, one at a time
                let mut message_tool_response = Message::user();
                for request in &tool_requests {
                    let output = self
                        .dispatch_tool_call(request.tool_call.clone(), &tools)
                        .await;
                    message_tool_response = message_tool_response.with_tool_response(
                        request.id.clone(),
                        output,
                    );
                }

                yield message_tool_response.clone();

                messages.push(response.clone());
                messages.push(message_tool_response);
            }
        }))
    }
}
