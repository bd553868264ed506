use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;

use finance::models::message::Message;
use finance::models::tool::Tool;
use finance::providers::base::{Provider, Usage};

/// A mock provider that returns pre-configured responses for testing, or an
/// error once the script runs out when `fail_when_empty` is set
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Message>>>,
    offered_tools: Arc<Mutex<Vec<Vec<Tool>>>>,
    fail_when_empty: bool,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            offered_tools: Arc::new(Mutex::new(Vec::new())),
            fail_when_empty: false,
        }
    }

    pub fn failing_when_empty(mut self) -> Self {
        self.fail_when_empty = true;
        self
    }

    /// The tool list passed along with each completion request
    pub fn offered_tools(&self) -> Arc<Mutex<Vec<Vec<Tool>>>> {
        Arc::clone(&self.offered_tools)
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        _system_prompt: &str,
        _messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        self.offered_tools.lock().unwrap().push(tools.to_vec());

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            if self.fail_when_empty {
                anyhow::bail!("Server error: 529 Overloaded");
            }
            // Return empty response if no more pre-configured responses
            Ok((Message::assistant().with_text(""), Usage::default()))
        } else {
            Ok((responses.remove(0), Usage::default()))
        }
    }
}
