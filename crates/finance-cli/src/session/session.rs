use anyhow::Result;
use futures::StreamExt;

use crate::prompt::{InputType, Prompt};
use finance::agent::Agent;
use finance::connection::{ConnectEvent, ConnectOutcome, Connection, ConnectionState};
use finance::models::message::Message;
use finance::models::tool::Tool;

pub struct Session<'a> {
    agent: Box<Agent>,
    connection: Connection,
    prompt: Box<dyn Prompt + 'a>,
    messages: Vec<Message>,
}

impl<'a> Session<'a> {
    pub fn new(agent: Box<Agent>, connection: Connection, prompt: Box<impl Prompt + 'a>) -> Self {
        Session {
            agent,
            connection,
            prompt,
            messages: Vec::new(),
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        self.prompt
            .render(raw_message("Starting finance assistant...\n"));
        self.connect().await;
        self.prompt.ready();

        loop {
            let input = self.prompt.get_input()?;
            match input.input_type {
                InputType::Message => {
                    if let Some(content) = input.content {
                        self.process_message(content).await;
                    }
                }
                InputType::Reconnect => self.connect().await,
                InputType::ListTools => self.list_tools(),
                InputType::AskAgain => continue,
                InputType::Exit => break,
            }
        }
        self.close_session().await;
        Ok(())
    }

    /// Run the retry loop and swap in whatever it produced. The tool set is
    /// only replaced once discovery has fully succeeded.
    async fn connect(&mut self) {
        // A reconnect starts a new server session, so end the old one first
        self.agent.close_system().await;

        let endpoint = self.connection.endpoint().to_string();
        let prompt = &mut self.prompt;
        let outcome = self
            .connection
            .establish(|event| prompt.render(raw_message(&describe_event(event, &endpoint))))
            .await;

        match outcome {
            ConnectOutcome::Connected(system) => self.agent.set_system(Some(system)),
            ConnectOutcome::Degraded => self.agent.set_system(None),
        }
    }

    fn list_tools(&mut self) {
        let tools = self.agent.tools();
        let text = if tools.is_empty() {
            format!(
                "No tools available (connection {}). Use /reconnect to try again.\n",
                self.connection.state()
            )
        } else {
            format!("Available tools:\n{}", format_tools(&tools))
        };
        self.prompt.render(raw_message(&text));
    }

    async fn process_message(&mut self, content: String) {
        // Everything after this point is dropped if the turn does not complete
        let checkpoint = self.messages.len();
        self.messages.push(Message::user().with_text(content));

        self.prompt.show_busy();
        let result = self.agent_process_messages(checkpoint).await;
        self.prompt.hide_busy();

        if let Err(e) = result {
            tracing::error!("turn failed: {}", e);
            self.messages.truncate(checkpoint);
            self.prompt.render(raw_message(&format!("Error: {}\n", e)));
        }

        if self.agent.system_lost() && self.connection.state() == ConnectionState::Connected {
            self.connection.mark_degraded();
            self.agent.close_system().await;
            self.prompt.render(raw_message(
                "MCP server is no longer available. Tools are disabled; \
                 you can keep asking general questions or use /reconnect once the server is back.\n",
            ));
        }
    }

    async fn agent_process_messages(&mut self, checkpoint: usize) -> Result<()> {
        let mut stream = self.agent.reply(&self.messages).await?;
        loop {
            tokio::select! {
                response = stream.next() => {
                    match response {
                        Some(Ok(message)) => {
                            self.messages.push(message.clone());
                            self.prompt.render(Box::new(message));
                        }
                        Some(Err(e)) => return Err(e),
                        None => return Ok(()),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    drop(stream);
                    // Reset the interaction to before the interrupted user request
                    self.messages.truncate(checkpoint);
                    self.prompt.render(raw_message(" Interrupt: Resetting conversation to before the last sent message...\n"));
                    return Ok(());
                }
            }
        }
    }

    async fn close_session(&mut self) {
        self.agent.close_system().await;
        self.prompt.render(raw_message("Goodbye!\n"));
        self.prompt.close();
    }
}

fn describe_event(event: &ConnectEvent, endpoint: &str) -> String {
    match event {
        ConnectEvent::Attempt {
            attempt,
            max_attempts,
        } => format!(
            "Connecting to MCP server at {} (attempt {}/{})...",
            endpoint, attempt, max_attempts
        ),
        ConnectEvent::AttemptFailed { attempt, error } => {
            format!("Attempt {} failed: {}", attempt, error)
        }
        ConnectEvent::Waiting { delay } => {
            format!("Waiting {:.1}s before retrying...", delay.as_secs_f64())
        }
        ConnectEvent::Connected { tools } => format!(
            "Connected to MCP server. Available tools:\n{}",
            format_tools(tools)
        ),
        ConnectEvent::Degraded { attempts } => format!(
            "Could not connect to the MCP server after {} attempts. Continuing without tools.\n\
             Troubleshooting:\n\
             - Start the server with `financed`\n\
             - Check that the server URL is correct: {}\n\
             - Type /reconnect to try again",
            attempts, endpoint
        ),
    }
}

fn format_tools(tools: &[Tool]) -> String {
    tools
        .iter()
        .map(|tool| format!("> {}: {}\n", tool.name, tool.description))
        .collect()
}

fn raw_message(content: &str) -> Box<Message> {
    Box::new(Message::assistant().with_text(content))
}
