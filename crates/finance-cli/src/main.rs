mod prompt;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use finance::agent::{Agent, DEFAULT_MAX_TOOL_ROUNDS};
use finance::connection::{Connection, RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY};
use finance::mcp::Timeouts;
use finance::providers::anthropic::AnthropicProvider;
use finance::providers::configs::{AnthropicProviderConfig, ANTHROPIC_HOST, ANTHROPIC_MODEL};
use finance::systems::McpConnector;

use crate::prompt::rustyline::RustylinePrompt;
use crate::session::Session;

const DEFAULT_SERVER_URL: &str = "http://localhost:8000/mcp";

#[derive(Parser)]
#[command(author, version, about = "Chat about stocks and crypto with live market data", long_about = None)]
struct Cli {
    /// MCP server endpoint
    #[arg(long, env = "FINANCE_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    server_url: String,

    /// Model to use
    #[arg(short, long, env = "ANTHROPIC_MODEL", default_value = ANTHROPIC_MODEL)]
    model: String,

    /// Anthropic API Key (can also be set via ANTHROPIC_API_KEY environment variable)
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Anthropic API host
    #[arg(long, env = "ANTHROPIC_HOST", default_value = ANTHROPIC_HOST)]
    host: String,

    /// Connection attempts before continuing without tools
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    max_retries: u32,

    /// Delay before the first retry, doubled after each failure
    #[arg(long, default_value_t = 1000)]
    base_delay_ms: u64,

    /// Rounds of tool calls allowed per message
    #[arg(long, default_value_t = DEFAULT_MAX_TOOL_ROUNDS)]
    max_tool_rounds: usize,

    /// Seconds allowed to connect and complete the handshake
    #[arg(long, default_value_t = 10)]
    connect_timeout_secs: u64,

    /// Seconds allowed for tool discovery
    #[arg(long, default_value_t = 5)]
    discovery_timeout_secs: u64,

    /// Seconds allowed for a single tool call
    #[arg(long, default_value_t = 30)]
    tool_timeout_secs: u64,

    /// Seconds allowed for a single model response
    #[arg(long, default_value_t = 30)]
    llm_timeout_secs: u64,
}

impl Cli {
    fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            discovery: Duration::from_secs(self.discovery_timeout_secs),
            call: Duration::from_secs(self.tool_timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Logs go to stderr and stay quiet by default so they do not interleave with the chat
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let api_key = cli
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .context("API key must be provided via --api-key or ANTHROPIC_API_KEY environment variable")?;

    let mut config = AnthropicProviderConfig::new(api_key);
    config.host = cli.host.clone();
    config.model = cli.model.clone();
    config.timeout = Duration::from_secs(cli.llm_timeout_secs);
    let provider = AnthropicProvider::new(config)?;

    let agent = Agent::new(Box::new(provider)).with_max_tool_rounds(cli.max_tool_rounds);

    let connection = Connection::new(
        Box::new(McpConnector::new(cli.server_url.clone(), cli.timeouts())),
        RetryPolicy {
            max_attempts: cli.max_retries,
            base_delay: Duration::from_millis(cli.base_delay_ms),
            max_delay: DEFAULT_MAX_DELAY,
        },
    );

    println!(
        "Finance assistant {}",
        style("- type /help for commands, /exit to end the session").dim()
    );

    let prompt = RustylinePrompt::new()?;
    let mut session = Session::new(Box::new(agent), connection, Box::new(prompt));
    session.start().await
}
