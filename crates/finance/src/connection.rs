//! Establishing the tool server session: a bounded retry loop with
//! exponential backoff that falls back to a degraded, tool-less session.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::mcp::McpResult;
use crate::models::tool::Tool;
use crate::systems::System;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Opens a session with a tool server and discovers its tools
#[async_trait]
pub trait Connector: Send + Sync {
    /// Where the connector points, for display
    fn endpoint(&self) -> &str;

    async fn connect(&self) -> McpResult<Box<dyn System>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Retries are exhausted or the server went away; the session runs without tools
    Degraded,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Degraded => write!(f, "degraded"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based): doubles each
    /// time starting from `base_delay`, never exceeding `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Progress of a connection attempt, reported as it happens
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectEvent {
    Attempt { attempt: u32, max_attempts: u32 },
    AttemptFailed { attempt: u32, error: String },
    Waiting { delay: Duration },
    Connected { tools: Vec<Tool> },
    Degraded { attempts: u32 },
}

pub enum ConnectOutcome {
    Connected(Box<dyn System>),
    Degraded,
}

/// Tracks the connection state machine for one chat session
pub struct Connection {
    connector: Box<dyn Connector>,
    policy: RetryPolicy,
    state: ConnectionState,
}

impl Connection {
    pub fn new(connector: Box<dyn Connector>, policy: RetryPolicy) -> Self {
        Self {
            connector,
            policy,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn endpoint(&self) -> &str {
        self.connector.endpoint()
    }

    /// Record that an established session was lost mid-conversation
    pub fn mark_degraded(&mut self) {
        self.state = ConnectionState::Degraded;
    }

    /// Run the retry loop. Never waits after the final attempt.
    pub async fn establish<F>(&mut self, mut on_event: F) -> ConnectOutcome
    where
        F: FnMut(&ConnectEvent),
    {
        self.state = ConnectionState::Connecting;
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            on_event(&ConnectEvent::Attempt {
                attempt,
                max_attempts,
            });
            tracing::info!(attempt, max_attempts, endpoint = self.endpoint(), "connecting to tool server");

            match self.connector.connect().await {
                Ok(system) => {
                    self.state = ConnectionState::Connected;
                    on_event(&ConnectEvent::Connected {
                        tools: system.tools().to_vec(),
                    });
                    return ConnectOutcome::Connected(system);
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "connection attempt failed");
                    on_event(&ConnectEvent::AttemptFailed {
                        attempt,
                        error: e.to_string(),
                    });
                }
            }

            if attempt < max_attempts {
                let delay = self.policy.delay_for(attempt);
                on_event(&ConnectEvent::Waiting { delay });
                tokio::time::sleep(delay).await;
            }
        }

        tracing::warn!(attempts = max_attempts, "tool server unreachable, continuing without tools");
        self.state = ConnectionState::Degraded;
        on_event(&ConnectEvent::Degraded {
            attempts: max_attempts,
        });
        ConnectOutcome::Degraded
    }
}
