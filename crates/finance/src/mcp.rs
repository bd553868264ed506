//! Tool server protocol: the JSON-RPC wire types shared by both processes
//! and the HTTP client the chat session uses to reach the server.
pub mod client;
pub mod protocol;

pub use client::{McpClient, McpError, McpResult, Timeouts};
