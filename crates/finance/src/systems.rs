mod mcp;
mod system;

pub use mcp::{McpConnector, McpSystem};
pub use system::System;
