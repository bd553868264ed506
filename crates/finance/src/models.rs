//! These models represent the objects passed around by the agent
//!
//! There are several related formats we need to interact with:
//! - anthropic messages/tools, sent from the agent to the LLM
//! - MCP tool descriptors and call results, exchanged with the tool server
//!
//! We always immediately convert those data models into the internal structs
//! using to/from helpers, so the internal models match neither format exactly.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
