pub mod agent;
pub mod connection;
pub mod errors;
pub mod mcp;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod systems;
