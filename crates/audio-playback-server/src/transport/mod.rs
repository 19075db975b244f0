//! Transports that carry MCP messages to [`crate::mcp::McpServer`].

pub mod host_guard;
pub mod http;
pub mod stdio;
