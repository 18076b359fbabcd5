//! MCP client over a line-delimited JSON-RPC stdio transport.
//!
//! This module handles:
//! - Spawning and shutting down the MCP server child process
//! - Line-delimited JSON-RPC 2.0 framing over process stdio
//! - Correlating responses to requests by id
//! - The `initialize` / `notifications/initialized` handshake
//! - `tools/list` and `tools/call`, unwrapping the text-encoded tool result
//!
//! The CLI commands drive one `McpClient` per run, always through
//! [`McpClient::with_session`] so the server is shut down on every path.

pub mod client;
pub mod codec;
pub mod errors;
pub mod lifecycle;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::{ClientOptions, McpClient};
pub use errors::McpError;
pub use types::{McpToolDefinition, ServerConfig, ToolCallResult};
