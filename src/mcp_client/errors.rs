//! MCP Client error types.

use thiserror::Error;

/// Errors that can occur during MCP client operations.
///
/// Only [`McpError::ToolFailed`], [`McpError::MalformedResponse`] and
/// [`McpError::ServerError`] leave the session usable; every other variant
/// means the in-flight call (or the whole session) is lost.
#[derive(Debug, Error)]
pub enum McpError {
    /// The server process could not be created or its stdio pipes opened.
    #[error("failed to spawn server `{command}`: {reason}")]
    SpawnFailed {
        command: String,
        reason: String,
    },

    /// The server closed its stdout (usually because it exited).
    #[error("server '{server}' exited unexpectedly{}", format_stderr_suffix(.stderr))]
    TransportClosed {
        server: String,
        /// Everything the server wrote to stderr.
        stderr: String,
    },

    /// I/O error while reading from or writing to the server pipes.
    #[error("transport error for server '{server}': {reason}")]
    TransportError {
        server: String,
        reason: String,
    },

    /// A line on stdout was not valid JSON (or not a valid response).
    #[error("malformed message from server '{server}': {reason} (line: {line})")]
    MalformedMessage {
        server: String,
        line: String,
        reason: String,
    },

    /// The `initialize` request returned a JSON-RPC error.
    #[error("server '{server}' initialization failed: {error}")]
    InitFailed {
        server: String,
        error: serde_json::Value,
    },

    /// A `tools/call` request returned a JSON-RPC error.
    #[error("tools/call '{tool}' failed: {error}")]
    ToolFailed {
        tool: String,
        error: serde_json::Value,
    },

    /// A `tools/call` result did not have the `content[0].text` JSON shape.
    #[error("unexpected tools/call result for '{tool}': {reason}")]
    MalformedResponse {
        tool: String,
        reason: String,
    },

    /// Any other request returned a JSON-RPC error.
    #[error("{method} failed: {error}")]
    ServerError {
        method: String,
        error: serde_json::Value,
    },

    /// A call exceeded the configured deadline. The session has been closed.
    #[error("{method} timed out after {timeout_ms}ms")]
    Timeout {
        method: String,
        timeout_ms: u64,
    },

    /// The session was already closed (explicitly or after a timeout).
    #[error("session with server '{server}' is closed")]
    SessionClosed {
        server: String,
    },
}

impl McpError {
    /// Whether the session can keep serving calls after this error.
    pub fn is_session_usable(&self) -> bool {
        matches!(
            self,
            McpError::ToolFailed { .. }
                | McpError::MalformedResponse { .. }
                | McpError::ServerError { .. }
        )
    }
}

/// Format a stderr suffix for error messages (empty string if no stderr).
fn format_stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\nstderr:\n{trimmed}")
    }
}
