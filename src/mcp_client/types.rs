//! Shared types for the MCP client.
//!
//! JSON-RPC 2.0 message types and MCP protocol structures.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::errors::McpError;

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 notification: a request without an `id`, never answered.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    pub fn new(method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response message (success or error).
///
/// `error` is kept as an opaque value: callers surface it verbatim and some
/// servers do not follow the `{code, message}` shape.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub id: u64,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl JsonRpcResponse {
    /// Human-readable rendering of the error payload, if any.
    pub fn error_message(&self) -> Option<String> {
        let err = self.error.as_ref()?;
        match serde_json::from_value::<JsonRpcError>(err.clone()) {
            Ok(parsed) => Some(format!("[{}] {}", parsed.code, parsed.message)),
            Err(_) => Some(err.to_string()),
        }
    }

    /// Split into the success payload, or the error payload.
    pub fn into_result(self) -> Result<serde_json::Value, serde_json::Value> {
        match (self.result, self.error) {
            (_, Some(err)) => Err(err),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(serde_json::Value::Null),
        }
    }
}

/// Standard JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

// ─── Server Launch ───────────────────────────────────────────────────────────

/// How to launch the MCP server process.
///
/// The client never resolves images or jar paths itself; it runs exactly
/// this program with exactly these arguments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

impl ServerConfig {
    /// Build a config from an argument vector (`argv[0]` is the program).
    pub fn from_argv<I, S>(argv: I) -> Result<Self, McpError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parts = argv.into_iter().map(Into::into);
        let command = parts.next().ok_or(McpError::SpawnFailed {
            command: String::new(),
            reason: "empty command".into(),
        })?;
        if command.trim().is_empty() {
            return Err(McpError::SpawnFailed {
                command,
                reason: "empty command".into(),
            });
        }
        Ok(Self {
            command,
            args: parts.collect(),
            env: HashMap::new(),
            cwd: None,
        })
    }

    /// The full command line, for logs and error messages.
    pub fn display_command(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Short label used as the `server` field in logs and errors.
    pub fn label(&self) -> String {
        std::path::Path::new(&self.command)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.command.clone())
    }
}

// ─── MCP Protocol Types ──────────────────────────────────────────────────────

/// `clientInfo` sent with `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

/// Params of the `initialize` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: serde_json::Value,
    pub client_info: ClientInfo,
}

/// MCP initialize response payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitializeResult {
    #[serde(default, alias = "protocolVersion")]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub capabilities: serde_json::Value,
    #[serde(default, alias = "serverInfo")]
    pub server_info: Option<ServerInfo>,
}

/// Server info returned in the initialize response.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

/// MCP tool definition as returned by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// `tools/list` result payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<McpToolDefinition>,
}

/// One file entry of a `compile_grammar_multi_target` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub file_name: String,
    pub content: String,
}

/// Decoded result of a successful `tools/call`.
///
/// The server wraps the tool's JSON document as text inside
/// `result.content[0].text`; `payload` is that document, already parsed.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallResult {
    pub tool_name: String,
    pub payload: serde_json::Value,
    pub execution_time_ms: u64,
}

impl ToolCallResult {
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn into_payload(self) -> serde_json::Value {
        self.payload
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.payload.get(key)
    }

    /// The tool's `success` flag. Tools that omit it are treated as successful.
    pub fn success(&self) -> bool {
        self.bool_field("success").unwrap_or(true)
    }

    /// True only when the tool explicitly reported `"success": true`.
    pub fn confirmed_success(&self) -> bool {
        self.bool_field("success").unwrap_or(false)
    }

    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(serde_json::Value::as_bool)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(serde_json::Value::as_str)
    }

    pub fn u64_field(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(serde_json::Value::as_u64)
    }

    /// An array field; missing or non-array values yield an empty slice.
    pub fn array_field(&self, key: &str) -> &[serde_json::Value] {
        self.get(key)
            .and_then(serde_json::Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Entries of `files[]` that carry both a `fileName` and string `content`.
    pub fn generated_files(&self) -> Vec<GeneratedFile> {
        self.array_field("files")
            .iter()
            .filter_map(|f| {
                let file_name = f.get("fileName")?.as_str()?;
                let content = f.get("content")?.as_str()?;
                if file_name.is_empty() {
                    return None;
                }
                Some(GeneratedFile {
                    file_name: file_name.to_string(),
                    content: content.to_string(),
                })
            })
            .collect()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
