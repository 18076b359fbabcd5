//! MCP client: one handshaked session with a grammar server.
//!
//! Owns the server process and its transport, performs the handshake, and
//! unwraps `tools/call` results into [`ToolCallResult`].

use std::time::{Duration, Instant};

use futures::future::BoxFuture;

use super::errors::McpError;
use super::lifecycle::{ManagedProcess, SHUTDOWN_TIMEOUT};
use super::transport::StdioTransport;
use super::types::{
    ClientInfo, InitializeParams, InitializeResult, JsonRpcResponse, ListToolsResult,
    McpToolDefinition, ServerConfig, ToolCallResult,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// MCP protocol revision announced during `initialize`.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

/// Default grace period for collecting stderr after the server goes away.
const DEFAULT_STDERR_GRACE: Duration = Duration::from_secs(2);

// ─── Options ─────────────────────────────────────────────────────────────────

/// Per-session client settings.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub protocol_version: String,
    pub client_info: ClientInfo,
    /// Deadline for a single request. `None` waits indefinitely.
    pub call_timeout: Option<Duration>,
    pub shutdown_timeout: Duration,
    pub stderr_grace: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            client_info: ClientInfo {
                name: "dsl-starter".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            call_timeout: None,
            shutdown_timeout: SHUTDOWN_TIMEOUT,
            stderr_grace: DEFAULT_STDERR_GRACE,
        }
    }
}

// ─── McpClient ───────────────────────────────────────────────────────────────

/// A single MCP session over a child process's stdio.
pub struct McpClient {
    server_name: String,
    transport: StdioTransport,
    /// `None` when the transport was supplied directly (no child to manage).
    process: Option<ManagedProcess>,
    options: ClientOptions,
    /// Set after a successful handshake.
    server: Option<InitializeResult>,
    closed: bool,
}

impl McpClient {
    /// Spawn the server described by `config`.
    pub fn start(config: &ServerConfig, options: ClientOptions) -> Result<Self, McpError> {
        let (mut process, transport) = ManagedProcess::spawn(config)?;
        process.set_shutdown_timeout(options.shutdown_timeout);
        let transport = transport.with_stderr_grace(options.stderr_grace);
        Ok(Self {
            server_name: process.name.clone(),
            transport,
            process: Some(process),
            options,
            server: None,
            closed: false,
        })
    }

    /// Wrap an existing transport (e.g., an in-memory pipe).
    pub fn from_transport(transport: StdioTransport, options: ClientOptions) -> Self {
        Self {
            server_name: transport.server_name().to_string(),
            transport,
            process: None,
            options,
            server: None,
            closed: false,
        }
    }

    /// Start a session, run `f`, and always close the session afterwards.
    ///
    /// If the returned future is dropped mid-flight the child is killed by
    /// `kill_on_drop` instead of the graceful path.
    pub async fn with_session<T, E, F>(
        config: &ServerConfig,
        options: ClientOptions,
        f: F,
    ) -> Result<T, E>
    where
        E: From<McpError>,
        F: for<'c> FnOnce(&'c mut McpClient) -> BoxFuture<'c, Result<T, E>>,
    {
        let mut client = Self::start(config, options)?;
        let outcome = f(&mut client).await;
        client.close().await;
        outcome
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Result of the handshake, once performed.
    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.server.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // ─── Requests ────────────────────────────────────────────────────────

    /// Send a request and return the matching raw response.
    ///
    /// JSON-RPC errors are *not* converted here; inspect `response.error`.
    pub async fn request(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        if self.closed {
            return Err(McpError::SessionClosed {
                server: self.server_name.clone(),
            });
        }

        let Some(deadline) = self.options.call_timeout else {
            return self.transport.request(method, params).await;
        };

        match tokio::time::timeout(deadline, self.transport.request(method, params)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    server = %self.server_name,
                    method,
                    timeout_ms = deadline.as_millis() as u64,
                    "request timed out, closing session"
                );
                self.close().await;
                Err(McpError::Timeout {
                    method: method.to_string(),
                    timeout_ms: deadline.as_millis() as u64,
                })
            }
        }
    }

    /// Send a notification. Returns as soon as the line is flushed.
    pub async fn notify(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        if self.closed {
            return Err(McpError::SessionClosed {
                server: self.server_name.clone(),
            });
        }
        self.transport.notify(method, params).await
    }

    // ─── Handshake ───────────────────────────────────────────────────────

    /// Perform the MCP initialization handshake.
    ///
    /// Calling this again returns the stored result without re-sending.
    pub async fn initialize(&mut self) -> Result<&InitializeResult, McpError> {
        if self.server.is_none() {
            let result = self.handshake().await?;
            self.server = Some(result);
        }
        Ok(self.server.get_or_insert_with(InitializeResult::default))
    }

    async fn handshake(&mut self) -> Result<InitializeResult, McpError> {
        let params = InitializeParams {
            protocol_version: self.options.protocol_version.clone(),
            capabilities: serde_json::json!({}),
            client_info: self.options.client_info.clone(),
        };
        let params = serde_json::to_value(params).map_err(|e| McpError::TransportError {
            server: self.server_name.clone(),
            reason: format!("failed to serialize initialize params: {e}"),
        })?;

        let response = self.request("initialize", Some(params)).await?;
        let result = response.into_result().map_err(|error| McpError::InitFailed {
            server: self.server_name.clone(),
            error,
        })?;

        let init: InitializeResult = serde_json::from_value(result).unwrap_or_else(|e| {
            tracing::debug!(server = %self.server_name, error = %e, "unrecognised initialize result");
            InitializeResult::default()
        });

        self.notify("notifications/initialized", None).await?;

        tracing::info!(
            server = %self.server_name,
            server_name = init.server_info.as_ref().and_then(|s| s.name.as_deref()),
            protocol = init.protocol_version.as_deref(),
            "MCP session initialized"
        );
        Ok(init)
    }

    // ─── Tools ───────────────────────────────────────────────────────────

    /// List the tools the server exposes.
    pub async fn list_tools(&mut self) -> Result<Vec<McpToolDefinition>, McpError> {
        let response = self.request("tools/list", None).await?;
        let result = response.into_result().map_err(|error| McpError::ServerError {
            method: "tools/list".into(),
            error,
        })?;
        if result.is_null() {
            return Ok(Vec::new());
        }
        let list: ListToolsResult =
            serde_json::from_value(result).map_err(|e| McpError::ServerError {
                method: "tools/list".into(),
                error: serde_json::Value::String(format!("unexpected result shape: {e}")),
            })?;
        Ok(list.tools)
    }

    /// Invoke a tool and decode the JSON document carried in `content[0].text`.
    pub async fn call_tool(
        &mut self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, McpError> {
        if !self.is_initialized() {
            tracing::warn!(server = %self.server_name, tool = tool_name, "tools/call before initialize");
        }

        let start = Instant::now();
        let params = serde_json::json!({
            "name": tool_name,
            "arguments": arguments,
        });
        let response = self.request("tools/call", Some(params)).await?;
        let payload = decode_tool_payload(tool_name, response)?;
        let elapsed = start.elapsed().as_millis() as u64;

        tracing::debug!(
            server = %self.server_name,
            tool = tool_name,
            elapsed_ms = elapsed,
            "tool call completed"
        );

        Ok(ToolCallResult {
            tool_name: tool_name.to_string(),
            payload,
            execution_time_ms: elapsed,
        })
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Close stdin, then terminate the server. Never fails; safe to repeat.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.transport.close_input().await;
        if let Some(process) = self.process.as_mut() {
            process.shutdown().await;
        }
        tracing::debug!(server = %self.server_name, "session closed");
    }
}

/// Unwrap `result.content[0].text` and parse it as JSON.
fn decode_tool_payload(
    tool_name: &str,
    response: JsonRpcResponse,
) -> Result<serde_json::Value, McpError> {
    let malformed = |reason: String| McpError::MalformedResponse {
        tool: tool_name.to_string(),
        reason,
    };

    let result = response.into_result().map_err(|error| McpError::ToolFailed {
        tool: tool_name.to_string(),
        error,
    })?;

    let first = result
        .get("content")
        .and_then(serde_json::Value::as_array)
        .and_then(|content| content.first())
        .ok_or_else(|| malformed(format!("no content in result: {result}")))?;

    let text = first
        .get("text")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| malformed(format!("content[0] has no text: {first}")))?;

    serde_json::from_str(text).map_err(|e| malformed(format!("content[0].text is not JSON: {e}")))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};

    struct FakeServer {
        requests: Lines<BufReader<DuplexStream>>,
        responses: DuplexStream,
    }

    impl FakeServer {
        async fn next_message(&mut self) -> serde_json::Value {
            let line = self.requests.next_line().await.unwrap().unwrap();
            serde_json::from_str(&line).unwrap()
        }

        async fn reply(&mut self, id: u64, body: serde_json::Value) {
            let mut msg = serde_json::json!({"jsonrpc": "2.0", "id": id});
            if let (Some(obj), Some(extra)) = (msg.as_object_mut(), body.as_object()) {
                obj.extend(extra.clone());
            }
            let line = format!("{msg}\n");
            self.responses.write_all(line.as_bytes()).await.unwrap();
        }

        async fn reply_tool_text(&mut self, id: u64, text: &str) {
            self.reply(
                id,
                serde_json::json!({"result": {"content": [{"type": "text", "text": text}]}}),
            )
            .await;
        }
    }

    fn client_with_server(options: ClientOptions) -> (McpClient, FakeServer) {
        let (client_out, server_in) = duplex(64 * 1024);
        let (server_out, client_in) = duplex(64 * 1024);
        let transport = StdioTransport::new("fake", client_out, client_in);
        let server = FakeServer {
            requests: BufReader::new(server_in).lines(),
            responses: server_out,
        };
        (McpClient::from_transport(transport, options), server)
    }

    #[tokio::test]
    async fn test_initialize_sends_handshake_then_notification() {
        let (mut client, mut server) = client_with_server(ClientOptions::default());

        let fake = tokio::spawn(async move {
            let init = server.next_message().await;
            server
                .reply(
                    1,
                    serde_json::json!({"result": {
                        "protocolVersion": "2024-11-05",
                        "capabilities": {"tools": {}},
                        "serverInfo": {"name": "antlr4-mcp-server", "version": "0.2.0"}
                    }}),
                )
                .await;
            let note = server.next_message().await;
            (init, note)
        });

        let info = client.initialize().await.unwrap();
        assert_eq!(
            info.server_info.as_ref().unwrap().name.as_deref(),
            Some("antlr4-mcp-server")
        );

        let (init, note) = fake.await.unwrap();
        assert_eq!(init["method"], "initialize");
        assert_eq!(init["id"], 1);
        assert_eq!(init["params"]["protocolVersion"], "2024-11-05");
        assert_eq!(init["params"]["clientInfo"]["name"], "dsl-starter");
        assert_eq!(note["method"], "notifications/initialized");
        assert!(note.get("id").is_none());

        // Second call is served from the stored result.
        assert!(client.initialize().await.is_ok());
        assert!(client.is_initialized());
    }

    #[tokio::test]
    async fn test_initialize_error_is_handshake_failure() {
        let (mut client, mut server) = client_with_server(ClientOptions::default());
        server
            .reply(
                1,
                serde_json::json!({"error": {"code": -32602, "message": "unsupported protocol"}}),
            )
            .await;

        let err = client.initialize().await.unwrap_err();
        match err {
            McpError::InitFailed { error, .. } => {
                assert_eq!(error["message"], "unsupported protocol");
            }
            other => panic!("expected InitFailed, got {other:?}"),
        }
        assert!(!client.is_initialized());
    }

    #[tokio::test]
    async fn test_call_tool_unwraps_inner_document() {
        let (mut client, mut server) = client_with_server(ClientOptions::default());

        let fake = tokio::spawn(async move {
            let req = server.next_message().await;
            server
                .reply_tool_text(1, r#"{"success":true,"grammarName":"G","ruleCount":1}"#)
                .await;
            req
        });

        let result = client
            .call_tool(
                "validate_grammar",
                serde_json::json!({
                    "grammar_text": "grammar G; r: ID; ID:[a-z]+;",
                    "grammar_name": "G"
                }),
            )
            .await
            .unwrap();

        assert_eq!(
            result.payload,
            serde_json::json!({"success": true, "grammarName": "G", "ruleCount": 1})
        );
        assert_eq!(result.tool_name, "validate_grammar");

        let req = fake.await.unwrap();
        assert_eq!(
            req,
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "tools/call",
                "params": {
                    "name": "validate_grammar",
                    "arguments": {
                        "grammar_text": "grammar G; r: ID; ID:[a-z]+;",
                        "grammar_name": "G"
                    }
                }
            })
        );
    }

    #[tokio::test]
    async fn test_call_tool_error_does_not_read_content() {
        let (mut client, mut server) = client_with_server(ClientOptions::default());
        server
            .reply(
                1,
                serde_json::json!({"error": {"code": -32601, "message": "Unknown tool: nope"}}),
            )
            .await;
        server.reply_tool_text(2, r#"{"success":true}"#).await;

        let err = client
            .call_tool("nope", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::ToolFailed { ref tool, .. } if tool == "nope"));
        assert!(err.is_session_usable());

        // The session is still usable for the next call.
        let ok = client
            .call_tool("validate_grammar", serde_json::json!({}))
            .await
            .unwrap();
        assert!(ok.success());
    }

    #[tokio::test]
    async fn test_call_tool_malformed_results() {
        let (mut client, mut server) = client_with_server(ClientOptions::default());
        server
            .reply(1, serde_json::json!({"result": {"content": []}}))
            .await;
        server.reply(2, serde_json::json!({"result": {}})).await;
        server
            .reply(
                3,
                serde_json::json!({"result": {"content": [{"type": "image", "data": "..."}]}}),
            )
            .await;
        server
            .reply(4, serde_json::json!({"result": {"content": [{"text": 42}]}}))
            .await;
        server.reply_tool_text(5, "Grammar compiled.").await;

        for _ in 0..5 {
            let err = client
                .call_tool("compile_grammar_multi_target", serde_json::json!({}))
                .await
                .unwrap_err();
            assert!(
                matches!(err, McpError::MalformedResponse { .. }),
                "unexpected {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_list_tools() {
        let (mut client, mut server) = client_with_server(ClientOptions::default());
        server
            .reply(
                1,
                serde_json::json!({"result": {"tools": [
                    {"name": "validate_grammar", "description": "Validate grammar syntax"},
                    {"name": "parse_sample"}
                ]}}),
            )
            .await;

        let tools = client.list_tools().await.unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["validate_grammar", "parse_sample"]);
    }

    #[tokio::test]
    async fn test_timeout_closes_session() {
        let options = ClientOptions {
            call_timeout: Some(Duration::from_millis(50)),
            ..ClientOptions::default()
        };
        let (mut client, _server) = client_with_server(options);

        let err = client.request("tools/list", None).await.unwrap_err();
        assert!(matches!(err, McpError::Timeout { timeout_ms: 50, .. }));
        assert!(client.is_closed());

        let err = client.request("tools/list", None).await.unwrap_err();
        assert!(matches!(err, McpError::SessionClosed { .. }));
    }

    #[tokio::test]
    async fn test_close_twice() {
        let (mut client, _server) = client_with_server(ClientOptions::default());
        client.close().await;
        client.close().await;
        assert!(client.is_closed());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_with_session_against_shell_server() {
        // Answers one tools/call with a canned validate_grammar result.
        let script = r#"read line; printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"content":[{"type":"text","text":"{\"success\":true,\"grammarName\":\"G\",\"ruleCount\":1}"}]}}'; cat >/dev/null"#;
        let config = ServerConfig::from_argv(["sh", "-c", script]).unwrap();

        let payload = McpClient::with_session(&config, ClientOptions::default(), |client| {
            Box::pin(async move {
                let result = client
                    .call_tool("validate_grammar", serde_json::json!({"grammar_name": "G"}))
                    .await?;
                Ok::<_, McpError>(result.into_payload())
            })
        })
        .await
        .unwrap();

        assert_eq!(payload["grammarName"], "G");
        assert_eq!(payload["ruleCount"], 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_with_session_closes_server_when_closure_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("stdin-closed");
        // Ignores TERM so the marker is only written once stdin reaches EOF.
        let script = format!(
            r#"trap '' TERM; read line; printf '%s\n' '{{"jsonrpc":"2.0","id":1,"error":{{"code":-32601,"message":"Unknown tool: nope"}}}}'; cat >/dev/null; echo closed > '{}'"#,
            marker.display()
        );
        let config = ServerConfig::from_argv(["sh", "-c", script.as_str()]).unwrap();

        let err = McpClient::with_session(&config, ClientOptions::default(), |client| {
            Box::pin(async move {
                client.call_tool("nope", serde_json::json!({})).await?;
                Ok::<_, McpError>(())
            })
        })
        .await
        .unwrap_err();

        assert!(matches!(err, McpError::ToolFailed { ref tool, .. } if tool == "nope"));
        assert_eq!(std::fs::read_to_string(&marker).unwrap().trim(), "closed");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_server_exit_before_output() {
        let config =
            ServerConfig::from_argv(["sh", "-c", "echo 'docker: image not found' >&2"]).unwrap();
        let mut client = McpClient::start(&config, ClientOptions::default()).unwrap();

        let err = client.initialize().await.unwrap_err();
        match err {
            McpError::TransportClosed { stderr, .. } => {
                assert!(stderr.contains("image not found"));
            }
            other => panic!("expected TransportClosed, got {other:?}"),
        }

        client.close().await;
        client.close().await;
    }
}
