//! JSON-RPC over stdio transport.
//!
//! Handles low-level communication with the MCP server child process:
//! - Writing JSON-RPC requests and notifications to stdin
//! - Reading JSON-RPC responses from stdout
//! - Matching responses to requests by `id`
//!
//! The transport is driven through `&mut self`, so at most one request can
//! be in flight per session. Responses for other ids are discarded.

use std::io::ErrorKind;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use super::codec;
use super::errors::McpError;
use super::lifecycle::StderrCapture;
use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// How long to wait for stderr to reach EOF once stdout has closed.
const DEFAULT_STDERR_GRACE: Duration = Duration::from_secs(2);

// ─── Transport ───────────────────────────────────────────────────────────────

/// Bi-directional JSON-RPC transport over a child process's stdio.
pub struct StdioTransport {
    server_name: String,
    /// `None` once the input side has been closed.
    writer: Option<BoxedWriter>,
    reader: BufReader<BoxedReader>,
    diagnostics: Option<StderrCapture>,
    stderr_grace: Duration,
    /// Next request id. Starts at 1, never reused within a session.
    next_id: u64,
}

impl StdioTransport {
    /// Create a transport from any writer (server input) and reader (server output).
    pub fn new<W, R>(server_name: &str, writer: W, reader: R) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            server_name: server_name.to_string(),
            writer: Some(Box::new(writer)),
            reader: BufReader::new(Box::new(reader)),
            diagnostics: None,
            stderr_grace: DEFAULT_STDERR_GRACE,
            next_id: 1,
        }
    }

    /// Attach the server's stderr collector, reported on transport failure.
    pub fn with_diagnostics(mut self, diagnostics: StderrCapture) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Override how long to wait for stderr after the server goes away.
    pub fn with_stderr_grace(mut self, grace: Duration) -> Self {
        self.stderr_grace = grace;
        self
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// The id the next request will use.
    pub fn peek_next_id(&self) -> u64 {
        self.next_id
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // ─── Codec ───────────────────────────────────────────────────────────

    /// Write one message as a single line and flush it.
    pub async fn send<T: serde::Serialize>(&mut self, message: &T) -> Result<(), McpError> {
        let line = codec::encode_line(&self.server_name, message)?;

        let Some(writer) = self.writer.as_mut() else {
            return Err(McpError::SessionClosed {
                server: self.server_name.clone(),
            });
        };

        let written = match writer.write_all(line.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        match written {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Err(self.closed_error().await),
            Err(e) => Err(McpError::TransportError {
                server: self.server_name.clone(),
                reason: format!("failed to write to stdin: {e}"),
            }),
        }
    }

    /// Read the next non-blank line from the server's stdout (trimmed).
    pub async fn receive_line(&mut self) -> Result<String, McpError> {
        let mut line_buf = String::new();
        loop {
            line_buf.clear();
            let bytes_read = self
                .reader
                .read_line(&mut line_buf)
                .await
                .map_err(|e| McpError::TransportError {
                    server: self.server_name.clone(),
                    reason: format!("failed to read from stdout: {e}"),
                })?;

            if bytes_read == 0 {
                return Err(self.closed_error().await);
            }

            let trimmed = line_buf.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }
    }

    /// Build a `TransportClosed` error carrying whatever the server wrote to stderr.
    async fn closed_error(&mut self) -> McpError {
        let stderr = match self.diagnostics.as_mut() {
            Some(capture) => capture.collect(self.stderr_grace).await,
            None => String::new(),
        };
        if !stderr.is_empty() {
            tracing::warn!(
                server = %self.server_name,
                stderr = %stderr.trim(),
                "server stderr captured on failure"
            );
        }
        McpError::TransportClosed {
            server: self.server_name.clone(),
            stderr,
        }
    }

    // ─── Correlation ─────────────────────────────────────────────────────

    /// Send a JSON-RPC request and wait for the response with the same `id`.
    ///
    /// Lines for other ids (and id-less server notifications) are dropped.
    pub async fn request(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = self.allocate_id();
        let req = JsonRpcRequest::new(id, method, params);
        tracing::debug!(server = %self.server_name, method, id, "sending request");
        self.send(&req).await?;

        loop {
            let line = self.receive_line().await?;
            let message = codec::decode_line(&self.server_name, &line)?;

            match codec::message_id(&message) {
                Some(got) if got == id => {
                    return codec::into_response(&self.server_name, &line, message);
                }
                other => {
                    tracing::debug!(
                        server = %self.server_name,
                        expected = id,
                        got = ?other,
                        "discarding message for another request"
                    );
                }
            }
        }
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn notify(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let notification = JsonRpcNotification::new(method, params);
        tracing::debug!(server = %self.server_name, method, "sending notification");
        self.send(&notification).await
    }

    /// Close the server's stdin so it sees end-of-input. Never fails.
    pub async fn close_input(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!(server = %self.server_name, error = %e, "stdin shutdown failed");
            }
        }
    }

    pub fn is_input_closed(&self) -> bool {
        self.writer.is_none()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncBufReadExt, DuplexStream, Lines};

    /// The server ends of a duplex-backed transport.
    struct FakeServer {
        requests: Lines<BufReader<DuplexStream>>,
        responses: DuplexStream,
    }

    impl FakeServer {
        async fn next_request(&mut self) -> serde_json::Value {
            let line = self.requests.next_line().await.unwrap().unwrap();
            serde_json::from_str(&line).unwrap()
        }

        async fn reply(&mut self, line: &str) {
            self.responses.write_all(line.as_bytes()).await.unwrap();
            self.responses.write_all(b"\n").await.unwrap();
        }
    }

    fn pair() -> (StdioTransport, FakeServer) {
        let (client_out, server_in) = duplex(64 * 1024);
        let (server_out, client_in) = duplex(64 * 1024);
        let transport = StdioTransport::new("fake", client_out, client_in);
        let server = FakeServer {
            requests: BufReader::new(server_in).lines(),
            responses: server_out,
        };
        (transport, server)
    }

    #[tokio::test]
    async fn test_request_ids_start_at_one_and_increase() {
        let (mut transport, mut server) = pair();

        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..3 {
                let req = server.next_request().await;
                let id = req["id"].as_u64().unwrap();
                seen.push(id);
                server
                    .reply(&format!(r#"{{"jsonrpc":"2.0","id":{id},"result":{{}}}}"#))
                    .await;
            }
            seen
        });

        for expected in 1..=3u64 {
            let resp = transport.request("tools/list", None).await.unwrap();
            assert_eq!(resp.id, expected);
        }
        assert_eq!(handle.await.unwrap(), vec![1, 2, 3]);
        assert_eq!(transport.peek_next_id(), 4);
    }

    #[tokio::test]
    async fn test_blank_lines_are_skipped() {
        let (mut transport, mut server) = pair();
        server
            .reply("\n   \n{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"tools\":[]}}")
            .await;

        let resp = transport.request("tools/list", None).await.unwrap();
        assert_eq!(resp.id, 1);
        assert_eq!(resp.result.unwrap()["tools"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_mismatched_ids_and_notifications_are_discarded() {
        let (mut transport, mut server) = pair();
        server
            .reply(r#"{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info"}}"#)
            .await;
        server
            .reply(r#"{"jsonrpc":"2.0","id":99,"result":{"stale":true}}"#)
            .await;
        server
            .reply(r#"{"jsonrpc":"2.0","id":1,"result":{"fresh":true}}"#)
            .await;

        let resp = transport.request("tools/list", None).await.unwrap();
        assert_eq!(resp.result.unwrap()["fresh"], true);
    }

    #[tokio::test]
    async fn test_invalid_json_is_fatal() {
        let (mut transport, mut server) = pair();
        server.reply("not json at all").await;

        let err = transport.request("tools/list", None).await.unwrap_err();
        assert!(matches!(err, McpError::MalformedMessage { .. }));
    }

    #[tokio::test]
    async fn test_eof_before_response_reports_stderr() {
        let (client_out, _server_in) = duplex(1024);
        let (server_out, client_in) = duplex(1024);
        let (mut stderr_tx, stderr_rx) = duplex(1024);

        stderr_tx
            .write_all(b"Error: Unable to access jarfile\n")
            .await
            .unwrap();
        drop(stderr_tx);
        drop(server_out);

        let mut transport = StdioTransport::new("fake", client_out, client_in)
            .with_diagnostics(StderrCapture::spawn("fake", stderr_rx));

        let err = transport.request("initialize", None).await.unwrap_err();
        match err {
            McpError::TransportClosed { stderr, .. } => {
                assert!(stderr.contains("Unable to access jarfile"));
            }
            other => panic!("expected TransportClosed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_notify_does_not_wait_for_reply() {
        let (mut transport, mut server) = pair();

        transport
            .notify("notifications/initialized", None)
            .await
            .unwrap();

        let note = server.next_request().await;
        assert_eq!(note["method"], "notifications/initialized");
        assert!(note.get("id").is_none());
        assert!(note.get("params").is_none());
        // The id counter is untouched by notifications.
        assert_eq!(transport.peek_next_id(), 1);
    }

    #[tokio::test]
    async fn test_send_after_close_input() {
        let (mut transport, _server) = pair();
        transport.close_input().await;
        transport.close_input().await;
        assert!(transport.is_input_closed());

        let err = transport.notify("ping", None).await.unwrap_err();
        assert!(matches!(err, McpError::SessionClosed { .. }));
    }
}
