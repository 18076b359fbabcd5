//! Line-delimited JSON framing.
//!
//! One JSON document per line, compact separators, `\n` terminator.
//! serde_json escapes control characters inside strings, so an encoded
//! message never contains a raw newline.

use serde::Serialize;

use super::errors::McpError;
use super::types::JsonRpcResponse;

/// Serialize a message to a single newline-terminated line.
pub fn encode_line<T: Serialize>(server: &str, message: &T) -> Result<String, McpError> {
    let mut line = serde_json::to_string(message).map_err(|e| McpError::TransportError {
        server: server.to_string(),
        reason: format!("failed to serialize message: {e}"),
    })?;
    line.push('\n');
    Ok(line)
}

/// Parse one non-blank line as JSON.
pub fn decode_line(server: &str, line: &str) -> Result<serde_json::Value, McpError> {
    serde_json::from_str(line).map_err(|e| McpError::MalformedMessage {
        server: server.to_string(),
        line: line.to_string(),
        reason: format!("invalid JSON: {e}"),
    })
}

/// The integer `id` of a decoded message, if it has one.
///
/// Server-initiated notifications and log lines carry no id.
pub fn message_id(message: &serde_json::Value) -> Option<u64> {
    message.get("id").and_then(serde_json::Value::as_u64)
}

/// Convert a decoded message into a response.
///
/// Exactly one of `result` / `error` must be present.
pub fn into_response(
    server: &str,
    line: &str,
    message: serde_json::Value,
) -> Result<JsonRpcResponse, McpError> {
    let malformed = |reason: String| McpError::MalformedMessage {
        server: server.to_string(),
        line: line.to_string(),
        reason,
    };

    let obj = message
        .as_object()
        .ok_or_else(|| malformed("response is not a JSON object".into()))?;
    let has_result = obj.contains_key("result");
    let has_error = obj.get("error").is_some_and(|e| !e.is_null());
    if has_result == has_error {
        return Err(malformed(
            "response must carry exactly one of `result` or `error`".into(),
        ));
    }

    serde_json::from_value(message).map_err(|e| malformed(format!("invalid response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_client::types::JsonRpcRequest;

    #[test]
    fn test_encode_line_is_single_line() {
        let req = JsonRpcRequest::new(
            7,
            "tools/call",
            Some(serde_json::json!({
                "name": "parse_sample",
                "arguments": {"sample_input": "x = 1;\ny = 2;\n"}
            })),
        );
        let line = encode_line("antlr4", &req).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.contains(r#""sample_input":"x = 1;\ny = 2;\n""#));
        assert!(!line.contains(": "));
    }

    #[test]
    fn test_decode_line_rejects_invalid_json() {
        let err = decode_line("antlr4", "SLF4J: No providers were found").unwrap_err();
        match err {
            McpError::MalformedMessage { line, .. } => {
                assert_eq!(line, "SLF4J: No providers were found");
            }
            other => panic!("expected MalformedMessage, got {other:?}"),
        }
    }

    #[test]
    fn test_message_id() {
        let msg = serde_json::json!({"jsonrpc": "2.0", "id": 5, "result": {}});
        assert_eq!(message_id(&msg), Some(5));

        let note = serde_json::json!({"jsonrpc": "2.0", "method": "notifications/message"});
        assert_eq!(message_id(&note), None);

        let string_id = serde_json::json!({"id": "5", "result": {}});
        assert_eq!(message_id(&string_id), None);
    }

    #[test]
    fn test_into_response_accepts_null_result() {
        let line = r#"{"jsonrpc":"2.0","id":1,"result":null}"#;
        let msg = decode_line("antlr4", line).unwrap();
        let resp = into_response("antlr4", line, msg).unwrap();
        assert_eq!(resp.id, 1);
        assert!(resp.error.is_none());
    }

    #[test]
    fn test_into_response_requires_exactly_one_outcome() {
        for line in [
            r#"{"jsonrpc":"2.0","id":1}"#,
            r#"{"jsonrpc":"2.0","id":1,"result":{},"error":{"code":1,"message":"x"}}"#,
        ] {
            let msg = decode_line("antlr4", line).unwrap();
            let err = into_response("antlr4", line, msg).unwrap_err();
            assert!(matches!(err, McpError::MalformedMessage { .. }), "{line}");
        }
    }
}
