//! Wire types for the agent gateway (JSON-RPC 2.0 over HTTP + SSE).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// JSON-RPC 2.0 request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    pub params: Value,
}

/// One part of a protocol message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePart {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(text.into()),
        }
    }
}

/// Outbound user message in the `message/stream` params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub kind: String,
    #[serde(rename = "messageId")]
    pub message_id: String,
    pub role: String,
    pub parts: Vec<MessagePart>,
    #[serde(rename = "contextId")]
    pub context_id: String,
    pub metadata: Value,
}

/// Build the `message/stream` request envelope.
pub fn stream_request(
    customer_id: &str,
    message_id: &str,
    context_id: &str,
    text: &str,
) -> JsonRpcRequest {
    let message = OutboundMessage {
        kind: "message".to_string(),
        message_id: message_id.to_string(),
        role: "user".to_string(),
        parts: vec![MessagePart::text(text)],
        context_id: context_id.to_string(),
        metadata: json!({ "displaySource": "user" }),
    };
    JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        id: format!("req-{customer_id}"),
        method: "message/stream".to_string(),
        params: json!({ "message": message, "metadata": {} }),
    }
}

/// Decoded contents of one SSE `data:` frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// Agent chat texts from `result.status.message.parts`.
    pub messages: Vec<String>,
    /// Structured outputs from `result.artifact.parts`.
    pub artifacts: Vec<String>,
    /// `result.final == true`, the stream terminator.
    pub is_final: bool,
}

/// Decode a parsed SSE data payload into its text parts.
pub fn decode_frame(data: &Value) -> SseFrame {
    let mut frame = SseFrame::default();
    let Some(result) = data.get("result") else {
        return frame;
    };

    if let Some(message) = result.pointer("/status/message") {
        if message.get("role").and_then(Value::as_str) == Some("agent") {
            if let Some(parts) = message.get("parts").and_then(Value::as_array) {
                for part in parts {
                    if part.get("kind").and_then(Value::as_str) == Some("text") {
                        if let Some(text) = part.get("text").and_then(Value::as_str) {
                            frame.messages.push(text.to_string());
                        }
                    }
                }
            }
        }
    } else if let Some(parts) = result.pointer("/artifact/parts").and_then(Value::as_array) {
        for part in parts {
            if part.get("kind").and_then(Value::as_str) == Some("text") {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    frame.artifacts.push(text.to_string());
                }
            }
        }
    }

    frame.is_final = result.get("final").and_then(Value::as_bool) == Some(true);
    frame
}
