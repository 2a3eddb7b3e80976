//! MCP JSON-RPC message shapes used over a backend's stdio.
//!
//! Responses from backends are loosely typed, so nothing here assumes a
//! shape: every field is checked for presence and type before use.

use serde_json::{json, Map, Value};

/// MCP protocol revision announced during the handshake.
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Tool that searches a backend's catalog.
pub const SEARCH_TOOL: &str = "search_videos";
/// Tool that downloads an item and answers with a local file path.
pub const DOWNLOAD_TOOL: &str = "download_video";
/// Tool that returns metadata for one item.
pub const DETAILS_TOOL: &str = "get_video_details";

/// JSON-RPC "method not found".
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Build a JSON-RPC 2.0 request.
pub fn request(id: u64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params
    })
}

/// Build a JSON-RPC 2.0 notification (no id, no response expected).
pub fn notification(method: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method
    })
}

/// Successful response to a server-initiated request.
pub fn response(id: &Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

/// Error response to a server-initiated request.
pub fn error_response(id: &Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": code, "message": message}
    })
}

/// Parameters of the `initialize` request.
pub fn initialize_params(client_name: &str) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": client_name,
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

/// Parameters of a `tools/call` request.
pub fn call_tool_params(name: &str, arguments: Map<String, Value>) -> Value {
    json!({
        "name": name,
        "arguments": arguments
    })
}

/// One block of a tool result's `content` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    /// `{"type": "text", "text": ...}`. A missing `text` decodes as empty.
    Text(String),
    /// Any other block type (image, audio, resource, ...), kept by type name.
    Other(String),
}

impl ContentBlock {
    /// Decode a single block; `None` if it is not an object with a string `type`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let block = value.as_object()?;
        let kind = block.get("type")?.as_str()?;
        if kind == "text" {
            let text = block.get("text").and_then(Value::as_str).unwrap_or_default();
            Some(Self::Text(text.to_string()))
        } else {
            Some(Self::Other(kind.to_string()))
        }
    }
}

/// Decoded `tools/call` result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: Vec<ContentBlock>,
    /// The server flagged the call as failed (`isError: true`).
    pub is_error: bool,
}

impl ToolOutput {
    /// Decode a `tools/call` result. Missing or mistyped `content` yields no blocks.
    pub fn from_result(result: &Value) -> Self {
        let content = result
            .get("content")
            .and_then(Value::as_array)
            .map(|blocks| blocks.iter().filter_map(ContentBlock::from_value).collect())
            .unwrap_or_default();
        let is_error = result
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Self { content, is_error }
    }

    /// Text of the first text block, unless it is empty or only whitespace.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::Text(text) => Some(text.as_str()),
            ContentBlock::Other(_) => None,
        })
        .filter(|text| !text.trim().is_empty())
    }
}

/// A message read from the backend, classified by JSON-RPC role.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Answer to one of our requests.
    Response {
        id: Value,
        outcome: Result<Value, RpcFailure>,
    },
    /// Request initiated by the server (e.g. `ping`).
    Request { id: Value, method: String },
    /// Notification from the server (logging, progress, ...).
    Notification { method: String },
    /// Anything that is not valid JSON-RPC.
    Invalid,
}

/// `error` member of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcFailure {
    pub code: i64,
    pub message: String,
}

impl Incoming {
    pub fn classify(message: &Value) -> Self {
        let Some(obj) = message.as_object() else {
            return Self::Invalid;
        };
        let method = obj.get("method").and_then(Value::as_str);
        let id = obj.get("id").filter(|id| !id.is_null());

        match (method, id) {
            (Some(method), Some(id)) => Self::Request {
                id: id.clone(),
                method: method.to_string(),
            },
            (Some(method), None) => Self::Notification {
                method: method.to_string(),
            },
            (None, Some(id)) => {
                let outcome = if let Some(error) = obj.get("error") {
                    Err(RpcFailure {
                        code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                        message: error
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown error")
                            .to_string(),
                    })
                } else {
                    Ok(obj.get("result").cloned().unwrap_or(Value::Null))
                };
                Self::Response {
                    id: id.clone(),
                    outcome,
                }
            }
            (None, None) => Self::Invalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_shape() {
        let req = request(3, "tools/call", call_tool_params(SEARCH_TOOL, Map::new()));
        assert_eq!(req["jsonrpc"], "2.0");
        assert_eq!(req["id"], 3);
        assert_eq!(req["method"], "tools/call");
        assert_eq!(req["params"]["name"], "search_videos");
        assert!(req["params"]["arguments"].is_object());
    }

    #[test]
    fn notification_has_no_id() {
        let note = notification("notifications/initialized");
        assert!(note.get("id").is_none());
    }

    #[test]
    fn initialize_announces_protocol() {
        let params = initialize_params("vidbridge-dvids");
        assert_eq!(params["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(params["clientInfo"]["name"], "vidbridge-dvids");
    }

    #[test]
    fn decodes_text_and_other_blocks() {
        let output = ToolOutput::from_result(&json!({
            "content": [
                {"type": "image", "data": "...", "mimeType": "image/png"},
                {"type": "text", "text": "[]"},
                {"no_type": true},
                "garbage"
            ]
        }));
        assert_eq!(
            output.content,
            vec![ContentBlock::Other("image".to_string()), ContentBlock::Text("[]".to_string())]
        );
        assert_eq!(output.first_text(), Some("[]"));
        assert!(!output.is_error);
    }

    #[test]
    fn missing_content_is_empty() {
        assert!(ToolOutput::from_result(&json!({})).content.is_empty());
        assert!(ToolOutput::from_result(&json!({"content": "text"})).content.is_empty());
        assert!(ToolOutput::from_result(&Value::Null).first_text().is_none());
    }

    #[test]
    fn empty_first_text_block_counts_as_no_text() {
        let output = ToolOutput::from_result(&json!({
            "content": [{"type": "text"}, {"type": "text", "text": "later"}]
        }));
        assert_eq!(output.first_text(), None);

        let blank = ToolOutput::from_result(&json!({"content": [{"type": "text", "text": "  \n"}]}));
        assert_eq!(blank.first_text(), None);
    }

    #[test]
    fn is_error_flag() {
        let output = ToolOutput::from_result(&json!({
            "content": [{"type": "text", "text": "boom"}],
            "isError": true
        }));
        assert!(output.is_error);
    }

    #[test]
    fn classify_roles() {
        assert_eq!(
            Incoming::classify(&json!({"jsonrpc": "2.0", "id": 1, "result": {"ok": true}})),
            Incoming::Response {
                id: json!(1),
                outcome: Ok(json!({"ok": true}))
            }
        );
        assert_eq!(
            Incoming::classify(&json!({"jsonrpc": "2.0", "id": 2, "error": {"code": -32603, "message": "boom"}})),
            Incoming::Response {
                id: json!(2),
                outcome: Err(RpcFailure {
                    code: -32603,
                    message: "boom".to_string()
                })
            }
        );
        assert_eq!(
            Incoming::classify(&json!({"jsonrpc": "2.0", "id": "s1", "method": "ping"})),
            Incoming::Request {
                id: json!("s1"),
                method: "ping".to_string()
            }
        );
        assert_eq!(
            Incoming::classify(&json!({"jsonrpc": "2.0", "method": "notifications/message"})),
            Incoming::Notification {
                method: "notifications/message".to_string()
            }
        );
        assert_eq!(Incoming::classify(&json!([1, 2])), Incoming::Invalid);
    }
}
