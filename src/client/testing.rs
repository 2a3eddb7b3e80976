//! In-memory backends for unit tests.
//!
//! [`ScriptedConnector`] hands out transports that answer the MCP handshake
//! and reply to `tools/call` from a per-backend script, recording every
//! interaction so tests can assert on spawn/teardown order.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::transport::{Connector, Transport, TransportError};
use crate::config::BackendConfig;

/// Build an enabled backend config with a harmless command.
pub(crate) fn backend(id: &str, priority: i64) -> BackendConfig {
    BackendConfig {
        id: id.to_string(),
        name: id.to_uppercase(),
        command: "scripted-backend".to_string(),
        args: vec!["--id".to_string(), id.to_string()],
        env: None,
        priority: priority.into(),
        enabled: true,
    }
}

/// How a scripted backend answers one `tools/call`.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// One text content block.
    Text(String),
    /// A result with no content blocks.
    Empty,
    /// A JSON-RPC error response (code -32603).
    RpcError(String),
    /// A result flagged `isError: true` carrying this text.
    ToolError(String),
    /// The backend exits without answering.
    Closed,
    /// The backend never answers.
    Hang,
}

#[derive(Default)]
struct Script {
    events: Vec<String>,
    sticky: HashMap<(String, String), Reply>,
    once: HashMap<(String, String), VecDeque<Reply>>,
    arguments: HashMap<(String, String), Value>,
    open_failures: HashMap<String, io::ErrorKind>,
    silent: Vec<String>,
    failing_shutdown: Vec<String>,
}

impl Script {
    fn next_reply(&mut self, key: &(String, String)) -> Reply {
        if let Some(reply) = self.once.get_mut(key).and_then(VecDeque::pop_front) {
            return reply;
        }
        self.sticky.get(key).cloned().unwrap_or(Reply::Empty)
    }
}

/// Connector whose backends are driven by a shared script.
#[derive(Default)]
pub(crate) struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer every call of `tool` on `backend` with `reply` from now on.
    pub(crate) fn reply(&self, backend: &str, tool: &str, reply: Reply) {
        self.lock()
            .sticky
            .insert((backend.to_string(), tool.to_string()), reply);
    }

    /// Answer the next call of `tool` on `backend` with `reply`, before any
    /// standing reply.
    pub(crate) fn reply_once(&self, backend: &str, tool: &str, reply: Reply) {
        self.lock()
            .once
            .entry((backend.to_string(), tool.to_string()))
            .or_default()
            .push_back(reply);
    }

    /// Make opening `backend` fail with an OS error of this kind.
    pub(crate) fn fail_open(&self, backend: &str, kind: io::ErrorKind) {
        self.lock().open_failures.insert(backend.to_string(), kind);
    }

    /// Make `backend` exit instead of answering `initialize`.
    pub(crate) fn silent_handshake(&self, backend: &str) {
        self.lock().silent.push(backend.to_string());
    }

    /// Make the graceful half-close of `backend` fail.
    pub(crate) fn fail_shutdown(&self, backend: &str) {
        self.lock().failing_shutdown.push(backend.to_string());
    }

    /// Everything that happened so far, e.g. `open:a`, `call:a:search_videos`.
    pub(crate) fn events(&self) -> Vec<String> {
        self.lock().events.clone()
    }

    /// Events whose text starts with `prefix`.
    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    /// Arguments of the most recent call of `tool` on `backend`.
    pub(crate) fn last_arguments(&self, backend: &str, tool: &str) -> Option<Value> {
        self.lock()
            .arguments
            .get(&(backend.to_string(), tool.to_string()))
            .cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(&self, config: &BackendConfig) -> Result<Box<dyn Transport>, TransportError> {
        let mut script = self.lock();
        script.events.push(format!("open:{}", config.id));
        if let Some(kind) = script.open_failures.get(&config.id) {
            return Err(TransportError::Spawn {
                command: config.command.clone(),
                source: io::Error::from(*kind),
            });
        }
        Ok(Box::new(ScriptedTransport {
            backend: config.id.clone(),
            script: self.script.clone(),
            outbox: VecDeque::new(),
            hang: false,
        }))
    }
}

struct ScriptedTransport {
    backend: String,
    script: Arc<Mutex<Script>>,
    outbox: VecDeque<Value>,
    hang: bool,
}

impl ScriptedTransport {
    fn answer(&mut self, id: &Value, reply: Reply) {
        let message = match reply {
            Reply::Text(text) => json!({
                "jsonrpc": "2.0", "id": id,
                "result": {"content": [{"type": "text", "text": text}]}
            }),
            Reply::Empty => json!({"jsonrpc": "2.0", "id": id, "result": {"content": []}}),
            Reply::ToolError(text) => json!({
                "jsonrpc": "2.0", "id": id,
                "result": {"content": [{"type": "text", "text": text}], "isError": true}
            }),
            Reply::RpcError(message) => json!({
                "jsonrpc": "2.0", "id": id,
                "error": {"code": -32603, "message": message}
            }),
            Reply::Closed => return,
            Reply::Hang => {
                self.hang = true;
                return;
            }
        };
        self.outbox.push_back(message);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&mut self, message: &Value) -> Result<(), TransportError> {
        let method = message.get("method").and_then(Value::as_str).unwrap_or_default();
        let id = message.get("id").cloned().unwrap_or(Value::Null);

        match method {
            "initialize" => {
                let silent = {
                    let mut script = self.script.lock().unwrap();
                    script.events.push(format!("initialize:{}", self.backend));
                    script.silent.contains(&self.backend)
                };
                if !silent {
                    self.outbox.push_back(json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "result": {
                            "protocolVersion": "2025-06-18",
                            "capabilities": {"tools": {}},
                            "serverInfo": {"name": format!("scripted-{}", self.backend), "version": "0.0.0"}
                        }
                    }));
                }
            }
            "notifications/initialized" => {
                let mut script = self.script.lock().unwrap();
                script.events.push(format!("initialized:{}", self.backend));
            }
            "tools/call" => {
                let tool = message["params"]["name"].as_str().unwrap_or_default().to_string();
                let key = (self.backend.clone(), tool.clone());
                let reply = {
                    let mut script = self.script.lock().unwrap();
                    script.events.push(format!("call:{}:{}", self.backend, tool));
                    script
                        .arguments
                        .insert(key.clone(), message["params"]["arguments"].clone());
                    script.next_reply(&key)
                };
                self.answer(&id, reply);
            }
            _ => {}
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Value>, TransportError> {
        if let Some(message) = self.outbox.pop_front() {
            return Ok(Some(message));
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        Ok(None)
    }

    async fn shutdown(&mut self) -> Result<(), TransportError> {
        let mut script = self.script.lock().unwrap();
        script.events.push(format!("shutdown:{}", self.backend));
        if script.failing_shutdown.contains(&self.backend) {
            return Err(TransportError::Io(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        Ok(())
    }

    async fn terminate(&mut self) -> Result<(), TransportError> {
        let mut script = self.script.lock().unwrap();
        script.events.push(format!("terminate:{}", self.backend));
        Ok(())
    }
}
