//! JSON-RPC session on top of a [`Transport`].
//!
//! Assigns auto-incrementing request ids and correlates responses by id,
//! answering server pings and skipping notifications while it waits.

use std::time::Duration;

use serde_json::{Map, Value};
use tracing::debug;

use super::protocol::{self, Incoming, ToolOutput};
use super::transport::{Transport, TransportError};

/// Protocol state of one connected backend.
#[derive(Debug)]
pub struct RpcSession {
    label: String,
    request_id: u64,
    server_name: Option<String>,
}

impl RpcSession {
    /// Run the MCP handshake: `initialize`, then `notifications/initialized`.
    pub async fn handshake(
        transport: &mut dyn Transport,
        label: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let mut session = Self {
            label: label.to_string(),
            request_id: 0,
            server_name: None,
        };

        let client_name = format!("vidbridge-{label}");
        let init = session
            .call(
                transport,
                "initialize",
                protocol::initialize_params(&client_name),
                timeout,
            )
            .await?;

        session.server_name = init
            .get("serverInfo")
            .and_then(|info| info.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let protocol_version = init
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or("?");
        debug!(
            "{}: initialized (server: {}, protocol: {})",
            session.label,
            session.server_name.as_deref().unwrap_or("unknown"),
            protocol_version
        );

        transport
            .send(&protocol::notification("notifications/initialized"))
            .await?;

        Ok(session)
    }

    /// Name the server reported during the handshake.
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    /// Send a request and wait for the matching response.
    pub async fn call(
        &mut self,
        transport: &mut dyn Transport,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        self.request_id += 1;
        let id = self.request_id;

        let exchange = async {
            transport.send(&protocol::request(id, method, params)).await?;
            self.wait_for(transport, id).await
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout {
                elapsed: timeout,
                waiting_for: format!("response to '{method}'"),
            })?
    }

    /// Invoke one named tool via `tools/call`.
    pub async fn call_tool(
        &mut self,
        transport: &mut dyn Transport,
        name: &str,
        arguments: Map<String, Value>,
        timeout: Duration,
    ) -> Result<ToolOutput, TransportError> {
        let result = self
            .call(
                transport,
                "tools/call",
                protocol::call_tool_params(name, arguments),
                timeout,
            )
            .await?;
        Ok(ToolOutput::from_result(&result))
    }

    /// End the session by closing our side of the channel.
    pub async fn close(self, transport: &mut dyn Transport) -> Result<(), TransportError> {
        debug!("{}: closing session", self.label);
        transport.shutdown().await
    }

    async fn wait_for(&self, transport: &mut dyn Transport, id: u64) -> Result<Value, TransportError> {
        let expected = Value::from(id);
        loop {
            let Some(message) = transport.recv().await? else {
                return Err(TransportError::Closed);
            };

            match Incoming::classify(&message) {
                Incoming::Response { id: got, outcome } if got == expected => {
                    return outcome.map_err(|failure| TransportError::Rpc {
                        code: failure.code,
                        message: failure.message,
                    });
                }
                Incoming::Response { id: got, .. } => {
                    debug!("{}: dropping response for stale id {}", self.label, got);
                }
                Incoming::Request { id: req_id, method } => {
                    let reply = if method == "ping" {
                        protocol::response(&req_id, Value::Object(Map::new()))
                    } else {
                        protocol::error_response(
                            &req_id,
                            protocol::METHOD_NOT_FOUND,
                            &format!("client does not handle '{method}'"),
                        )
                    };
                    transport.send(&reply).await?;
                }
                Incoming::Notification { method } => {
                    debug!("{}: notification {}", self.label, method);
                }
                Incoming::Invalid => {
                    debug!("{}: ignoring non JSON-RPC message", self.label);
                }
            }
        }
    }
}
