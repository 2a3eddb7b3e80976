//! Client for one backend subprocess.
//!
//! A [`BackendClient`] owns at most one live connection to its backend:
//! `connect` spawns the process and runs the MCP handshake, the tool methods
//! perform one round trip each, and `disconnect` tears everything down.
//!
//! ```rust,no_run
//! use vidbridge::client::BackendClient;
//! use vidbridge::config::BackendConfig;
//!
//! # async fn demo(config: BackendConfig) -> vidbridge::Result<()> {
//! let client = BackendClient::new(config)?;
//! client.connect().await?;
//! let results = client.search("military aircraft", Some(120.0)).await;
//! client.disconnect().await;
//! println!("{} results", results?.len());
//! # Ok(())
//! # }
//! ```

pub mod protocol;
pub mod security;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::BackendConfig;
use crate::error::{BackendError, Result};

use self::protocol::{ToolOutput, DETAILS_TOOL, DOWNLOAD_TOOL, SEARCH_TOOL};
use self::session::RpcSession;
use self::transport::{Connector, StdioConnector, Transport, TransportError};

/// One search hit from a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    #[serde(rename = "videoId", alias = "id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnail_url: String,
    /// Length in seconds.
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub published_at: String,
    /// Backend that produced this result.
    #[serde(
        default,
        rename = "providerId",
        alias = "backendId",
        skip_serializing_if = "Option::is_none"
    )]
    pub backend_id: Option<String>,
    /// Direct download URL, when the backend exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

/// Metadata for a single item, as returned by `get_video_details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDetails {
    #[serde(rename = "videoId", alias = "id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub download_url: String,
    #[serde(default)]
    pub format: String,
}

/// Deadlines applied to backend I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Spawn plus handshake.
    pub connect_timeout: Duration,
    /// One tool round trip. Downloads can take a while.
    pub request_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(300),
        }
    }
}

/// Which step a transport failure happened in.
#[derive(Debug, Clone, Copy)]
enum Phase {
    Connect,
    Tool(&'static str),
}

struct Connection {
    session: RpcSession,
    transport: Box<dyn Transport>,
}

/// Connection to one backend subprocess.
///
/// Cheap to construct: nothing is spawned until [`connect`](Self::connect).
/// After [`disconnect`](Self::disconnect) the client can be connected again.
pub struct BackendClient {
    config: BackendConfig,
    connector: Arc<dyn Connector>,
    options: ClientOptions,
    connection: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("id", &self.config.id)
            .field("command", &self.config.command)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl BackendClient {
    /// Create a client that spawns its backend as a child process.
    ///
    /// Fails with [`BackendError::Connection`] if the launch command does not
    /// pass [`security::validate_launch`].
    pub fn new(config: BackendConfig) -> Result<Self> {
        Self::with_connector(config, Arc::new(StdioConnector), ClientOptions::default())
    }

    /// Create a client with a custom transport factory and deadlines.
    pub fn with_connector(
        config: BackendConfig,
        connector: Arc<dyn Connector>,
        options: ClientOptions,
    ) -> Result<Self> {
        security::validate_launch(&config)?;
        Ok(Self {
            config,
            connector,
            options,
            connection: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// Server name reported in the handshake, while connected.
    pub async fn server_name(&self) -> Option<String> {
        self.connection
            .lock()
            .await
            .as_ref()
            .and_then(|c| c.session.server_name().map(str::to_string))
    }

    /// Spawn the backend and run the handshake. No-op when already connected.
    pub async fn connect(&self) -> Result<()> {
        let mut slot = self.connection.lock().await;
        if slot.is_some() {
            debug!("{}: already connected", self.config.id);
            return Ok(());
        }

        let deadline = self.options.connect_timeout;
        let mut transport = match tokio::time::timeout(deadline, self.connector.open(&self.config)).await {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => return Err(self.classify(e, Phase::Connect)),
            Err(_) => return Err(self.classify(spawn_timeout(deadline), Phase::Connect)),
        };

        match RpcSession::handshake(transport.as_mut(), &self.config.id, deadline).await {
            Ok(session) => {
                info!("Connected to {} ({})", self.config.name, self.config.id);
                *slot = Some(Connection { session, transport });
                Ok(())
            }
            Err(e) => {
                // The process may be running even though the handshake failed.
                if let Err(close_err) = transport.terminate().await {
                    warn!("{}: cleanup after failed handshake: {close_err}", self.config.id);
                }
                Err(self.classify(e, Phase::Connect))
            }
        }
    }

    /// Search the backend's catalog.
    ///
    /// Backend-reported errors and unparseable payloads are logged and come
    /// back as an empty list; only transport failures are returned as errors.
    pub async fn search(&self, query: &str, max_duration: Option<f64>) -> Result<Vec<SearchResult>> {
        let mut arguments = Map::new();
        arguments.insert("query".to_string(), Value::from(query));
        if let Some(max) = max_duration {
            arguments.insert("max_duration".to_string(), Value::from(max));
        }

        let output = self
            .call_tool(SEARCH_TOOL, arguments, "Search videos failed")
            .await?;

        let Some(text) = output.first_text() else {
            debug!("{}: search returned no text content", self.config.id);
            return Ok(Vec::new());
        };
        if output.is_error {
            warn!("{}: search failed on server: {}", self.config.id, snippet(text));
            return Ok(Vec::new());
        }
        Ok(parse_search_results(&self.config.id, text))
    }

    /// Download an item; the backend answers with the local file path.
    pub async fn download(
        &self,
        id: &str,
        output_path: Option<&Path>,
        segment_duration: Option<f64>,
    ) -> Result<PathBuf> {
        let mut arguments = Map::new();
        arguments.insert("video_id".to_string(), Value::from(id));
        if let Some(path) = output_path {
            arguments.insert(
                "output_path".to_string(),
                Value::from(path.to_string_lossy().into_owned()),
            );
        }
        if let Some(duration) = segment_duration {
            arguments.insert("duration".to_string(), Value::from(duration));
        }

        let output = self
            .call_tool(DOWNLOAD_TOOL, arguments, "Download video failed")
            .await?;

        match output.first_text() {
            Some(text) if output.is_error => Err(BackendError::server(format!(
                "Download failed: {}",
                text.trim()
            ))),
            Some(text) => {
                let path = PathBuf::from(text.trim());
                info!("{}: downloaded {} to {}", self.config.id, id, path.display());
                Ok(path)
            }
            None => Err(BackendError::server(
                "Download failed: No file path returned from server",
            )),
        }
    }

    /// Fetch metadata for one item.
    pub async fn get_details(&self, id: &str) -> Result<ItemDetails> {
        let mut arguments = Map::new();
        arguments.insert("video_id".to_string(), Value::from(id));

        let output = self
            .call_tool(DETAILS_TOOL, arguments, "Get video details failed")
            .await?;

        match output.first_text() {
            Some(text) if output.is_error => Err(BackendError::server(format!(
                "Get video details failed: {}",
                text.trim()
            ))),
            Some(text) => parse_details(&self.config.id, text),
            None => Err(BackendError::server("Video not found")),
        }
    }

    /// Close the session, then reap the process.
    ///
    /// Both steps are attempted even if the first fails; errors are logged.
    /// Safe to call when not connected.
    pub async fn disconnect(&self) {
        let Some(Connection {
            session,
            mut transport,
        }) = self.connection.lock().await.take()
        else {
            return;
        };

        if let Err(e) = session.close(transport.as_mut()).await {
            warn!("{}: error closing session: {e}", self.config.id);
        }
        if let Err(e) = transport.terminate().await {
            warn!("{}: error closing transport: {e}", self.config.id);
        }
        debug!("{}: disconnected", self.config.id);
    }

    async fn call_tool(
        &self,
        name: &'static str,
        arguments: Map<String, Value>,
        context: &'static str,
    ) -> Result<ToolOutput> {
        let mut slot = self.connection.lock().await;
        let Some(conn) = slot.as_mut() else {
            return Err(BackendError::connection(
                "Client not connected. Call connect() first.",
            ));
        };

        debug!("{}: calling {}", self.config.id, name);
        conn.session
            .call_tool(
                conn.transport.as_mut(),
                name,
                arguments,
                self.options.request_timeout,
            )
            .await
            .map_err(|e| self.classify(e, Phase::Tool(context)))
    }

    /// Map a transport failure onto the public error taxonomy.
    fn classify(&self, err: TransportError, phase: Phase) -> BackendError {
        classify_transport_error(&self.config, err, phase)
    }
}

fn spawn_timeout(deadline: Duration) -> TransportError {
    TransportError::Timeout {
        elapsed: deadline,
        waiting_for: "backend to start".to_string(),
    }
}

/// The single conversion point from transport failures to [`BackendError`].
fn classify_transport_error(config: &BackendConfig, err: TransportError, phase: Phase) -> BackendError {
    let text = err.to_string();
    let timed_out = matches!(err, TransportError::Timeout { .. })
        || err.io_kind() == Some(std::io::ErrorKind::TimedOut)
        || text.contains("timeout")
        || text.contains("ETIMEDOUT");

    match phase {
        Phase::Connect if timed_out => BackendError::timeout(format!(
            "Connection to {} timed out. Ensure the server is running.",
            config.name
        )),
        Phase::Connect
            if err.io_kind() == Some(std::io::ErrorKind::NotFound)
                || text.contains("ENOENT")
                || text.contains("command not found") =>
        {
            BackendError::connection_with(
                format!(
                    "Failed to start {} server. Command not found: {}. Check the \"command\" entry for \"{}\" and that it is on PATH.",
                    config.name, config.command, config.id
                ),
                err,
            )
        }
        Phase::Connect => BackendError::connection_with(
            format!("Failed to connect to {}: {text}", config.name),
            err,
        ),
        Phase::Tool(context) if timed_out => BackendError::timeout(format!("{context}: {text}")),
        Phase::Tool(context) => match err {
            TransportError::Rpc { code, message } => BackendError::server_with_code(
                format!("{context}: {message}"),
                code.to_string(),
            ),
            other => BackendError::server(format!("{context}: {other}")),
        },
    }
}

fn snippet(text: &str) -> String {
    text.chars().take(200).collect()
}

fn parse_search_results(backend: &str, text: &str) -> Vec<SearchResult> {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!(
                "{backend}: failed to parse search response as JSON ({e}): {}",
                snippet(text)
            );
            return Vec::new();
        }
    };

    if let Some(error) = value.get("error") {
        warn!("{backend}: search returned error: {}", describe(error));
        return Vec::new();
    }

    match serde_json::from_value::<Vec<SearchResult>>(value) {
        Ok(results) => results,
        Err(e) => {
            warn!("{backend}: unexpected search response shape ({e}): {}", snippet(text));
            Vec::new()
        }
    }
}

fn parse_details(backend: &str, text: &str) -> Result<ItemDetails> {
    let value: Value = serde_json::from_str(text).map_err(|e| {
        warn!(
            "{backend}: failed to parse details response as JSON ({e}): {}",
            snippet(text)
        );
        BackendError::server("Invalid JSON response from server")
    })?;

    if let Some(error) = value.get("error") {
        return Err(BackendError::server(format!(
            "Video not found: {}",
            describe(error)
        )));
    }

    serde_json::from_value(value)
        .map_err(|e| BackendError::server(format!("Invalid video details from server: {e}")))
}

/// Render an `error` member without JSON quoting when it is a plain string.
fn describe(error: &Value) -> String {
    error
        .as_str()
        .map_or_else(|| error.to_string(), str::to_string)
}
