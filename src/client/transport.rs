//! Subprocess stdio transport.
//!
//! A [`Connector`] turns a [`BackendConfig`] into a live [`Transport`]; the
//! default [`StdioConnector`] spawns the configured command and exchanges
//! newline-delimited JSON-RPC messages over its stdin/stdout. The traits are
//! the seam that lets the client be driven without real processes.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::BackendConfig;

/// How long a backend gets to exit on its own after stdin is closed.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Low-level failures below the protocol layer.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("transport I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("server closed the connection")]
    Closed,

    #[error("timed out after {elapsed:?} waiting for {waiting_for}")]
    Timeout {
        elapsed: Duration,
        waiting_for: String,
    },

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl TransportError {
    /// Underlying I/O error kind, if this failure came from the OS.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Spawn { source, .. } | Self::Io(source) => Some(source.kind()),
            _ => None,
        }
    }
}

/// A bidirectional JSON message channel to one backend process.
#[async_trait]
pub trait Transport: Send {
    /// Send one message.
    async fn send(&mut self, message: &Value) -> Result<(), TransportError>;

    /// Receive the next message, or `None` once the backend closed its output.
    async fn recv(&mut self) -> Result<Option<Value>, TransportError>;

    /// Graceful half-close: stop sending so the backend can wind down.
    async fn shutdown(&mut self) -> Result<(), TransportError>;

    /// Reap the backend process, killing it if it does not exit in time.
    async fn terminate(&mut self) -> Result<(), TransportError>;
}

/// Opens transports for backend configurations.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, config: &BackendConfig) -> Result<Box<dyn Transport>, TransportError>;
}

/// Spawns backends as child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioConnector;

#[async_trait]
impl Connector for StdioConnector {
    async fn open(&self, config: &BackendConfig) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(StdioTransport::spawn(config)?))
    }
}

/// Transport over a child process's stdin/stdout.
///
/// The child's stderr is forwarded line by line to the log. The child is
/// not killed when this value is dropped; call [`Transport::terminate`].
pub struct StdioTransport {
    label: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr_task: Option<JoinHandle<()>>,
}

impl StdioTransport {
    /// Spawn the configured command with piped stdio.
    pub fn spawn(config: &BackendConfig) -> Result<Self, TransportError> {
        debug!("spawning backend {}: {} {:?}", config.id, config.command, config.args);

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .envs(config.env.iter().flatten())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| TransportError::Spawn {
                command: config.command.clone(),
                source,
            })?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("failed to capture backend stdout"))?;

        let stderr_task = child.stderr.take().map(|stderr| {
            let label = config.id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("{}: {}", label, line);
                }
            })
        });

        Ok(Self {
            label: config.id.clone(),
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            stderr_task,
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&mut self, message: &Value) -> Result<(), TransportError> {
        let stdin = self.stdin.as_mut().ok_or(TransportError::Closed)?;
        let mut line = message.to_string();
        line.push('\n');
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Value>, TransportError> {
        loop {
            let Some(line) = self.stdout.next_line().await? else {
                return Ok(None);
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(message) => return Ok(Some(message)),
                Err(e) => {
                    // Some servers print banners on stdout; skip them.
                    warn!("{}: ignoring non-JSON output ({e}): {}", self.label, line);
                }
            }
        }
    }

    async fn shutdown(&mut self) -> Result<(), TransportError> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.shutdown().await?;
        }
        Ok(())
    }

    async fn terminate(&mut self) -> Result<(), TransportError> {
        // Closing stdin is what asks a stdio server to exit.
        self.stdin.take();

        let exited = tokio::time::timeout(EXIT_GRACE, self.child.wait()).await;
        let result = match exited {
            Ok(Ok(status)) => {
                debug!("{}: backend exited with {}", self.label, status);
                Ok(())
            }
            Ok(Err(e)) => Err(TransportError::from(e)),
            Err(_) => {
                warn!("{}: backend did not exit within {:?}, killing", self.label, EXIT_GRACE);
                self.child.kill().await.map_err(TransportError::from)
            }
        };

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        result
    }
}
