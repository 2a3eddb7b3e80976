//! `vidbridge` - one interface over many out-of-process video backends
//!
//! # Features
//!
//! - **Backends as subprocesses**: each backend is spawned from a config entry
//!   and spoken to with MCP JSON-RPC over stdio
//! - **Priority fallback**: search and download walk enabled backends in
//!   priority order and stop at the first that delivers
//! - **Launch screening**: commands and arguments with shell syntax or path
//!   tricks are refused before anything is spawned
//! - **Retry with circuit breaker**: exponential backoff for transient
//!   failures, fail-fast after repeated exhaustion
//! - **Download routing**: the primary source goes through `yt-dlp`, every
//!   other backend through the registry
//!
//! # Example
//!
//! ```rust,no_run
//! use vidbridge::BackendRegistry;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = BackendRegistry::new(vidbridge::config::default_config_path())?;
//!     let results = registry.search_all("space shuttle launch", Some(120.0)).await;
//!     for result in &results {
//!         println!("{} [{}]", result.title, result.backend_id.as_deref().unwrap_or("?"));
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod registry;
pub mod retry;
pub mod router;

pub use client::{BackendClient, ClientOptions, ItemDetails, SearchResult};
pub use config::{BackendConfig, BackendsConfig};
pub use error::{BackendError, ErrorKind, Result};
pub use registry::BackendRegistry;
pub use retry::{CircuitStatus, RetryPolicy};
pub use router::{DownloadOutcome, DownloadRequest, DownloadRouter, FastPathDownloader, YtDlpDownloader};

/// Version of vidbridge
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
