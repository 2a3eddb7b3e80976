//! Unified download entry point.
//!
//! [`DownloadRouter`] sends requests for the primary source to a
//! [`FastPathDownloader`] wrapped in a [`RetryPolicy`], and everything else
//! to one named backend through the [`BackendRegistry`]. Either way the
//! caller gets a [`DownloadOutcome`] instead of an error.

mod ytdlp;

pub use ytdlp::{validate_video_id, YtDlpDownloader};

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{is_transient_message, Result};
use crate::registry::BackendRegistry;
use crate::retry::RetryPolicy;

/// Backend id served by the fast path instead of a subprocess backend.
pub const PRIMARY_BACKEND: &str = "youtube";

/// Resolution cap used when a request does not set one.
pub const DEFAULT_MAX_HEIGHT: u32 = 720;

/// What to download and where to put it.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub id: String,
    /// `None` or [`PRIMARY_BACKEND`] selects the fast path.
    pub backend_id: Option<String>,
    pub output_path: PathBuf,
    /// Seconds from the start of the item to fetch.
    pub segment_duration: f64,
    /// Fast path only.
    pub max_height: Option<u32>,
}

impl DownloadRequest {
    pub fn new(id: impl Into<String>, output_path: impl Into<PathBuf>, segment_duration: f64) -> Self {
        Self {
            id: id.into(),
            backend_id: None,
            output_path: output_path.into(),
            segment_duration,
            max_height: None,
        }
    }

    #[must_use]
    pub fn with_backend(mut self, backend_id: impl Into<String>) -> Self {
        self.backend_id = Some(backend_id.into());
        self
    }

    #[must_use]
    pub fn with_max_height(mut self, max_height: u32) -> Self {
        self.max_height = Some(max_height);
        self
    }

    /// Backend that will serve this request.
    pub fn target(&self) -> &str {
        self.backend_id.as_deref().unwrap_or(PRIMARY_BACKEND)
    }

    fn is_primary(&self) -> bool {
        self.target() == PRIMARY_BACKEND
    }
}

/// Normalized result of a routed download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    pub backend_used: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set on failure: whether the same request may succeed later.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl DownloadOutcome {
    fn succeeded(backend: &str, path: PathBuf) -> Self {
        Self {
            success: true,
            file_path: Some(path),
            backend_used: backend.to_string(),
            error: None,
            retryable: None,
        }
    }

    fn failed(backend: &str, error: String) -> Self {
        let retryable = infer_retryable(&error);
        Self {
            success: false,
            file_path: None,
            backend_used: backend.to_string(),
            error: Some(error),
            retryable: Some(retryable),
        }
    }
}

/// Downloader for the primary source.
#[async_trait]
pub trait FastPathDownloader: Send + Sync {
    /// Download the request's item to its output path and return the file.
    async fn download(&self, request: &DownloadRequest) -> Result<PathBuf>;
}

/// Whether an error message describes a failure worth retrying.
///
/// Permanent patterns ("not found", 404, "video unavailable", ...) win over
/// transient ones (timeouts, refused connections, 429/503, ...); anything
/// unrecognised is treated as permanent.
pub fn infer_retryable(message: &str) -> bool {
    is_transient_message(message)
}

/// Routes downloads to the fast path or to a registry backend.
pub struct DownloadRouter {
    registry: Arc<BackendRegistry>,
    fast_path: Arc<dyn FastPathDownloader>,
    retry: RetryPolicy,
}

impl DownloadRouter {
    /// Router using `yt-dlp` for the primary source and the default
    /// [`RetryPolicy`].
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self {
            registry,
            fast_path: Arc::new(YtDlpDownloader::new()),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_fast_path(mut self, fast_path: Arc<dyn FastPathDownloader>) -> Self {
        self.fast_path = fast_path;
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Whether `backend_id` is the primary source or an enabled backend.
    pub fn supports(&self, backend_id: &str) -> bool {
        backend_id == PRIMARY_BACKEND
            || self
                .registry
                .enabled_backends()
                .iter()
                .any(|b| b.id == backend_id)
    }

    /// The primary source followed by enabled backends in fallback order.
    pub fn supported_backends(&self) -> Vec<String> {
        std::iter::once(PRIMARY_BACKEND.to_string())
            .chain(self.registry.enabled_backends().into_iter().map(|b| b.id))
            .collect()
    }

    /// Route one download. Failures are reported in the outcome.
    pub async fn download(&self, request: &DownloadRequest) -> DownloadOutcome {
        let backend = request.target();
        info!("Downloading {} via {}", request.id, backend);

        let result = if request.is_primary() {
            let fast_path = &self.fast_path;
            let context = format!("{PRIMARY_BACKEND} download of {}", request.id);
            self.retry
                .execute(&context, move || fast_path.download(request))
                .await
        } else {
            self.registry
                .download_from_any(
                    &request.id,
                    Some(backend),
                    Some(&request.output_path),
                    Some(request.segment_duration),
                )
                .await
        };

        match result {
            Ok(path) => {
                info!("{} download complete: {}", backend, path.display());
                DownloadOutcome::succeeded(backend, path)
            }
            Err(e) => {
                let outcome = DownloadOutcome::failed(backend, e.to_string());
                warn!(
                    "{} download failed (retryable={}): {}",
                    backend,
                    outcome.retryable.unwrap_or(false),
                    e
                );
                outcome
            }
        }
    }
}
