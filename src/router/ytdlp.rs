//! `yt-dlp` subprocess downloader for the primary source.
//!
//! Fetches only the first `segment_duration` seconds of an item, capped at a
//! maximum height, with audio stripped.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{DownloadRequest, FastPathDownloader, DEFAULT_MAX_HEIGHT};
use crate::error::{is_transient_message, BackendError, Result};

static VIDEO_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap());

/// Whether `id` looks like a primary-source video id (11 URL-safe characters).
pub fn validate_video_id(id: &str) -> bool {
    VIDEO_ID.is_match(id)
}

/// [`FastPathDownloader`] backed by the `yt-dlp` binary.
#[derive(Debug, Clone)]
pub struct YtDlpDownloader {
    ytdlp_path: String,
    cache_root: Option<PathBuf>,
}

impl Default for YtDlpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl YtDlpDownloader {
    /// Create a downloader, searching for `yt-dlp` in PATH.
    pub fn new() -> Self {
        let ytdlp_path = which::which("yt-dlp")
            .map_or_else(|_| "yt-dlp".to_string(), |p| p.to_string_lossy().to_string());

        Self {
            ytdlp_path,
            cache_root: None,
        }
    }

    /// Specify custom yt-dlp binary path
    #[must_use]
    pub fn with_ytdlp_path(mut self, path: &str) -> Self {
        self.ytdlp_path = path.to_string();
        self
    }

    /// Refuse output paths outside `root`.
    #[must_use]
    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = Some(root.into());
        self
    }

    /// Absolute output path, checked against the cache root.
    fn resolve_output(&self, output_path: &Path) -> Result<PathBuf> {
        if output_path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(invalid_request(format!(
                "Invalid output path: path traversal detected in {}",
                output_path.display()
            )));
        }

        let resolved = std::path::absolute(output_path).map_err(|e| {
            invalid_request(format!("Invalid output path {}: {e}", output_path.display()))
        })?;

        if let Some(root) = &self.cache_root {
            let root = std::path::absolute(root).map_err(|e| {
                invalid_request(format!("Invalid cache root {}: {e}", root.display()))
            })?;
            if !resolved.starts_with(&root) {
                return Err(invalid_request(format!(
                    "Invalid output path: {} is outside {}",
                    resolved.display(),
                    root.display()
                )));
            }
        }

        Ok(resolved)
    }

    /// Build yt-dlp arguments for one segment download
    fn build_args(request: &DownloadRequest, output: &Path) -> Vec<String> {
        let max_height = request.max_height.unwrap_or(DEFAULT_MAX_HEIGHT);
        vec![
            format!("https://youtube.com/watch?v={}", request.id),
            "--download-sections".to_string(),
            format!("*0-{}", request.segment_duration),
            "-f".to_string(),
            format!("best[height<={max_height}]"),
            "-o".to_string(),
            output.to_string_lossy().to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--quiet".to_string(),
            // Strip audio
            "--postprocessor-args".to_string(),
            "ffmpeg:-an".to_string(),
        ]
    }

    async fn run(&self, args: &[String]) -> Result<()> {
        debug!("{} {:?}", self.ytdlp_path, args);

        let output = Command::new(&self.ytdlp_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                BackendError::connection_with(
                    format!("Failed to execute yt-dlp: {e}. Ensure yt-dlp is installed and in PATH."),
                    e,
                )
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = match stderr.trim() {
            "" => format!("yt-dlp exited with {}", output.status),
            text => text.to_string(),
        };
        warn!("yt-dlp failed: {}", message);

        if is_transient_message(&message) {
            Err(BackendError::server_with_code(message, "network_error"))
        } else {
            Err(BackendError::server(message))
        }
    }
}

#[async_trait]
impl FastPathDownloader for YtDlpDownloader {
    async fn download(&self, request: &DownloadRequest) -> Result<PathBuf> {
        if !validate_video_id(&request.id) {
            return Err(invalid_request(format!(
                "Invalid video ID format: \"{}\". Must be 11 characters (alphanumeric, dashes, underscores).",
                request.id
            )));
        }

        let output = self.resolve_output(&request.output_path)?;
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                BackendError::server(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }

        info!(
            "yt-dlp: {} ({}s) -> {}",
            request.id,
            request.segment_duration,
            output.display()
        );
        self.run(&Self::build_args(request, &output)).await?;

        match tokio::fs::try_exists(&output).await {
            Ok(true) => Ok(output),
            _ => Err(BackendError::server(format!(
                "Download completed but file not found at {}",
                output.display()
            ))),
        }
    }
}

fn invalid_request(message: String) -> BackendError {
    BackendError::server_with_code(message, "invalid_request")
}
