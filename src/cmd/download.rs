use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};

use vidbridge::{BackendRegistry, DownloadRequest, DownloadRouter, YtDlpDownloader};

pub struct DownloadOptions {
    pub backend: Option<String>,
    pub output: Option<PathBuf>,
    pub segment: f64,
    pub max_height: Option<u32>,
    pub cache_root: Option<PathBuf>,
    pub json: bool,
}

pub async fn cmd_download(config_path: &Path, id: &str, options: DownloadOptions) -> Result<()> {
    let registry = Arc::new(BackendRegistry::new(config_path)?);

    let mut fast_path = YtDlpDownloader::new();
    if let Some(root) = options.cache_root {
        fast_path = fast_path.with_cache_root(root);
    }
    let router = DownloadRouter::new(registry).with_fast_path(Arc::new(fast_path));

    let output = options
        .output
        .unwrap_or_else(|| PathBuf::from(format!("{}.mp4", file_stem(id))));
    let mut request = DownloadRequest::new(id, output, options.segment);
    if let Some(backend) = options.backend {
        if !router.supports(&backend) {
            bail!(
                "Unknown or disabled backend: {backend}. Available: {}",
                router.supported_backends().join(", ")
            );
        }
        request = request.with_backend(backend);
    }
    if let Some(height) = options.max_height {
        request = request.with_max_height(height);
    }

    eprintln!("⬇️  {} via {}", request.id, request.target());
    let outcome = router.download(&request).await;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else if let Some(path) = &outcome.file_path {
        println!("✅ {}", path.display());
    }

    if !outcome.success {
        let error = outcome.error.as_deref().unwrap_or("unknown error");
        if outcome.retryable == Some(true) {
            bail!("{error} (transient, try again later)");
        }
        bail!("{error}");
    }

    Ok(())
}

/// Item ids can come from any backend; keep only filename-safe characters.
fn file_stem(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
