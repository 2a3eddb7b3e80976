//! Backend registry with priority-ordered fallback.
//!
//! The registry owns the loaded [`BackendsConfig`] and a cache of
//! [`BackendClient`]s keyed by backend id. Multi-backend operations walk
//! the enabled backends in ascending priority, strictly one at a time, and
//! stop at the first backend that delivers.
//!
//! Every operation that connects a client also disconnects it before
//! returning, whichever way it returns.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::transport::{Connector, StdioConnector};
use crate::client::{BackendClient, ClientOptions, ItemDetails, SearchResult};
use crate::config::{BackendConfig, BackendsConfig};
use crate::error::{BackendError, Result};

/// Registry of configured backends and their cached clients.
pub struct BackendRegistry {
    config_path: PathBuf,
    config: RwLock<BackendsConfig>,
    clients: Mutex<HashMap<String, Arc<BackendClient>>>,
    connector: Arc<dyn Connector>,
    options: ClientOptions,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("config_path", &self.config_path)
            .field("backends", &self.get_config().providers.len())
            .field("cached", &self.cached_count())
            .finish_non_exhaustive()
    }
}

impl BackendRegistry {
    /// Load the registry from a config file. An empty path yields a registry
    /// with no backends.
    pub fn new(config_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_connector(config_path, Arc::new(StdioConnector), ClientOptions::default())
    }

    /// Like [`new`](Self::new), with a custom transport factory and deadlines
    /// for every client the registry creates.
    pub fn with_connector(
        config_path: impl AsRef<Path>,
        connector: Arc<dyn Connector>,
        options: ClientOptions,
    ) -> Result<Self> {
        let config_path = config_path.as_ref().to_path_buf();
        let config = if config_path.as_os_str().is_empty() {
            BackendsConfig::default()
        } else {
            BackendsConfig::load(&config_path)?
        };
        debug!(
            "loaded {} backend(s) from {}",
            config.providers.len(),
            config_path.display()
        );

        Ok(Self {
            config_path,
            config: RwLock::new(config),
            clients: Mutex::new(HashMap::new()),
            connector,
            options,
        })
    }

    /// Path the configuration was loaded from (empty for an empty registry).
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Snapshot of the current configuration.
    pub fn get_config(&self) -> BackendsConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Validate `value` and replace the whole configuration with it.
    ///
    /// On error the previous configuration stays in place. Cached clients are
    /// kept; lookups still consult the new configuration first.
    pub fn load_config(&self, value: &Value) -> Result<()> {
        let config = BackendsConfig::from_value(value)?;
        self.replace_config(config);
        Ok(())
    }

    /// Re-read a configuration file and replace the whole configuration.
    pub fn load_config_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let config = BackendsConfig::load(path.as_ref())?;
        self.replace_config(config);
        Ok(())
    }

    fn replace_config(&self, config: BackendsConfig) {
        info!("backend configuration replaced ({} backends)", config.providers.len());
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// Enabled backends in fallback order.
    pub fn enabled_backends(&self) -> Vec<BackendConfig> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .enabled_in_priority_order()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Client for `id`, created and cached on first use.
    pub fn get_backend(&self, id: &str) -> Result<Arc<BackendClient>> {
        let config = self
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .find(id)
            .cloned()
            .ok_or_else(|| BackendError::provider(format!("Provider not found: {id}"), Some(id)))?;

        if !config.enabled {
            return Err(BackendError::provider(
                format!("Provider is disabled: {id}"),
                Some(id),
            ));
        }

        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(id) {
            return Ok(Arc::clone(client));
        }

        let client = Arc::new(BackendClient::with_connector(
            config,
            Arc::clone(&self.connector),
            self.options,
        )?);
        clients.insert(id.to_string(), Arc::clone(&client));
        debug!("created client for {}", id);
        Ok(client)
    }

    /// Number of cached clients.
    pub fn cached_count(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Search enabled backends in priority order; the first non-empty answer
    /// wins. Failures are logged and skipped, so this never errors: when no
    /// backend has anything the result is empty.
    pub async fn search_all(&self, query: &str, max_duration: Option<f64>) -> Vec<SearchResult> {
        for config in self.enabled_backends() {
            let id = config.id;
            let client = match self.get_backend(&id) {
                Ok(client) => client,
                Err(e) => {
                    warn!("Search failed for provider {}: {}", id, e);
                    continue;
                }
            };

            let outcome = scoped(client, |client| async move {
                client.search(query, max_duration).await
            })
            .await;

            match outcome {
                Ok(results) if !results.is_empty() => {
                    info!("Found {} results from {}", results.len(), id);
                    return stamp_backend(results, &id);
                }
                Ok(_) => debug!("No results from {}", id),
                Err(e) => warn!("Search failed for provider {}: {}", id, e),
            }
        }

        Vec::new()
    }

    /// Download `id`, either from one named backend or from the first enabled
    /// backend that succeeds.
    ///
    /// With `backend_id` there is no fallback: any failure is returned as
    /// [`BackendError::Provider`] naming that backend.
    pub async fn download_from_any(
        &self,
        id: &str,
        backend_id: Option<&str>,
        output_path: Option<&Path>,
        segment_duration: Option<f64>,
    ) -> Result<PathBuf> {
        let download = |client: Arc<BackendClient>| async move {
            client.download(id, output_path, segment_duration).await
        };

        if let Some(backend_id) = backend_id {
            let result = match self.get_backend(backend_id) {
                Ok(client) => scoped(client, download).await,
                Err(e) => Err(e),
            };
            return result.map_err(|e| {
                BackendError::provider(
                    format!("Failed to download from provider {backend_id}: {e}"),
                    Some(backend_id),
                )
            });
        }

        let backends = self.enabled_backends();
        if backends.is_empty() {
            return Err(BackendError::provider("No enabled providers available", None));
        }

        let mut failures = Vec::with_capacity(backends.len());
        for config in backends {
            let result = match self.get_backend(&config.id) {
                Ok(client) => scoped(client, download).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(path) => {
                    info!("Downloaded {} from {}", id, config.id);
                    return Ok(path);
                }
                Err(e) => {
                    warn!("Download failed from provider {}: {}", config.id, e);
                    failures.push(format!("{}: {e}", config.id));
                }
            }
        }

        Err(BackendError::provider(
            format!(
                "All providers failed to download video: {}",
                failures.join(", ")
            ),
            None,
        ))
    }

    /// Fetch details for `id` from one named backend.
    pub async fn get_details(&self, backend_id: &str, id: &str) -> Result<ItemDetails> {
        let result = match self.get_backend(backend_id) {
            Ok(client) => scoped(client, |client| async move { client.get_details(id).await }).await,
            Err(e) => Err(e),
        };
        result.map_err(|e| {
            BackendError::provider(
                format!("Failed to get details from provider {backend_id}: {e}"),
                Some(backend_id),
            )
        })
    }

    /// Forget every cached client.
    ///
    /// Clients are dropped, not disconnected. A client that is still
    /// connected (because another task is mid-operation) keeps its backend
    /// process running until that process exits on its own.
    pub fn clear_cache(&self) {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        debug!("clearing {} cached client(s)", clients.len());
        clients.clear();
    }
}

/// Connect, run `op`, then disconnect no matter how `op` ended.
async fn scoped<T, F, Fut>(client: Arc<BackendClient>, op: F) -> Result<T>
where
    F: FnOnce(Arc<BackendClient>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let outcome = match client.connect().await {
        Ok(()) => op(Arc::clone(&client)).await,
        Err(e) => Err(e),
    };
    client.disconnect().await;
    outcome
}

fn stamp_backend(mut results: Vec<SearchResult>, backend_id: &str) -> Vec<SearchResult> {
    for result in &mut results {
        if result.backend_id.as_deref().map_or(true, str::is_empty) {
            result.backend_id = Some(backend_id.to_string());
        }
    }
    results
}
