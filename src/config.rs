//! Backend configuration loaded from `~/.config/vidbridge/backends.json`.
//!
//! ```json
//! {
//!   "providers": [
//!     {
//!       "id": "dvids",
//!       "name": "DVIDS Military Videos",
//!       "command": "python",
//!       "args": ["-m", "mcp_servers.dvids_scraping_server"],
//!       "env": {"PYTHONPATH": "."},
//!       "priority": 1,
//!       "enabled": true
//!     }
//!   ]
//! }
//! ```
//!
//! The file is validated field by field before it is deserialized, so a
//! broken entry is reported by name ("priority required") instead of as a
//! generic serde error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::{BackendError, Result};

/// Launch and ordering settings for a single backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Identifier used for lookup and routing. Expected to be unique.
    pub id: String,
    /// Human-readable backend name, used in log and error messages.
    pub name: String,
    /// Executable spawned for this backend.
    pub command: String,
    /// Arguments passed to `command`, in order.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for the subprocess.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
    /// Fallback position; lower values are tried first. Any JSON number,
    /// kept as written so the config serializes back unchanged.
    pub priority: Number,
    /// Disabled backends are never spawned.
    pub enabled: bool,
}

impl BackendConfig {
    /// Priority as a sortable float.
    pub fn priority_rank(&self) -> f64 {
        self.priority.as_f64().unwrap_or(f64::MAX)
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendsConfig {
    pub providers: Vec<BackendConfig>,
}

impl BackendsConfig {
    /// Validate a loosely typed JSON value and convert it.
    pub fn from_value(value: &Value) -> Result<Self> {
        validate(value)?;
        serde_json::from_value(value.clone())
            .map_err(|e| BackendError::configuration(format!("Invalid configuration: {e}")))
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BackendError::configuration(format!(
                    "Configuration file not found: {}. Create it or pass --config.",
                    path.display()
                ))
            } else {
                BackendError::configuration(format!(
                    "Failed to load configuration from {}: {e}",
                    path.display()
                ))
            }
        })?;

        let value: Value = serde_json::from_str(&content).map_err(|e| {
            BackendError::configuration(format!(
                "Invalid JSON in configuration file: {}. {e}",
                path.display()
            ))
        })?;

        Self::from_value(&value)
    }

    /// Enabled backends sorted by ascending priority.
    ///
    /// The sort is stable, so equal priorities keep their file order.
    pub fn enabled_in_priority_order(&self) -> Vec<&BackendConfig> {
        let mut enabled: Vec<&BackendConfig> =
            self.providers.iter().filter(|p| p.enabled).collect();
        enabled.sort_by(|a, b| a.priority_rank().total_cmp(&b.priority_rank()));
        enabled
    }

    /// Look up a backend by id. With duplicate ids the last entry wins.
    pub fn find(&self, id: &str) -> Option<&BackendConfig> {
        self.providers.iter().rev().find(|p| p.id == id)
    }
}

/// Return the default path of the backends config file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vidbridge")
        .join("backends.json")
}

fn validate(value: &Value) -> Result<()> {
    let Some(root) = value.as_object() else {
        return Err(BackendError::configuration("Configuration must be an object"));
    };

    let Some(providers) = root.get("providers").and_then(Value::as_array) else {
        return Err(BackendError::configuration("providers required"));
    };

    for (index, provider) in providers.iter().enumerate() {
        validate_provider(provider)
            .map_err(|msg| BackendError::configuration(format!("Provider at index {index}: {msg}")))?;
    }

    Ok(())
}

fn validate_provider(provider: &Value) -> std::result::Result<(), String> {
    let Some(entry) = provider.as_object() else {
        return Err("entry must be an object".to_string());
    };

    for field in ["id", "name", "command"] {
        match entry.get(field).and_then(Value::as_str) {
            Some(s) if !s.is_empty() => {}
            _ => return Err(format!("{field} required")),
        }
    }

    match entry.get("args").and_then(Value::as_array) {
        Some(args) if args.iter().all(Value::is_string) => {}
        Some(_) => return Err("args must contain only strings".to_string()),
        None => return Err("args required".to_string()),
    }

    if !entry.get("priority").is_some_and(Value::is_number) {
        return Err("priority required".to_string());
    }

    if !entry.get("enabled").is_some_and(Value::is_boolean) {
        return Err("enabled required".to_string());
    }

    if let Some(env) = entry.get("env") {
        match env.as_object() {
            Some(vars) if vars.values().all(Value::is_string) => {}
            _ => return Err("invalid \"env\" field".to_string()),
        }
    }

    Ok(())
}
