//! Launch-command screening.
//!
//! Backends are spawned directly (no shell), but the config file is still
//! treated as untrusted: anything that looks like shell syntax, path
//! traversal or a path-separator trick is refused before a process exists.

use crate::config::BackendConfig;
use crate::error::{BackendError, Result};

const SHELL_METACHARACTERS: &[char] = &[';', '&', '|', '`', '$', '(', ')'];

/// Name of the first suspicious construct found in `value`, if any.
fn suspicious(value: &str) -> Option<&'static str> {
    if value.contains(SHELL_METACHARACTERS) {
        Some("shell metacharacter")
    } else if value.contains("..") {
        Some("directory traversal")
    } else if value.contains("//") {
        Some("double slash")
    } else if value.contains('\\') {
        Some("backslash")
    } else {
        None
    }
}

/// Reject a backend whose command or arguments could be used for injection.
pub fn validate_launch(config: &BackendConfig) -> Result<()> {
    if config.command.trim().is_empty() {
        return Err(BackendError::connection("Command cannot be empty"));
    }

    if let Some(reason) = suspicious(&config.command) {
        return Err(BackendError::connection(format!(
            "Invalid command: contains suspicious characters ({reason}). Command: {}",
            config.command
        )));
    }

    for arg in &config.args {
        if let Some(reason) = suspicious(arg) {
            return Err(BackendError::connection(format!(
                "Invalid argument: contains suspicious characters ({reason}). Arg: {arg}"
            )));
        }
    }

    Ok(())
}
