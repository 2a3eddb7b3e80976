//! Error taxonomy shared by the client, registry, retry policy and router.
//!
//! Every failure in the crate is a [`BackendError`]. Transport failures are
//! converted in exactly one place (`client::classify_transport_error`), so
//! the variant a caller sees is stable regardless of which backend failed.

use std::sync::LazyLock;
use std::time::Duration;

use regex::RegexSet;
use thiserror::Error;

/// Backend error codes that are worth retrying.
pub const RETRYABLE_CODES: &[&str] = &["service_unavailable", "rate_limited", "network_error"];

/// Backend error codes that will fail again no matter how often they are retried.
pub const PERMANENT_CODES: &[&str] = &[
    "quota_exceeded",
    "invalid_credentials",
    "api_key_invalid",
    "invalid_request",
];

/// Discriminant of a [`BackendError`], for callers that only need the class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Connection,
    Timeout,
    Server,
    Provider,
    CircuitOpen,
}

/// Errors raised while configuring, connecting to, or calling backends.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Missing, unreadable or structurally invalid configuration.
    #[error("{0}")]
    Configuration(String),

    /// The backend process could not be spawned or the handshake failed.
    #[error("{message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The handshake or a round trip exceeded its deadline.
    #[error("{0}")]
    Timeout(String),

    /// The backend answered but signalled a failure.
    #[error("{message}")]
    Server { message: String, code: Option<String> },

    /// Registry-level failure: unknown/disabled backend or every backend failed.
    #[error("{message}")]
    Provider {
        message: String,
        backend_id: Option<String>,
    },

    /// A retry policy refused to run the operation.
    #[error("circuit breaker open due to consecutive failures; try again in {}s", remaining.as_secs().max(1))]
    CircuitOpen { remaining: Duration },
}

pub type Result<T> = std::result::Result<T, BackendError>;

impl BackendError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn connection_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
            code: None,
        }
    }

    pub fn server_with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
            code: Some(code.into()),
        }
    }

    pub fn provider(message: impl Into<String>, backend_id: Option<&str>) -> Self {
        Self::Provider {
            message: message.into(),
            backend_id: backend_id.map(str::to_string),
        }
    }

    /// The variant class of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Server { .. } => ErrorKind::Server,
            Self::Provider { .. } => ErrorKind::Provider,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
        }
    }

    /// Backend id attached to a [`BackendError::Provider`], if any.
    #[must_use]
    pub fn backend_id(&self) -> Option<&str> {
        match self {
            Self::Provider { backend_id, .. } => backend_id.as_deref(),
            _ => None,
        }
    }

    /// Server-supplied error code attached to a [`BackendError::Server`], if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Server { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Whether running the same operation again has a chance of succeeding.
    ///
    /// Timeouts are always transient. Server errors are judged by their code
    /// first (HTTP-like statuses or the named codes above) and by their text
    /// when no code was supplied. Configuration problems never are.
    ///
    /// An open circuit is not retryable here. Its message still matches the
    /// transient patterns, so [`is_transient_message`] reports it as worth
    /// trying again after the cooldown.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Configuration(_) | Self::CircuitOpen { .. } => false,
            Self::Timeout(_) => true,
            Self::Server {
                code: Some(code), ..
            } => code_is_retryable(code).unwrap_or_else(|| is_transient_message(&self.to_string())),
            Self::Connection { .. } | Self::Server { code: None, .. } | Self::Provider { .. } => {
                is_transient_message(&self.to_string())
            }
        }
    }
}

/// Classify a backend error code. `None` means the code says nothing either way.
fn code_is_retryable(code: &str) -> Option<bool> {
    if let Ok(status) = code.trim().parse::<u16>() {
        return match status {
            429 | 500..=599 => Some(true),
            400..=499 => Some(false),
            _ => None,
        };
    }
    let normalized = code.trim().to_ascii_lowercase();
    if RETRYABLE_CODES.contains(&normalized.as_str()) {
        Some(true)
    } else if PERMANENT_CODES.contains(&normalized.as_str()) {
        Some(false)
    } else {
        None
    }
}

static PERMANENT_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)not found",
        r"\b404\b",
        r"(?i)video unavailable",
        r"(?i)invalid.*url",
        r"(?i)invalid video id",
        r"(?i)no space left",
        r"(?i)private video",
        r"(?i)deleted video",
        r"(?i)unsupported",
        r"(?i)quota",
        r"(?i)invalid (api key|credential)",
    ])
    .unwrap()
});

static TRANSIENT_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)time(d)? ?out",
        r"(?i)etimedout",
        r"(?i)connection (refused|reset|closed)",
        r"(?i)econn(refused|reset)",
        r"(?i)closed the connection",
        r"(?i)broken pipe",
        r"(?i)not running",
        r"(?i)network",
        r"(?i)service unavailable",
        r"(?i)rate limit",
        r"(?i)circuit breaker open",
        r"\b(429|502|503|504)\b",
    ])
    .unwrap()
});

/// Infer retryability from free-form error text.
///
/// Permanent patterns ("not found", 404, unavailable or private videos, ...)
/// take precedence over transient ones (timeouts, refused connections,
/// 429/503, ...). Text matching neither is treated as permanent.
#[must_use]
pub fn is_transient_message(text: &str) -> bool {
    if PERMANENT_PATTERNS.is_match(text) {
        return false;
    }
    TRANSIENT_PATTERNS.is_match(text)
}
