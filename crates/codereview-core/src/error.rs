use std::fmt;
use thiserror::Error;

/// Why the inference capability could not produce an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamKind {
    Network,
    Timeout,
    Auth,
    Quota,
    Status,
}

impl fmt::Display for UpstreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamKind::Network => write!(f, "network"),
            UpstreamKind::Timeout => write!(f, "timeout"),
            UpstreamKind::Auth => write!(f, "auth"),
            UpstreamKind::Quota => write!(f, "quota"),
            UpstreamKind::Status => write!(f, "status"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Upstream error ({kind}): {message}")]
    Upstream { kind: UpstreamKind, message: String },

    #[error("Upstream format error: {0}")]
    UpstreamFormat(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ReviewError {
    pub fn upstream(kind: UpstreamKind, message: impl Into<String>) -> Self {
        ReviewError::Upstream {
            kind,
            message: message.into(),
        }
    }

    /// Stable machine-readable category, used in API bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ReviewError::Validation(_) => "validation",
            ReviewError::Upstream { .. } => "upstream",
            ReviewError::UpstreamFormat(_) => "upstream_format",
            ReviewError::Persistence(_) => "persistence",
            ReviewError::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, ReviewError>;
