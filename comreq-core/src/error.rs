use thiserror::Error;

use crate::listener::ListenerId;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },
    #[error("listener {listener} failed for user {user_id}: {reason}")]
    ObserverFailure {
        listener: ListenerId,
        user_id: String,
        reason: String,
    },
}

impl CacheError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parsing error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no configuration directory available on this platform")]
    NoConfigDir,
}
