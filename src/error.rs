//! Error taxonomy shared by the store, resolver and service layers.

use thiserror::Error;

/// Result alias for operations that can fail with an [`EventError`].
pub type Result<T> = std::result::Result<T, EventError>;

/// Errors surfaced to callers of the event service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventError {
    /// Malformed or missing input. Nothing was persisted.
    #[error("validation error: {0}")]
    Validation(String),

    /// Lookup miss on an id-based read.
    #[error("not found: {0}")]
    NotFound(String),

    /// Persistence layer unavailable or query failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl EventError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Short machine-readable kind, used for metric labels and JSON bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<rusqlite::Error> for EventError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Reasons a ranking engine call did not produce a usable response.
///
/// Never leaves the ranking client: every variant is converted into the
/// unscored fallback list.
#[derive(Error, Debug)]
pub enum RankingError {
    #[error("ranking engine disabled")]
    Disabled,

    #[error("ranking engine transport error: {0}")]
    Transport(String),

    #[error("ranking engine timed out after {0} ms")]
    Timeout(u64),

    #[error("ranking engine returned status {0}")]
    Status(u16),

    #[error("ranking engine returned malformed body: {0}")]
    Malformed(String),
}

impl RankingError {
    /// Label used on `ranking_fallback_total`.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Transport(_) => "transport",
            Self::Timeout(_) => "timeout",
            Self::Status(_) => "status",
            Self::Malformed(_) => "malformed",
        }
    }
}
