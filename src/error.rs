//! Error taxonomy for the ingestion and search core.
//!
//! Three families matter to callers:
//!
//! | Family | Variants | Caller-visible behavior |
//! |--------|----------|-------------------------|
//! | Input validation | [`Error::Validation`] | Rejected before any external call |
//! | Upstream service | [`Error::Embedding`], [`Error::Translation`] | Descriptive message |
//! | Persistence | [`Error::Persistence`] | Generic message; the transaction was rolled back |
//!
//! [`Error::Translation`] never leaves the translator: translation failures
//! degrade to "no translation performed" (see [`crate::translate`]).

use thiserror::Error;

/// Errors produced by the core pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("embedding service error: {0}")]
    Embedding(String),

    #[error("translation service error: {0}")]
    Translation(String),

    /// The underlying cause is kept as the error source for logs; the
    /// message shown to callers stays generic.
    #[error("storage operation failed")]
    Persistence(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("worker pool closed: {0}")]
    WorkerPool(#[from] tokio::sync::AcquireError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Stable error code for outer layers that map errors to status codes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Embedding(_) | Self::Translation(_) => "upstream",
            Self::Persistence(_) => "persistence",
            Self::NotFound(_) => "not_found",
            Self::Serialization(_) | Self::Task(_) | Self::WorkerPool(_) => "internal",
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Embedding(e.to_string())
    }
}
