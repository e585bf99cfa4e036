use std::path::PathBuf;

use thiserror::Error;

use crate::error_codes::{
    ERR_CONFIG_INVALID, ERR_INVALID_NAME, ERR_IO, ERR_NOT_FOUND,
    ERR_PERSISTENCE_FAILED, ERR_UNSAFE_OPERATION, ERR_WATCH_START_FAILED,
};

/// Errors surfaced by the bookmark engine and the operation service.
#[derive(Debug, Error)]
pub enum BookmarkError {
    #[error("invalid name: {0}")]
    Validation(String),

    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("unsafe operation: {0}")]
    UnsafeOperation(String),

    #[error("failed to persist descriptor {}: {message}", path.display())]
    Persistence { path: PathBuf, message: String },

    #[error("failed to watch {}: {message}", path.display())]
    Watch { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl BookmarkError {
    /// Stable code for the host UI to localize.
    pub fn code(&self) -> &'static str {
        match self {
            BookmarkError::Validation(_) => ERR_INVALID_NAME,
            BookmarkError::NotFound(_) => ERR_NOT_FOUND,
            BookmarkError::UnsafeOperation(_) => ERR_UNSAFE_OPERATION,
            BookmarkError::Persistence { .. } | BookmarkError::Serde(_) => ERR_PERSISTENCE_FAILED,
            BookmarkError::Watch { .. } => ERR_WATCH_START_FAILED,
            BookmarkError::Config(_) => ERR_CONFIG_INVALID,
            BookmarkError::Io(_) => ERR_IO,
        }
    }
}

pub type Result<T> = std::result::Result<T, BookmarkError>;
