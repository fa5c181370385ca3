//! Error types for the tier board library.
//!
//! Only malformed input (`ImportError`) is meant to reach the user. Storage
//! and collaborator failures are normally logged and absorbed at the call
//! site; the variants exist for the raw APIs that surface them.

use thiserror::Error;

/// Rejected import document. The board is never touched when this is returned.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document is not a JSON object")]
    NotAnObject,

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` has the wrong type (expected {expected})")]
    WrongType {
        field: String,
        expected: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage lock poisoned")]
    Poisoned,
}

/// Top-level error for library operations.
#[derive(Debug, Error)]
pub enum TierError {
    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TierError>;
