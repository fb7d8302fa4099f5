use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the analyzer, vocabulary, scoring and index layers.
///
/// An empty token sequence or an empty vector is not an error: callers check
/// `is_empty()` and treat it as "no signal".
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown analyzer stage key, vocabulary id or token.
    #[error("lookup failed: {0}")]
    Lookup(String),

    /// Input that cannot be interpreted, e.g. an unbalanced signature string
    /// or vectors over different feature spaces.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A single document could not be fetched from its source.
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// Missing, corrupt, relocated or mismatched artifact.
    #[error("persistence failure at {}: {reason}", path.display())]
    Persistence { path: PathBuf, reason: String },

    /// Operation not allowed in the current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn persistence(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Persistence { path: path.into(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
