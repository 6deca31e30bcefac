// File: src/error.rs
use std::path::PathBuf;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised at the I/O seams of the matcher.
///
/// Inside the search nothing is fatal: lookups that fail degrade to
/// "unreachable" and sources that fail degrade to "no results".
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("binary serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// A structural, relation or candidate source could not answer.
    #[error("source error: {0}")]
    Source(String),

    /// A tree file is indexed but absent from the serialization directory.
    #[error("no shortest-path tree at {}", .0.display())]
    MissingTree(PathBuf),
}

impl Error {
    /// Create a source error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Error::Source(msg.into())
    }
}
