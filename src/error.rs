//! Unified error type for the search engine.

use thiserror::Error;

/// All errors that can occur across indexing, training, and querying.
///
/// Mirrors spec §7: `Config`, `Store`, `FileRead`, `MalformedIndex`,
/// `InvalidOption`, `Canceled`. `UnknownToken` is deliberately not a variant
/// here — it is not an error, it is represented as an expansion entry with
/// no neighbors (see `expansion::expand`).
#[derive(Error, Debug)]
pub enum Error {
    /// Bad configuration value; fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// DB open/migrate/IO failure; fatal.
    #[error("store error: {0}")]
    Store(String),

    /// Per-file read failure during indexing; logged and skipped, or
    /// surfaced as `warn` on a query result.
    #[error("failed to read {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Corrupt varint/blob; fatal for the affected query.
    #[error("malformed index data: {0} (consider --rebuild)")]
    MalformedIndex(String),

    /// CLI-level argument validation error.
    #[error("{0}")]
    InvalidOption(String),

    /// Cooperative cancellation; caller should treat this as "stopped early,
    /// keep whatever was already committed".
    #[error("operation canceled")]
    Canceled,
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Store(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}
