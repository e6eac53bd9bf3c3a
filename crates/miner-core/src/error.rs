use std::path::PathBuf;

/// Errors that can occur across origin-miner.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary renders it through `miette` at the boundary.
///
/// # Examples
///
/// ```
/// use miner_core::MinerError;
///
/// let err = MinerError::Git("not a repository".into());
/// assert!(err.to_string().contains("not a repository"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum MinerError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Repository access failure (open, walk, diff).
    #[error("git error: {0}")]
    #[diagnostic(help("run origin-miner from inside a git repository, or pass --path"))]
    Git(String),

    /// Commit cache storage failure.
    #[error("cache database error: {0}")]
    #[diagnostic(help("remove the cache file or run `origin-miner cache clear`"))]
    Database(String),

    /// A diff worker failed, panicked, or ran out of time.
    #[error("worker error: {0}")]
    Worker(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}
