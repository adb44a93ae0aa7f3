//! Stage system errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or invoking a pipeline stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// YAML parsing of a stage definition failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error while invoking a stage.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A stage definition is missing a field its kind requires.
    #[error("invalid stage definition: {0}")]
    Definition(String),

    /// No adapter factory is registered for the definition's kind.
    #[error("unknown stage kind: {0}")]
    UnknownKind(String),

    /// The entry point rejected the argument list. Callers may retry with a
    /// shorter one.
    #[error("entry point rejected the argument list")]
    BadArity,

    /// The stage ran but reported a failure (or produced unusable output).
    #[error("stage invocation failed: {0}")]
    Invoke(String),

    /// No vendor root yielded a usable stage.
    #[error("could not load '{logical_name}' from any vendor root (tried: {attempted:?}); last error: {last}")]
    LoadFailed {
        logical_name: String,
        attempted: Vec<PathBuf>,
        last: String,
    },
}
