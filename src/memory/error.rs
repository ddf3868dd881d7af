use thiserror::Error;

/// Errors surfaced by the memory search engine.
///
/// Per-chunk embedding failures never reach callers of `search`; they are
/// absorbed during sync and reported through [`super::SyncReport`].
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Invalid engine configuration. Only raised at construction time.
    #[error("invalid memory configuration: {field}: {message}")]
    Configuration { field: String, message: String },

    /// The embedding provider failed, timed out, or returned a malformed batch.
    #[error("embedding provider error: {0}")]
    Provider(String),

    /// The document source could not be enumerated or read.
    #[error("failed to read memory corpus: {0}")]
    CorpusRead(String),

    /// The manager has been closed.
    #[error("memory index manager is closed")]
    Closed,

    /// SQLite failure in the persisted index.
    #[error("memory store error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A background task panicked or was cancelled by the runtime.
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl MemoryError {
    pub fn configuration(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn provider(msg: impl std::fmt::Display) -> Self {
        Self::Provider(msg.to_string())
    }

    pub fn corpus_read(msg: impl std::fmt::Display) -> Self {
        Self::CorpusRead(msg.to_string())
    }

    /// `true` for errors that leave the current generation authoritative and
    /// may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::CorpusRead(_) | Self::Io(_) | Self::Storage(_)
        )
    }
}

/// Result type for memory operations.
pub type Result<T> = std::result::Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_names_field() {
        let err = MemoryError::configuration("chunking.overlap", "must be smaller than tokens");
        assert_eq!(
            err.to_string(),
            "invalid memory configuration: chunking.overlap: must be smaller than tokens"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn closed_is_not_retryable() {
        assert!(!MemoryError::Closed.is_retryable());
        assert!(MemoryError::corpus_read("permission denied").is_retryable());
    }
}
