use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorStoreError>;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Index error: {0}")]
    IndexError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Unsupported index schema_version {found} (expected {expected})")]
    UnsupportedSchema { found: u32, expected: u32 },
}

/// Failures from an embedding provider
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("Embedding request failed: {0}")]
    Transport(String),

    #[error("Embedding provider returned {status}: {body}")]
    Status { status: u16, body: String },

    /// HTTP 413; the batch has to be split
    #[error("Embedding payload too large ({texts} texts)")]
    PayloadTooLarge { texts: usize },

    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("Embedding provider misconfigured: {0}")]
    Config(String),
}

impl EmbedError {
    /// Network failures, rate limits and server errors are worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::PayloadTooLarge { .. } | Self::InvalidResponse(_) | Self::Config(_) => false,
        }
    }
}

/// Failure to index one fingerprint; nothing was written for it
#[derive(Error, Debug)]
pub enum WriterError {
    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Store(#[from] VectorStoreError),

    #[error("Embedding task failed: {0}")]
    Task(String),
}

impl WriterError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Embed(e) if e.is_transient())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(EmbedError::Transport("reset".into()).is_transient());
        assert!(EmbedError::Status { status: 429, body: String::new() }.is_transient());
        assert!(EmbedError::Status { status: 503, body: String::new() }.is_transient());
        assert!(!EmbedError::Status { status: 401, body: String::new() }.is_transient());
        assert!(!EmbedError::PayloadTooLarge { texts: 32 }.is_transient());
        assert!(WriterError::from(EmbedError::Transport("x".into())).is_transient());
        assert!(!WriterError::Task("join".into()).is_transient());
    }
}
