use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] insight_vector_store::VectorStoreError),

    #[error("Index writer error: {0}")]
    WriterError(#[from] insight_vector_store::WriterError),

    #[error("Worker error: {0}")]
    BridgeError(#[from] insight_worker::BridgeError),

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unsupported ledger schema_version {found} (expected {expected})")]
    UnsupportedLedger { found: u32, expected: u32 },

    #[error("Invalid pipeline config: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Other(String),
}
