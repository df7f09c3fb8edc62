use async_trait::async_trait;
use insight_code_chunker::{ChunkMetadata, ChunkType, CodeChunk};
use insight_protocol::{FileOutcome, FileTask, WireChunk};
use insight_worker::{BridgeError, FileProcessor, WorkerBridge};
use std::sync::Arc;

/// Turns an archived script into chunks
#[async_trait]
pub trait ScriptProcessor: Send + Sync {
    async fn process(&self, task: FileTask) -> Result<FileOutcome, BridgeError>;
}

/// Out of process, through the worker bridge
#[async_trait]
impl ScriptProcessor for WorkerBridge {
    async fn process(&self, task: FileTask) -> Result<FileOutcome, BridgeError> {
        WorkerBridge::process(self, task).await
    }
}

/// In this process, on the blocking pool. For trusted input and tests.
pub struct InProcessProcessor {
    processor: Arc<FileProcessor>,
}

impl InProcessProcessor {
    pub fn new(processor: FileProcessor) -> Self {
        Self {
            processor: Arc::new(processor),
        }
    }
}

#[async_trait]
impl ScriptProcessor for InProcessProcessor {
    async fn process(&self, task: FileTask) -> Result<FileOutcome, BridgeError> {
        let processor = self.processor.clone();
        let url = task.url.clone();
        let outcome = tokio::task::spawn_blocking(move || processor.process(&task))
            .await
            .map_err(|e| BridgeError::Resource {
                url: url.clone(),
                message: e.to_string(),
            })?;
        match outcome.error {
            Some(message) => Err(BridgeError::Resource { url, message }),
            None => Ok(outcome),
        }
    }
}

/// Rebuild a chunk from its wire form
pub fn chunk_from_wire(file_path: &str, wire: WireChunk) -> CodeChunk {
    let chunk_type = wire
        .kind
        .as_deref()
        .and_then(ChunkType::parse)
        .unwrap_or(ChunkType::Window);
    let mut metadata = ChunkMetadata::default()
        .chunk_type(chunk_type)
        .estimated_tokens(ChunkMetadata::estimate_tokens_from_content(&wire.content));
    if let Some(symbol) = wire.symbol {
        metadata = metadata.symbol_name(symbol);
    }

    let chunk = CodeChunk::new(
        file_path.to_string(),
        wire.line_start,
        wire.line_end,
        wire.content,
        metadata,
    );
    match (wire.char_start, wire.char_end) {
        (Some(start), Some(end)) => chunk.with_char_range(start, end),
        _ => chunk,
    }
}
