use insight_code_chunker::{Chunker, ChunkerConfig, CodeChunk};
use insight_protocol::{FileOutcome, FileTask, SourceChunks, WireChunk};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Restores and chunks one script at a time. Holds no per-request state.
pub struct FileProcessor {
    chunker: Chunker,
}

impl FileProcessor {
    pub fn new(config: ChunkerConfig) -> insight_code_chunker::Result<Self> {
        Ok(Self {
            chunker: Chunker::new(config)?,
        })
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Chunk the original sources recovered from `map`, or the compiled code
    /// itself when there is no map or the map is unusable.
    pub fn restore_and_chunk(&self, code: &str, map: Option<&[u8]>, url: &str) -> Vec<SourceChunks> {
        if let Some(map) = map {
            match insight_source_map::restore(map) {
                Ok(restoration) => {
                    if !restoration.missing().is_empty() {
                        log::debug!(
                            "{url}: {} mapped sources have no inline content",
                            restoration.missing().len()
                        );
                    }
                    return restoration
                        .into_sources()
                        .into_iter()
                        .map(|source| SourceChunks {
                            chunks: self.wire_chunks(&source.content, &source.original_file),
                            original_file: source.original_file,
                            source_map_restored: true,
                        })
                        .collect();
                }
                Err(e) => log::debug!("{url}: chunking compiled code, map unusable: {e}"),
            }
        }

        vec![SourceChunks {
            original_file: url.to_string(),
            source_map_restored: false,
            chunks: self.wire_chunks(code, path_hint(url)),
        }]
    }

    /// Read the archived files named by `task` and process them.
    /// Failures, including panics, are reported against this task only.
    pub fn process(&self, task: &FileTask) -> FileOutcome {
        let code = match std::fs::read(&task.path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                return FileOutcome::failed(&task.url, format!("unreadable file {}: {e}", task.path))
            }
        };

        let map = task.map_path.as_deref().and_then(|path| match std::fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                log::warn!("{}: unreadable source map {path}: {e}", task.url);
                None
            }
        });

        match catch_unwind(AssertUnwindSafe(|| {
            self.restore_and_chunk(&code, map.as_deref(), &task.url)
        })) {
            Ok(results) => FileOutcome {
                url: task.url.clone(),
                error: None,
                results,
            },
            Err(_) => {
                log::error!("{}: worker panicked while processing", task.url);
                FileOutcome::failed(&task.url, "worker panicked while processing file")
            }
        }
    }

    fn wire_chunks(&self, text: &str, path: &str) -> Vec<WireChunk> {
        let chunks = self.chunker.chunk(text, path);
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("{path}: {}", Chunker::get_stats(&chunks));
        }
        chunks.iter().map(wire_chunk).collect()
    }
}

/// URL without query or fragment, so the extension picks the grammar
fn path_hint(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

pub fn wire_chunk(chunk: &CodeChunk) -> WireChunk {
    WireChunk {
        content: chunk.content.clone(),
        line_start: chunk.start_line,
        line_end: chunk.end_line,
        char_start: chunk.char_start,
        char_end: chunk.char_end,
        kind: Some(chunk.metadata.chunk_type.as_str().to_string()),
        symbol: chunk.metadata.symbol_name.clone(),
    }
}
