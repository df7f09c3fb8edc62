//! # Insight Code Chunker
//!
//! AST-aware chunking of browser JavaScript for semantic search.
//!
//! ## Philosophy
//!
//! Retrieval units must stay meaningful and bounded whether the input is a
//! hand-written module or a single-line production bundle:
//! - Draw boundaries at the outermost named construct (functions, classes,
//!   function-valued variables, exported declarations, methods)
//! - Cover everything else with gap chunks so no code is silently dropped
//! - Switch to byte-offset boundaries when the text is minified
//! - Never fail: anything the parser cannot handle is cut into windows
//!
//! ## Architecture
//!
//! ```text
//! Source Text
//!     │
//!     ├──> Size gate (too large → windows, parser never runs)
//!     │
//!     ├──> Mode detection (mean line length → lines | minified)
//!     │
//!     ├──> Tree-sitter parsing
//!     │    ├─> strict pass (grammar from file extension, no errors)
//!     │    └─> lenient script pass (JavaScript, error nodes skipped)
//!     │
//!     ├──> Construct walk → declaration spans
//!     │    └─> gaps folded into neighbours or emitted as gap chunks
//!     │
//!     └──> Oversized chunks split into character windows, sorted by position
//! ```
//!
//! ## Example
//!
//! ```rust
//! use insight_code_chunker::{Chunker, ChunkerConfig};
//!
//! let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
//! let chunks = chunker.chunk("function a(){return 1}\nfunction b(){return 2}", "app.js");
//! assert_eq!(chunks.len(), 2);
//! for chunk in chunks {
//!     println!("Chunk at lines {}-{}: {}",
//!              chunk.start_line, chunk.end_line, chunk.metadata.symbol_name.unwrap_or_default());
//! }
//! ```

mod ast_analyzer;
mod chunker;
mod config;
mod error;
mod language;
mod strategy;
mod types;

pub use chunker::{Chunker, ChunkerCounters, ChunkingStats};
pub use config::{ChunkerConfig, DEFAULT_MAX_PARSE_BYTES};
pub use error::{ChunkerError, Result};
pub use language::Language;
pub use strategy::ChunkMode;
pub use types::{ChunkMetadata, ChunkType, CodeChunk};
