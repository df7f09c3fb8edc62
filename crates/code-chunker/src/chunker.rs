use crate::ast_analyzer::{AstAnalyzer, Declaration, ParserPool};
use crate::config::ChunkerConfig;
use crate::error::{ChunkerError, Result};
use crate::language::Language;
use crate::strategy::{ChunkMode, TextLayout};
use crate::types::{ChunkMetadata, ChunkType, CodeChunk};
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Main chunker interface for processing code
///
/// Holds one parser per grammar, created on first use. A `Chunker` is `Sync`
/// and meant to be shared; parses on the same grammar are serialized.
pub struct Chunker {
    config: ChunkerConfig,
    parsers: ParserPool,
    parse_attempts: AtomicUsize,
    parse_fallbacks: AtomicUsize,
    size_gated: AtomicUsize,
}

/// A slice of the text before it becomes a [`CodeChunk`]
#[derive(Debug, Clone)]
struct Piece {
    range: Range<usize>,
    lines: (usize, usize),
    chunk_type: ChunkType,
    symbol_name: Option<String>,
    part: Option<usize>,
}

impl Chunker {
    /// Create a new chunker with configuration
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate().map_err(ChunkerError::invalid_config)?;
        Ok(Self {
            config,
            parsers: ParserPool::default(),
            parse_attempts: AtomicUsize::new(0),
            parse_fallbacks: AtomicUsize::new(0),
            size_gated: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk a script. Never fails: unusable parses degrade to window chunking.
    pub fn chunk(&self, text: &str, file_path: &str) -> Vec<CodeChunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let layout = TextLayout::new(text, &self.config);
        let whole = 0..text.len();

        if text.len() > self.config.max_parse_bytes {
            self.size_gated.fetch_add(1, Ordering::Relaxed);
            log::debug!(
                "{file_path}: {} bytes exceeds parse limit, using windows",
                text.len()
            );
            let pieces = self.window_pieces(&layout, whole, ChunkType::Window);
            return self.emit(&layout, file_path, pieces);
        }

        let language = Language::from_path(file_path);
        let analyzer = AstAnalyzer::new(&self.parsers, &self.parse_attempts);
        let pieces = match analyzer.declarations(text, language) {
            Some(declarations) if !declarations.is_empty() => {
                self.assemble(&layout, declarations)
            }
            Some(_) => {
                log::debug!("{file_path}: no named constructs, using windows");
                self.window_pieces(&layout, whole, ChunkType::Window)
            }
            None => {
                self.parse_fallbacks.fetch_add(1, Ordering::Relaxed);
                log::debug!("{file_path}: parse rejected, using windows");
                self.window_pieces(&layout, whole, ChunkType::Window)
            }
        };

        self.emit(&layout, file_path, pieces)
    }

    /// Window chunking without parsing, as used for oversized inputs
    pub fn chunk_windows(&self, text: &str, file_path: &str) -> Vec<CodeChunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let layout = TextLayout::new(text, &self.config);
        let pieces = self.window_pieces(&layout, 0..text.len(), ChunkType::Window);
        self.emit(&layout, file_path, pieces)
    }

    /// Chunk code from a file; invalid UTF-8 is replaced rather than rejected
    pub fn chunk_file(&self, path: impl AsRef<Path>) -> Result<Vec<CodeChunk>> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let content = String::from_utf8_lossy(&bytes);
        Ok(self.chunk(&content, &path.to_string_lossy()))
    }

    /// Counters accumulated since this chunker was created
    pub fn counters(&self) -> ChunkerCounters {
        ChunkerCounters {
            parse_attempts: self.parse_attempts.load(Ordering::Relaxed),
            parse_fallbacks: self.parse_fallbacks.load(Ordering::Relaxed),
            size_gated: self.size_gated.load(Ordering::Relaxed),
        }
    }

    /// Declarations plus gap pieces covering everything else
    fn assemble(&self, layout: &TextLayout<'_>, declarations: Vec<Declaration>) -> Vec<Piece> {
        let text = layout.text();
        let mut spans = merge_spans(layout, declarations);
        let mut gaps = Vec::new();
        let mut covered_to = 0;

        for i in 0..spans.len() {
            let gap = layout.trimmed(covered_to..spans[i].range.start);
            covered_to = spans[i].range.end;
            if gap.is_empty() {
                continue;
            }
            if gap.len() <= self.config.min_gap_chars {
                let start = self.snap(layout, gap).start;
                spans[i].range.start = spans[i].range.start.min(start);
            } else {
                gaps.extend(self.window_pieces(layout, self.snap(layout, gap), ChunkType::Gap));
            }
        }

        let tail = layout.trimmed(covered_to..text.len());
        if !tail.is_empty() {
            if tail.len() <= self.config.min_gap_chars {
                if let Some(last) = spans.last_mut() {
                    last.range.end = last.range.end.max(self.snap(layout, tail).end);
                }
            } else {
                gaps.extend(self.window_pieces(layout, self.snap(layout, tail), ChunkType::Gap));
            }
        }

        let mut pieces: Vec<Piece> = spans
            .into_iter()
            .map(|mut piece| {
                piece.lines = layout.lines_of(&piece.range);
                piece
            })
            .collect();
        pieces.extend(gaps);
        pieces
    }

    fn snap(&self, layout: &TextLayout<'_>, range: Range<usize>) -> Range<usize> {
        match layout.mode {
            ChunkMode::Lines => layout.snap_to_lines(range),
            ChunkMode::Minified => range,
        }
    }

    fn window_pieces(
        &self,
        layout: &TextLayout<'_>,
        range: Range<usize>,
        chunk_type: ChunkType,
    ) -> Vec<Piece> {
        layout
            .windows(range)
            .into_iter()
            .map(|range| Piece {
                lines: layout.lines_of(&range),
                range,
                chunk_type,
                symbol_name: None,
                part: None,
            })
            .collect()
    }

    /// Split oversized pieces, drop blank ones, order by position
    fn emit(&self, layout: &TextLayout<'_>, file_path: &str, pieces: Vec<Piece>) -> Vec<CodeChunk> {
        let text = layout.text();
        let mut split = Vec::with_capacity(pieces.len());
        for piece in pieces {
            if piece.range.len() <= layout.split_limit {
                split.push(piece);
                continue;
            }
            let windows = layout.char_windows(piece.range.clone(), layout.split_limit);
            split.extend(windows.into_iter().enumerate().map(|(part, range)| Piece {
                range,
                part: Some(part),
                ..piece.clone()
            }));
        }

        split.retain(|piece| !text[piece.range.clone()].trim().is_empty());
        split.sort_by_key(|piece| (piece.range.start, piece.range.end));

        let language = Language::from_path(file_path).as_str();
        split
            .into_iter()
            .map(|piece| {
                let content = text[piece.range.clone()].to_string();
                let mut metadata = ChunkMetadata::with_language(language)
                    .chunk_type(piece.chunk_type)
                    .estimated_tokens(ChunkMetadata::estimate_tokens_from_content(&content));
                metadata.symbol_name = piece.symbol_name;
                metadata.part = piece.part;

                let chunk = CodeChunk::new(
                    file_path.to_string(),
                    piece.lines.0,
                    piece.lines.1,
                    content,
                    metadata,
                );
                if layout.mode == ChunkMode::Minified || piece.part.is_some() {
                    chunk.with_char_range(piece.range.start, piece.range.end)
                } else {
                    chunk
                }
            })
            .collect()
    }

    /// Get statistics about chunks
    pub fn get_stats(chunks: &[CodeChunk]) -> ChunkingStats {
        let tokens = || chunks.iter().map(CodeChunk::estimated_tokens);
        ChunkingStats {
            total_chunks: chunks.len(),
            declaration_chunks: chunks
                .iter()
                .filter(|c| c.metadata.chunk_type.is_declaration())
                .count(),
            total_lines: chunks.iter().map(CodeChunk::line_count).sum(),
            total_tokens: tokens().sum(),
            min_tokens: tokens().min().unwrap_or(0),
            max_tokens: tokens().max().unwrap_or(0),
        }
    }
}

/// Turn declarations into disjoint spans; in line mode spans cover whole lines
/// and declarations sharing a line are merged into the first one.
fn merge_spans(layout: &TextLayout<'_>, declarations: Vec<Declaration>) -> Vec<Piece> {
    let mut spans: Vec<Piece> = Vec::with_capacity(declarations.len());
    for declaration in declarations {
        let raw = declaration.start_byte..declaration.end_byte;
        let range = match layout.mode {
            ChunkMode::Lines => layout.snap_to_lines(raw),
            ChunkMode::Minified => raw,
        };
        if let Some(prev) = spans.last_mut() {
            if range.start < prev.range.end {
                prev.range.end = prev.range.end.max(range.end);
                continue;
            }
        }
        spans.push(Piece {
            range,
            lines: (0, 0),
            chunk_type: declaration.chunk_type,
            symbol_name: declaration.symbol_name,
            part: None,
        });
    }
    spans
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            config: ChunkerConfig::default(),
            parsers: ParserPool::default(),
            parse_attempts: AtomicUsize::new(0),
            parse_fallbacks: AtomicUsize::new(0),
            size_gated: AtomicUsize::new(0),
        }
    }
}

/// Running totals for a [`Chunker`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkerCounters {
    /// Calls into the tree-sitter parser
    pub parse_attempts: usize,
    /// Inputs whose parse was rejected
    pub parse_fallbacks: usize,
    /// Inputs above the size gate
    pub size_gated: usize,
}

/// Statistics about a chunking run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkingStats {
    pub total_chunks: usize,
    pub declaration_chunks: usize,
    pub total_lines: usize,
    pub total_tokens: usize,
    pub min_tokens: usize,
    pub max_tokens: usize,
}

impl std::fmt::Display for ChunkingStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} chunks ({} declarations), {} lines, {} tokens (min {}, max {})",
            self.total_chunks,
            self.declaration_chunks,
            self.total_lines,
            self.total_tokens,
            self.min_tokens,
            self.max_tokens
        )
    }
}
