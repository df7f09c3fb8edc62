use serde::{Deserialize, Serialize};

/// A position-tagged slice of source text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeChunk {
    /// File the chunk was cut from (the original file for restored sources)
    pub file_path: String,

    /// Start line (1-indexed)
    pub start_line: usize,

    /// End line (1-indexed, inclusive)
    pub end_line: usize,

    /// Byte offset of the first character, set for minified text and split windows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_start: Option<usize>,

    /// Byte offset one past the last character
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_end: Option<usize>,

    /// The actual code content
    pub content: String,

    /// Rich metadata about this chunk
    pub metadata: ChunkMetadata,
}

impl CodeChunk {
    /// Create a new line-addressed chunk
    #[must_use]
    pub const fn new(
        file_path: String,
        start_line: usize,
        end_line: usize,
        content: String,
        metadata: ChunkMetadata,
    ) -> Self {
        Self {
            file_path,
            start_line,
            end_line,
            char_start: None,
            char_end: None,
            content,
            metadata,
        }
    }

    /// Builder: attach a byte range
    #[must_use]
    pub const fn with_char_range(mut self, start: usize, end: usize) -> Self {
        self.char_start = Some(start);
        self.char_end = Some(end);
        self
    }

    /// Get the number of lines in this chunk
    #[must_use]
    pub const fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    /// Get estimated token count
    #[must_use]
    pub const fn estimated_tokens(&self) -> usize {
        self.metadata.estimated_tokens
    }

    /// Check if chunk contains a specific line
    #[must_use]
    pub const fn contains_line(&self, line: usize) -> bool {
        line >= self.start_line && line <= self.end_line
    }
}

/// Metadata about a code chunk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// Grammar the text was read with
    pub language: Option<String>,

    /// What produced the chunk
    pub chunk_type: ChunkType,

    /// Declared name (function name, class name, etc.)
    pub symbol_name: Option<String>,

    /// Index of this piece when an oversized chunk was split into windows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<usize>,

    /// Estimated token count (rough approximation)
    pub estimated_tokens: usize,
}

impl Default for ChunkMetadata {
    fn default() -> Self {
        Self {
            language: None,
            chunk_type: ChunkType::Window,
            symbol_name: None,
            part: None,
            estimated_tokens: 0,
        }
    }
}

impl ChunkMetadata {
    /// Create metadata with language only
    pub fn with_language(language: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
            ..Default::default()
        }
    }

    /// Builder: set chunk type
    #[must_use]
    pub const fn chunk_type(mut self, chunk_type: ChunkType) -> Self {
        self.chunk_type = chunk_type;
        self
    }

    /// Builder: set symbol name
    #[must_use]
    pub fn symbol_name(mut self, name: impl Into<String>) -> Self {
        self.symbol_name = Some(name.into());
        self
    }

    /// Builder: set estimated tokens
    #[must_use]
    pub const fn estimated_tokens(mut self, tokens: usize) -> Self {
        self.estimated_tokens = tokens;
        self
    }

    /// Estimate tokens from content (~4 bytes per token for code)
    #[must_use]
    pub fn estimate_tokens_from_content(content: &str) -> usize {
        (content.len() / 4).max(1)
    }
}

/// Type of code chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    /// Named function or generator declaration
    Function,
    /// Method definition outside an extracted class
    Method,
    /// Class declaration
    Class,
    /// Variable bound to a function, arrow, or class expression
    Variable,
    /// Export wrapping a declaration
    Export,
    /// Text between declarations
    Gap,
    /// Fixed window cut without structural information
    Window,
}

impl ChunkType {
    /// Check if this chunk came from a named construct
    #[must_use]
    pub const fn is_declaration(self) -> bool {
        !matches!(self, Self::Gap | Self::Window)
    }

    /// Get human-readable name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Variable => "variable",
            Self::Export => "export",
            Self::Gap => "gap",
            Self::Window => "window",
        }
    }

    /// Parse the wire name produced by [`ChunkType::as_str`]
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "function" => Self::Function,
            "method" => Self::Method,
            "class" => Self::Class,
            "variable" => Self::Variable,
            "export" => Self::Export,
            "gap" => Self::Gap,
            "window" => Self::Window,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_line_count() {
        let chunk = CodeChunk::new(
            "app.js".to_string(),
            10,
            15,
            "code".to_string(),
            ChunkMetadata::default(),
        );
        assert_eq!(chunk.line_count(), 6);
        assert_eq!(chunk.char_start, None);
    }

    #[test]
    fn test_chunk_contains_line() {
        let chunk = CodeChunk::new(
            "app.js".to_string(),
            10,
            15,
            "code".to_string(),
            ChunkMetadata::default(),
        );
        assert!(chunk.contains_line(10));
        assert!(chunk.contains_line(15));
        assert!(!chunk.contains_line(9));
        assert!(!chunk.contains_line(16));
    }

    #[test]
    fn test_char_range_builder() {
        let chunk = CodeChunk::new(
            "bundle.min.js".to_string(),
            1,
            1,
            "x".to_string(),
            ChunkMetadata::default(),
        )
        .with_char_range(4000, 4001);
        assert_eq!(chunk.char_start, Some(4000));
        assert_eq!(chunk.char_end, Some(4001));
    }

    #[test]
    fn test_chunk_type_names() {
        for ty in [
            ChunkType::Function,
            ChunkType::Method,
            ChunkType::Class,
            ChunkType::Variable,
            ChunkType::Export,
            ChunkType::Gap,
            ChunkType::Window,
        ] {
            assert_eq!(ChunkType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(ChunkType::parse("struct"), None);
        assert!(ChunkType::Export.is_declaration());
        assert!(!ChunkType::Gap.is_declaration());
    }

    #[test]
    fn test_metadata_builder() {
        let metadata = ChunkMetadata::with_language("javascript")
            .chunk_type(ChunkType::Function)
            .symbol_name("render")
            .estimated_tokens(100);

        assert_eq!(metadata.language.as_deref(), Some("javascript"));
        assert_eq!(metadata.chunk_type, ChunkType::Function);
        assert_eq!(metadata.symbol_name.as_deref(), Some("render"));
        assert_eq!(metadata.estimated_tokens, 100);
    }

    #[test]
    fn test_estimate_tokens() {
        let tokens = ChunkMetadata::estimate_tokens_from_content("function a(){return 1}");
        assert!(tokens > 0);
        assert!(tokens < 100);
    }
}
