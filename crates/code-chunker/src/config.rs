use serde::{Deserialize, Serialize};

/// Input above this size is never handed to the parser.
pub const DEFAULT_MAX_PARSE_BYTES: usize = 5 * 1024 * 1024;

/// Configuration for code chunking behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Mean line length (in characters) above which text is treated as minified
    pub minified_line_chars: usize,

    /// Maximum chunk size in characters; larger chunks are split into windows
    pub max_chunk_chars: usize,

    /// Uncovered spans whose trimmed length is at most this are folded into a
    /// neighbouring declaration instead of becoming gap chunks
    pub min_gap_chars: usize,

    /// Number of lines per window in line-window chunking
    pub line_window: usize,

    /// Window size in characters used for minified text
    pub minified_window_chars: usize,

    /// Size gate: inputs larger than this skip parsing entirely
    pub max_parse_bytes: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            minified_line_chars: 4000,
            max_chunk_chars: 8000,
            min_gap_chars: 50,
            line_window: 200,
            minified_window_chars: 4000,
            max_parse_bytes: DEFAULT_MAX_PARSE_BYTES,
        }
    }
}

impl ChunkerConfig {
    /// Smaller chunks, tuned for embedding models with short context windows
    pub fn for_embeddings() -> Self {
        Self {
            max_chunk_chars: 4000,
            minified_window_chars: 2000,
            line_window: 100,
            ..Default::default()
        }
    }

    /// Skip parsing altogether and emit windows only
    pub fn windows_only() -> Self {
        Self {
            max_parse_bytes: 0,
            ..Default::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_chunk_chars < 16 {
            return Err(format!(
                "max_chunk_chars ({}) must be at least 16",
                self.max_chunk_chars
            ));
        }

        if self.minified_window_chars < 16 {
            return Err(format!(
                "minified_window_chars ({}) must be at least 16",
                self.minified_window_chars
            ));
        }

        if self.line_window == 0 {
            return Err("line_window must be > 0".to_string());
        }

        if self.minified_line_chars == 0 {
            return Err("minified_line_chars must be > 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = ChunkerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_parse_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn test_preset_configs_valid() {
        assert!(ChunkerConfig::for_embeddings().validate().is_ok());
        assert!(ChunkerConfig::windows_only().validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ChunkerConfig {
            max_chunk_chars: 4,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.max_chunk_chars = 8000;
        config.line_window = 0;
        assert!(config.validate().is_err());

        config.line_window = 200;
        config.minified_window_chars = 0;
        assert!(config.validate().is_err());

        config.minified_window_chars = 4000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: ChunkerConfig =
            serde_json::from_str(r#"{"line_window": 50}"#).expect("valid json");
        assert_eq!(config.line_window, 50);
        assert_eq!(config.max_chunk_chars, 8000);
    }
}
