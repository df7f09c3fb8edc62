use thiserror::Error;

/// Result type for restoration
pub type Result<T> = std::result::Result<T, RestoreError>;

/// Reasons a source map cannot be used. Every variant means "no restoration";
/// callers fall back to the compiled code.
#[derive(Error, Debug)]
pub enum RestoreError {
    /// Not JSON, or JSON of the wrong shape
    #[error("Malformed source map: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Only revision 3 maps are understood
    #[error("Unsupported source map version: {0}")]
    UnsupportedVersion(u32),

    /// The `mappings` string could not be decoded
    #[error("Invalid mappings at line {line}, segment {segment}: {reason}")]
    InvalidMappings {
        line: usize,
        segment: usize,
        reason: String,
    },

    /// A segment points at a source the map does not list
    #[error("Mapping references source {index} but the map lists {count}")]
    SourceOutOfRange { index: i64, count: usize },

    /// Parsed fine, but no referenced source carried inline content
    #[error("Source map yielded nothing: {referenced} sources referenced, {missing} without content")]
    NothingRestored { referenced: usize, missing: usize },
}

impl RestoreError {
    pub(crate) fn mappings(line: usize, segment: usize, reason: impl Into<String>) -> Self {
        Self::InvalidMappings {
            line,
            segment,
            reason: reason.into(),
        }
    }
}
