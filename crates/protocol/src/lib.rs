//! Line-delimited JSON contract between the capture pipeline and the parse worker.
//!
//! Every message is one JSON object on one line. Requests carry a `command`
//! tag, responses a `status` tag.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

/// Reply sent for a `ping`
pub const PONG: &str = "pong";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Request {
    /// Restore and chunk a batch of archived scripts
    Parse { files: Vec<FileTask> },
    /// Liveness check
    Ping,
}

/// One script to process
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileTask {
    /// Path of the archived compiled script
    pub path: String,
    /// Path of its archived source map; an empty string means none
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub map_path: Option<String>,
    /// URL the script was captured from
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Success {
        #[serde(default)]
        results: Vec<FileOutcome>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Protocol-level failure, e.g. a malformed request line
    Error { message: String },
}

impl Response {
    pub fn pong() -> Self {
        Self::Success {
            results: Vec::new(),
            message: Some(PONG.to_string()),
        }
    }

    pub fn results(results: Vec<FileOutcome>) -> Self {
        Self::Success {
            results,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Outcome for one [`FileTask`]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileOutcome {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub results: Vec<SourceChunks>,
}

impl FileOutcome {
    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            error: Some(error.into()),
            results: Vec::new(),
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.results.iter().map(|r| r.chunks.len()).sum()
    }
}

/// Chunks of one original (or the compiled) file
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceChunks {
    pub original_file: String,
    pub source_map_restored: bool,
    pub chunks: Vec<WireChunk>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WireChunk {
    pub content: String,
    pub line_start: usize,
    pub line_end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_end: Option<usize>,
    /// Construct kind (`function`, `class`, `gap`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()))
}

/// Serialize a message as a single line, without the trailing newline
pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}

pub fn decode_request(line: &str) -> Result<Request> {
    serde_json::from_str(line.trim()).context("malformed request")
}

pub fn decode_response(line: &str) -> Result<Response> {
    serde_json::from_str(line.trim()).context("malformed response")
}
