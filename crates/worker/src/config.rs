use insight_code_chunker::ChunkerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable carrying the chunker configuration (JSON) to the worker process
pub const CHUNKER_CONFIG_ENV: &str = "INSIGHT_WORKER_CHUNKER";

/// How the bridge launches and supervises the worker process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Executable to run
    pub program: PathBuf,

    /// Arguments passed to the executable
    pub args: Vec<String>,

    /// Whole-request timeout; the worker is killed and restarted when it elapses
    pub request_timeout_ms: u64,

    /// Spawn attempts per request before giving up on a dead worker
    pub max_restarts: u32,

    /// Requests that may wait in the bridge queue
    pub queue_depth: usize,

    /// Chunking settings forwarded to the worker
    pub chunker: ChunkerConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("insight-worker"),
            args: Vec::new(),
            request_timeout_ms: 120_000,
            max_restarts: 3,
            queue_depth: 64,
            chunker: ChunkerConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Run `program` with `args` instead of the default worker binary
    pub fn with_command(mut self, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        self.program = program.into();
        self.args = args;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout_ms == 0 {
            return Err("request_timeout_ms must be > 0".to_string());
        }
        if self.queue_depth == 0 {
            return Err("queue_depth must be > 0".to_string());
        }
        self.chunker.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = WorkerConfig {
            request_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
