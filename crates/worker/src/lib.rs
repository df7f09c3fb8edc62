//! # Insight Worker
//!
//! Restores original sources from source maps and chunks them, in a process
//! separate from the capture pipeline.
//!
//! The worker reads newline-delimited JSON requests on stdin and writes one
//! response line per request on stdout. Logs go to stderr. [`WorkerBridge`]
//! is the orchestrator side: it spawns the worker, serializes requests to it,
//! and restarts it after a crash or a timeout.
//!
//! ```no_run
//! use insight_protocol::FileTask;
//! use insight_worker::{WorkerBridge, WorkerConfig};
//!
//! # async fn run() -> insight_worker::Result<()> {
//! let bridge = WorkerBridge::start(WorkerConfig::default()).await?;
//! let outcome = bridge
//!     .process(FileTask {
//!         path: "/tmp/capture/app.js".into(),
//!         map_path: None,
//!         url: "https://example.com/app.js".into(),
//!     })
//!     .await?;
//! println!("{} chunks", outcome.chunk_count());
//! bridge.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod bridge;
mod config;
mod error;
mod processor;
mod server;

pub use bridge::WorkerBridge;
pub use config::{WorkerConfig, CHUNKER_CONFIG_ENV};
pub use error::{BridgeError, Result};
pub use processor::{wire_chunk, FileProcessor};
pub use server::{report_fatal, run_stdio, serve, ServeStats};

/// Entry point shared by the `insight-worker` binary and `insight worker`.
/// Returns the process exit code.
pub fn worker_main() -> i32 {
    let config = match chunker_config_from_env() {
        Ok(config) => config,
        Err(message) => {
            log::error!("{message}");
            report_fatal(&message);
            return 1;
        }
    };

    let processor = match FileProcessor::new(config) {
        Ok(processor) => processor,
        Err(e) => {
            let message = format!("invalid chunker config: {e}");
            log::error!("{message}");
            report_fatal(&message);
            return 1;
        }
    };

    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| run_stdio(&processor))) {
        Ok(Ok(_)) => 0,
        Ok(Err(e)) => {
            log::error!("Worker I/O failed: {e}");
            1
        }
        Err(_) => {
            report_fatal("worker crashed");
            1
        }
    }
}

fn chunker_config_from_env() -> std::result::Result<insight_code_chunker::ChunkerConfig, String> {
    match std::env::var(CHUNKER_CONFIG_ENV) {
        Ok(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)
            .map_err(|e| format!("{CHUNKER_CONFIG_ENV} is not a chunker config: {e}")),
        _ => Ok(insight_code_chunker::ChunkerConfig::default()),
    }
}
