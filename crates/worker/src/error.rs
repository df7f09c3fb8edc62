use std::time::Duration;
use thiserror::Error;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Failures seen by the orchestrator side of the worker channel
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The worker process could not be started
    #[error("Failed to spawn worker `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The worker started but did not answer `ping`
    #[error("Worker health check failed: {0}")]
    HealthCheck(String),

    /// No response within the request timeout; the worker was restarted
    #[error("Worker request timed out after {0:?}")]
    Timeout(Duration),

    /// The worker exited or its pipes broke mid-request
    #[error("Worker channel closed: {0}")]
    ChannelClosed(String),

    /// The worker answered with something that is not a protocol message
    #[error("Worker protocol error: {0}")]
    Protocol(String),

    /// The worker refused the request as malformed
    #[error("Worker rejected request: {0}")]
    Rejected(String),

    /// The worker processed the request but failed on this resource
    #[error("Worker failed on {url}: {message}")]
    Resource { url: String, message: String },

    /// The bridge actor is gone
    #[error("Worker bridge is shut down")]
    Shutdown,
}

impl BridgeError {
    /// Whether the failure took the worker process down with it
    pub fn is_process_fatal(&self) -> bool {
        matches!(
            self,
            Self::ChannelClosed(_) | Self::Timeout(_) | Self::Protocol(_) | Self::Shutdown
        )
    }

    /// Whether retrying the same request later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::ChannelClosed(_) | Self::Spawn { .. })
    }
}
