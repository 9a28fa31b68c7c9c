//! Error types for the worker core.

use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Blocking submission task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errors raised when a worker is not configured well enough to run.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `open` was called before any transform was set.
    #[error("work is nil")]
    WorkIsNil,
}

/// Lifecycle misuse: the worker was not in a state that allows the call.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Worker {id} is already open")]
    AlreadyOpen { id: Uuid },

    #[error("Worker {id} is not open")]
    NotOpen { id: Uuid },

    #[error("Worker {id} is still closing")]
    Closing { id: Uuid },

    #[error("Worker {id} loop has exited, job was not accepted")]
    LoopExited { id: Uuid },

    #[error("Worker {id} failed to spawn its thread: {reason}")]
    SpawnFailed { id: Uuid, reason: String },
}

impl Error {
    /// True for the one recoverable, caller-facing error: missing work.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Result type alias for the worker core.
pub type Result<T> = std::result::Result<T, Error>;
