use botgram_core::ApiError;
use thiserror::Error;

/// Lifecycle and misuse errors. These are raised synchronously at the call site and are
/// fatal to that call only; they never pass through the error-handler pipeline.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("not initialized; call initialize() first")]
    NotInitialized,

    #[error("already running")]
    AlreadyRunning,

    #[error("not running")]
    NotRunning,

    #[error("still running; call stop() before shutdown()")]
    StillRunning,

    #[error("invalid bot token: {0}")]
    InvalidToken(#[source] ApiError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("persistence error: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error("job queue error: {0}")]
    JobQueue(#[source] anyhow::Error),

    #[error("concurrent_updates must be at least 1")]
    InvalidConcurrency,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("webhook listener error: {0}")]
    Io(#[from] std::io::Error),
}
