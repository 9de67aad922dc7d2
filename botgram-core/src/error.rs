use thiserror::Error;

/// Errors raised by the Bot API transport.
///
/// `InvalidToken` and `Unauthorized` are fatal to a polling loop; everything else is
/// transient and retried by the update source.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid bot token")]
    InvalidToken,

    #[error("unauthorized")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("request timed out")]
    TimedOut,

    #[error("network error: {0}")]
    Network(String),

    #[error("flood control exceeded, retry after {0}s")]
    RetryAfter(u64),

    #[error("api error {code}: {description}")]
    Api { code: i64, description: String },
}

impl ApiError {
    /// True for errors that mean the token itself is unusable. A polling loop must stop
    /// on these instead of retrying.
    pub fn is_fatal_auth(&self) -> bool {
        matches!(self, ApiError::InvalidToken | ApiError::Unauthorized)
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
