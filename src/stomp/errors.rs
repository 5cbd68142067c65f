use thiserror::Error;

#[derive(Debug, Error)]
pub enum StompError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Invalid(String),

    #[error("frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },

    #[error("tls error: {0}")]
    Tls(String),

    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(std::time::Duration, &'static str),

    /// The broker answered with an ERROR frame.
    #[error("broker error: {message}")]
    Broker { message: String, details: String },

    #[error("connection closed")]
    Closed,
}
