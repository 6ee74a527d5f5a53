//! Stream error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The processor gave up on a job. The entry is still acked.
    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StreamError {
    pub fn processing(message: impl Into<String>) -> Self {
        StreamError::Processing(message.into())
    }

    /// The consumer group was deleted under us (e.g. the stream key was dropped).
    pub fn is_missing_group(&self) -> bool {
        matches!(self, StreamError::Redis(e) if e.to_string().contains("NOGROUP"))
    }

    /// Processors log their own give-ups; the worker need not repeat them.
    pub fn is_reported_by_processor(&self) -> bool {
        matches!(self, StreamError::Processing(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StreamError::Redis(e) if e.is_timeout())
    }

    /// Short label used on metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamError::Redis(_) => "redis",
            StreamError::Serialization(_) => "serialization",
            StreamError::Processing(_) => "processing",
            StreamError::Config(_) => "config",
        }
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Serialization(err.to_string())
    }
}
