use strum::{AsRefStr, Display};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Knowledge base not found: {0}")]
    KnowledgeBaseNotFound(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Node release not found: {0}")]
    NodeReleaseNotFound(String),

    #[error("Invalid sync event: {0}")]
    InvalidEvent(String),

    #[error("Vector index error: {0}")]
    VectorIndex(#[from] VectorIndexError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Stream error: {0}")]
    Stream(String),
}

pub type KnowledgeResult<T> = Result<T, KnowledgeError>;

impl From<sea_orm::DbErr> for KnowledgeError {
    fn from(err: sea_orm::DbErr) -> Self {
        KnowledgeError::Database(err.to_string())
    }
}

impl From<stream_worker::StreamError> for KnowledgeError {
    fn from(err: stream_worker::StreamError) -> Self {
        KnowledgeError::Stream(err.to_string())
    }
}

/// Label attached to `rag_sync_events_dropped_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum DropReason {
    Malformed,
    NotFound,
    Downstream,
}

impl KnowledgeError {
    pub fn drop_reason(&self) -> DropReason {
        match self {
            KnowledgeError::InvalidEvent(_) => DropReason::Malformed,
            KnowledgeError::KnowledgeBaseNotFound(_)
            | KnowledgeError::NodeNotFound(_)
            | KnowledgeError::NodeReleaseNotFound(_) => DropReason::NotFound,
            KnowledgeError::VectorIndex(_)
            | KnowledgeError::Llm(_)
            | KnowledgeError::Database(_)
            | KnowledgeError::Stream(_) => DropReason::Downstream,
        }
    }
}

/// Failures talking to the vector-search service.
#[derive(Debug, Error)]
pub enum VectorIndexError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Failures of the chat-completion backend. Never fatal to a sync: callers
/// fall back to local heuristics.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Empty completion")]
    EmptyResponse,

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("No chat model configured")]
    NoModel,
}
