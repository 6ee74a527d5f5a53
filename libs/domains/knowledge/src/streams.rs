//! Stream definitions for the knowledge domain.

use stream_worker::StreamDef;

/// Sync requests emitted when documents are published, deleted or need a summary.
pub struct VectorTaskStream;

impl StreamDef for VectorTaskStream {
    const STREAM_NAME: &'static str = "knowledge:vector_tasks";

    const CONSUMER_GROUP: &'static str = "rag_workers";

    /// Upserts can take minutes on large documents; only claim well past that.
    const CLAIM_TIMEOUT_MS: u64 = 10 * 60 * 1000;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_task_stream_def() {
        assert_eq!(VectorTaskStream::stream_name(), "knowledge:vector_tasks");
        assert_eq!(VectorTaskStream::consumer_group(), "rag_workers");
        assert_eq!(VectorTaskStream::MAX_LENGTH, 100_000);
    }
}
