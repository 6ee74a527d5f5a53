use redis::aio::ConnectionManager;
use stream_worker::StreamProducer;
use tracing::info;

use crate::error::KnowledgeResult;
use crate::events::{SyncEvent, SyncRequest};
use crate::streams::VectorTaskStream;

/// Enqueues sync requests for the rag workers.
#[derive(Clone)]
pub struct SyncEventPublisher {
    producer: StreamProducer,
}

impl SyncEventPublisher {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            producer: StreamProducer::from_stream_def::<VectorTaskStream>(redis),
        }
    }

    /// Returns the stream entry id.
    pub async fn publish(&self, event: &SyncEvent) -> KnowledgeResult<String> {
        let entry_id = self.producer.send(&SyncRequest::from(event)).await?;
        info!(
            stream = %self.producer.stream_name(),
            entry_id = %entry_id,
            action = %event.action(),
            kb_id = %event.kb_id(),
            "Published sync request"
        );
        Ok(entry_id)
    }
}
