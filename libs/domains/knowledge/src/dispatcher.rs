//! Routes decoded sync requests to their handlers.

use async_trait::async_trait;
use std::sync::Arc;
use stream_worker::{StreamError, StreamProcessor};
use tracing::{error, info, warn};

use crate::context::SyncContext;
use crate::error::{DropReason, KnowledgeResult};
use crate::events::{SyncEvent, SyncOutcome, SyncRequest};
use crate::metrics;
use crate::provisioner::DatasetProvisioner;
use crate::summary::SummaryGenerator;
use crate::sync::{DeleteSynchronizer, UpsertSynchronizer};

/// Entry point for sync requests read from the stream.
///
/// No request is ever retried: every failure is logged, counted in
/// `rag_sync_events_dropped_total` and reported as [`SyncOutcome::Dropped`].
pub struct SyncDispatcher {
    upsert: UpsertSynchronizer,
    delete: DeleteSynchronizer,
    summary: SummaryGenerator,
}

impl SyncDispatcher {
    pub fn new(ctx: &SyncContext) -> Self {
        let provisioner = Arc::new(DatasetProvisioner::new(
            ctx.knowledge_bases.clone(),
            ctx.index.clone(),
        ));

        Self {
            upsert: UpsertSynchronizer::new(ctx, provisioner),
            delete: DeleteSynchronizer::new(ctx),
            summary: SummaryGenerator::new(ctx),
        }
    }

    pub async fn dispatch(&self, request: &SyncRequest) -> SyncOutcome {
        let event = match SyncEvent::try_from(request) {
            Ok(event) => event,
            Err(e) => {
                warn!(action = %request.action, error = %e, "Discarding malformed sync request");
                metrics::record_dropped(request.action_label(), DropReason::Malformed);
                return SyncOutcome::Dropped {
                    reason: DropReason::Malformed,
                };
            }
        };

        let action = event.action();
        match self.apply(&event).await {
            Ok(outcome) => {
                info!(action = %action, kb_id = %event.kb_id(), ?outcome, "Sync request handled");
                outcome
            }
            Err(e) => {
                let reason = e.drop_reason();
                error!(
                    action = %action,
                    kb_id = %event.kb_id(),
                    reason = %reason,
                    error = %e,
                    "Sync request dropped"
                );
                metrics::record_dropped(action.as_ref(), reason);
                SyncOutcome::Dropped { reason }
            }
        }
    }

    async fn apply(&self, event: &SyncEvent) -> KnowledgeResult<SyncOutcome> {
        match event {
            SyncEvent::Upsert {
                kb_id,
                node_release_id,
            } => self
                .upsert
                .upsert(kb_id, node_release_id)
                .await
                .map(|report| match report {
                    Some(_) => SyncOutcome::Applied,
                    None => SyncOutcome::Skipped,
                }),
            SyncEvent::Delete { kb_id, doc_id } => self.delete.delete(kb_id, doc_id).await,
            SyncEvent::Summary { kb_id, node_id } => self.summary.summarize(kb_id, node_id).await,
        }
    }
}

#[async_trait]
impl StreamProcessor<SyncRequest> for SyncDispatcher {
    async fn process(&self, request: &SyncRequest) -> Result<(), StreamError> {
        match self.dispatch(request).await {
            SyncOutcome::Applied | SyncOutcome::Skipped => Ok(()),
            SyncOutcome::Dropped { reason } => Err(StreamError::processing(format!(
                "{} request dropped: {}",
                request.action_label(),
                reason
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "SyncDispatcher"
    }

    fn on_malformed(&self, _stream_id: &str, _error: &str) {
        metrics::record_dropped("unknown", DropReason::Malformed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmConfig, MockChatModelResolver, MockLlmClient};
    use crate::models::{KnowledgeBase, Node, NodeMeta, NodeType};
    use crate::rag::MockVectorIndex;
    use crate::repository::{MockKnowledgeBaseRepository, MockNodeRepository};

    fn dispatcher(
        nodes: MockNodeRepository,
        knowledge_bases: MockKnowledgeBaseRepository,
        index: MockVectorIndex,
    ) -> SyncDispatcher {
        let mut models = MockChatModelResolver::new();
        models.expect_resolve().returning(|| None);

        SyncDispatcher::new(&SyncContext {
            nodes: Arc::new(nodes),
            knowledge_bases: Arc::new(knowledge_bases),
            index: Arc::new(index),
            llm: Arc::new(MockLlmClient::new()),
            models: Arc::new(models),
            llm_config: LlmConfig::default(),
        })
    }

    fn request(json: &str) -> SyncRequest {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn test_malformed_request_is_dropped_without_io() {
        let mut nodes = MockNodeRepository::new();
        nodes.expect_get_node_release().never();

        let dispatcher = dispatcher(nodes, MockKnowledgeBaseRepository::new(), MockVectorIndex::new());
        let outcome = dispatcher
            .dispatch(&request(r#"{"action":"upsert","kb_id":"kb-1"}"#))
            .await;

        assert_eq!(
            outcome,
            SyncOutcome::Dropped {
                reason: DropReason::Malformed
            }
        );
    }

    #[tokio::test]
    async fn test_delete_routes_to_index() {
        let mut kbs = MockKnowledgeBaseRepository::new();
        kbs.expect_get_knowledge_base().returning(|_| {
            Ok(Some(KnowledgeBase {
                id: "kb-1".into(),
                name: "Handbook".into(),
                dataset_id: "ds-1".into(),
            }))
        });
        let mut index = MockVectorIndex::new();
        index
            .expect_delete_documents()
            .times(1)
            .returning(|_, _| Ok(()));

        let dispatcher = dispatcher(MockNodeRepository::new(), kbs, index);
        let outcome = dispatcher
            .dispatch(&request(r#"{"action":"delete","kb_id":"kb-1","doc_id":"doc-1"}"#))
            .await;
        assert_eq!(outcome, SyncOutcome::Applied);
    }

    #[tokio::test]
    async fn test_missing_release_is_dropped_as_not_found() {
        let mut nodes = MockNodeRepository::new();
        nodes.expect_get_node_release().returning(|_| Ok(None));

        let dispatcher = dispatcher(nodes, MockKnowledgeBaseRepository::new(), MockVectorIndex::new());
        let req = request(r#"{"action":"upsert","kb_id":"kb-1","node_release_id":"rel-x"}"#);

        assert_eq!(
            dispatcher.dispatch(&req).await,
            SyncOutcome::Dropped {
                reason: DropReason::NotFound
            }
        );
        assert!(dispatcher.process(&req).await.is_err());
    }

    #[tokio::test]
    async fn test_summary_of_folder_is_skipped_and_processed_ok() {
        let mut nodes = MockNodeRepository::new();
        nodes.expect_get_node().returning(|_| {
            Ok(Some(Node {
                id: "folder-1".into(),
                kb_id: "kb-1".into(),
                node_type: NodeType::Folder,
                name: "Guides".into(),
                content: String::new(),
                meta: NodeMeta::default(),
            }))
        });

        let dispatcher = dispatcher(nodes, MockKnowledgeBaseRepository::new(), MockVectorIndex::new());
        let req = request(r#"{"action":"summary","kb_id":"kb-1","node_id":"folder-1"}"#);
        assert!(dispatcher.process(&req).await.is_ok());
    }
}
