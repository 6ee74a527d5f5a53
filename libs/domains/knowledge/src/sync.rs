//! Keeping vector documents in step with published releases.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::context::SyncContext;
use crate::error::{KnowledgeError, KnowledgeResult};
use crate::events::SyncOutcome;
use crate::locks::KeyedLocks;
use crate::models::NodeRelease;
use crate::provisioner::DatasetProvisioner;
use crate::rag::VectorIndex;
use crate::repository::{KnowledgeBaseRepository, NodeRepository};

/// Result of a successful upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertReport {
    pub doc_id: String,
    /// Documents of older releases removed from the index
    pub purged: Vec<String>,
}

/// Indexes a release and evicts the documents of the node's older releases,
/// leaving one live document per node.
///
/// Upserts of the same node run one at a time in this process. A release
/// whose node already has a newer release in the index is skipped, and stale
/// ids are only taken from releases created no later than the one being
/// indexed, so a late upsert of an old release can neither purge nor shadow
/// a newer one. Re-indexing a release evicts its own previous document.
pub struct UpsertSynchronizer {
    nodes: Arc<dyn NodeRepository>,
    knowledge_bases: Arc<dyn KnowledgeBaseRepository>,
    index: Arc<dyn VectorIndex>,
    provisioner: Arc<DatasetProvisioner>,
    node_locks: KeyedLocks,
}

impl UpsertSynchronizer {
    pub fn new(ctx: &SyncContext, provisioner: Arc<DatasetProvisioner>) -> Self {
        Self {
            nodes: ctx.nodes.clone(),
            knowledge_bases: ctx.knowledge_bases.clone(),
            index: ctx.index.clone(),
            provisioner,
            node_locks: KeyedLocks::new(),
        }
    }

    /// Returns `None` when a newer release of the node is already indexed.
    #[instrument(skip(self))]
    pub async fn upsert(
        &self,
        kb_id: &str,
        node_release_id: &str,
    ) -> KnowledgeResult<Option<UpsertReport>> {
        let release = self.load_release(kb_id, node_release_id).await?;
        let _guard = self.node_locks.lock(&release.node_id).await;

        // An upsert of the same release may have finished while we waited
        let release = self.load_release(kb_id, node_release_id).await?;

        if self
            .nodes
            .has_newer_indexed_release(&release.node_id, release.created_at)
            .await?
        {
            info!(node_id = %release.node_id, "Newer release already indexed, skipping");
            return Ok(None);
        }

        let kb = self
            .knowledge_bases
            .get_knowledge_base(kb_id)
            .await?
            .ok_or_else(|| KnowledgeError::KnowledgeBaseNotFound(kb_id.to_string()))?;
        let dataset_id = self.provisioner.ensure_dataset(&kb).await?;

        let doc_id = self.index.upsert_release(&dataset_id, &release).await?;
        self.nodes.update_release_doc_id(&release.id, &doc_id).await?;

        let mut stale = self
            .nodes
            .list_stale_doc_ids(&release.node_id, &release.id, release.created_at)
            .await?;
        stale.retain(|id| id != &doc_id);
        if !release.doc_id.is_empty()
            && release.doc_id != doc_id
            && !stale.contains(&release.doc_id)
        {
            stale.push(release.doc_id.clone());
        }

        if !stale.is_empty() {
            self.index.delete_documents(&dataset_id, &stale).await?;

            // The index is already correct; a failed cleanup only means a
            // later upsert deletes these ids again.
            if let Err(e) = self.nodes.clear_doc_ids(&release.node_id, &stale).await {
                warn!(node_id = %release.node_id, error = %e, "Failed to clear purged doc ids");
            }
        }

        info!(
            node_id = %release.node_id,
            dataset_id = %dataset_id,
            doc_id = %doc_id,
            purged = stale.len(),
            "Indexed node release"
        );

        Ok(Some(UpsertReport {
            doc_id,
            purged: stale,
        }))
    }

    async fn load_release(
        &self,
        kb_id: &str,
        node_release_id: &str,
    ) -> KnowledgeResult<NodeRelease> {
        let release = self
            .nodes
            .get_node_release(node_release_id)
            .await?
            .ok_or_else(|| KnowledgeError::NodeReleaseNotFound(node_release_id.to_string()))?;

        if release.kb_id != kb_id {
            return Err(KnowledgeError::InvalidEvent(format!(
                "release {} belongs to knowledge base {}, not {}",
                release.id, release.kb_id, kb_id
            )));
        }
        Ok(release)
    }
}

/// Removes one vector document from a knowledge base's dataset.
pub struct DeleteSynchronizer {
    knowledge_bases: Arc<dyn KnowledgeBaseRepository>,
    index: Arc<dyn VectorIndex>,
}

impl DeleteSynchronizer {
    pub fn new(ctx: &SyncContext) -> Self {
        Self {
            knowledge_bases: ctx.knowledge_bases.clone(),
            index: ctx.index.clone(),
        }
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, kb_id: &str, doc_id: &str) -> KnowledgeResult<SyncOutcome> {
        let kb = self
            .knowledge_bases
            .get_knowledge_base(kb_id)
            .await?
            .ok_or_else(|| KnowledgeError::KnowledgeBaseNotFound(kb_id.to_string()))?;

        if !kb.has_dataset() {
            warn!("Knowledge base has no dataset, nothing to delete");
            return Ok(SyncOutcome::Skipped);
        }

        self.index
            .delete_documents(&kb.dataset_id, &[doc_id.to_string()])
            .await?;

        info!(dataset_id = %kb.dataset_id, "Deleted vector document");
        Ok(SyncOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VectorIndexError;
    use crate::llm::{LlmConfig, MockChatModelResolver, MockLlmClient};
    use crate::models::KnowledgeBase;
    use crate::rag::MockVectorIndex;
    use crate::repository::{MockKnowledgeBaseRepository, MockNodeRepository};
    use chrono::Utc;
    use mockall::predicate::eq;

    fn kb(dataset_id: &str) -> KnowledgeBase {
        KnowledgeBase {
            id: "kb-1".into(),
            name: "Handbook".into(),
            dataset_id: dataset_id.into(),
        }
    }

    fn release(id: &str) -> NodeRelease {
        NodeRelease {
            id: id.into(),
            kb_id: "kb-1".into(),
            node_id: "node-1".into(),
            name: "Onboarding".into(),
            content: "<p>Welcome</p>".into(),
            doc_id: String::new(),
            created_at: Utc::now(),
        }
    }

    fn context(
        nodes: MockNodeRepository,
        knowledge_bases: MockKnowledgeBaseRepository,
        index: MockVectorIndex,
    ) -> SyncContext {
        SyncContext {
            nodes: Arc::new(nodes),
            knowledge_bases: Arc::new(knowledge_bases),
            index: Arc::new(index),
            llm: Arc::new(MockLlmClient::new()),
            models: Arc::new(MockChatModelResolver::new()),
            llm_config: LlmConfig::default(),
        }
    }

    fn upserter(ctx: &SyncContext) -> UpsertSynchronizer {
        let provisioner = Arc::new(DatasetProvisioner::new(
            ctx.knowledge_bases.clone(),
            ctx.index.clone(),
        ));
        UpsertSynchronizer::new(ctx, provisioner)
    }

    #[tokio::test]
    async fn test_upsert_purges_superseded_documents() {
        let mut nodes = MockNodeRepository::new();
        nodes
            .expect_get_node_release()
            .with(eq("rel-2"))
            .returning(|_| Ok(Some(release("rel-2"))));
        nodes
            .expect_has_newer_indexed_release()
            .withf(|node, _| node == "node-1")
            .returning(|_, _| Ok(false));
        nodes
            .expect_update_release_doc_id()
            .with(eq("rel-2"), eq("doc-2"))
            .times(1)
            .returning(|_, _| Ok(()));
        nodes
            .expect_list_stale_doc_ids()
            .withf(|node, rel, _| node == "node-1" && rel == "rel-2")
            .returning(|_, _, _| Ok(vec!["doc-1".to_string()]));
        nodes
            .expect_clear_doc_ids()
            .withf(|node, ids| node == "node-1" && ids == ["doc-1".to_string()])
            .times(1)
            .returning(|_, _| Ok(1));

        let mut kbs = MockKnowledgeBaseRepository::new();
        kbs.expect_get_knowledge_base().returning(|_| Ok(Some(kb("ds-1"))));

        let mut index = MockVectorIndex::new();
        index
            .expect_upsert_release()
            .withf(|ds, rel| ds == "ds-1" && rel.id == "rel-2")
            .returning(|_, _| Ok("doc-2".to_string()));
        index
            .expect_delete_documents()
            .withf(|ds, ids| ds == "ds-1" && ids == ["doc-1".to_string()])
            .times(1)
            .returning(|_, _| Ok(()));

        let ctx = context(nodes, kbs, index);
        let report = upserter(&ctx).upsert("kb-1", "rel-2").await.unwrap().unwrap();
        assert_eq!(report.doc_id, "doc-2");
        assert_eq!(report.purged, vec!["doc-1".to_string()]);
    }

    #[tokio::test]
    async fn test_upsert_without_stale_ids_skips_delete() {
        let mut nodes = MockNodeRepository::new();
        nodes
            .expect_get_node_release()
            .returning(|_| Ok(Some(release("rel-1"))));
        nodes
            .expect_has_newer_indexed_release()
            .returning(|_, _| Ok(false));
        nodes.expect_update_release_doc_id().returning(|_, _| Ok(()));
        nodes.expect_list_stale_doc_ids().returning(|_, _, _| Ok(vec![]));
        nodes.expect_clear_doc_ids().never();

        let mut kbs = MockKnowledgeBaseRepository::new();
        kbs.expect_get_knowledge_base().returning(|_| Ok(Some(kb("ds-1"))));

        let mut index = MockVectorIndex::new();
        index
            .expect_upsert_release()
            .returning(|_, _| Ok("doc-1".to_string()));
        index.expect_delete_documents().never();

        let ctx = context(nodes, kbs, index);
        let report = upserter(&ctx).upsert("kb-1", "rel-1").await.unwrap().unwrap();
        assert!(report.purged.is_empty());
    }

    #[tokio::test]
    async fn test_reindexing_release_purges_its_previous_document() {
        let mut nodes = MockNodeRepository::new();
        nodes.expect_get_node_release().returning(|_| {
            Ok(Some(NodeRelease {
                doc_id: "doc-1".into(),
                ..release("rel-1")
            }))
        });
        nodes
            .expect_has_newer_indexed_release()
            .returning(|_, _| Ok(false));
        nodes
            .expect_update_release_doc_id()
            .with(eq("rel-1"), eq("doc-2"))
            .returning(|_, _| Ok(()));
        // The release's own row is excluded from the stale listing
        nodes.expect_list_stale_doc_ids().returning(|_, _, _| Ok(vec![]));
        nodes.expect_clear_doc_ids().returning(|_, _| Ok(0));

        let mut kbs = MockKnowledgeBaseRepository::new();
        kbs.expect_get_knowledge_base().returning(|_| Ok(Some(kb("ds-1"))));

        let mut index = MockVectorIndex::new();
        index
            .expect_upsert_release()
            .returning(|_, _| Ok("doc-2".to_string()));
        index
            .expect_delete_documents()
            .withf(|ds, ids| ds == "ds-1" && ids == ["doc-1".to_string()])
            .times(1)
            .returning(|_, _| Ok(()));

        let ctx = context(nodes, kbs, index);
        let report = upserter(&ctx).upsert("kb-1", "rel-1").await.unwrap().unwrap();
        assert_eq!(report.purged, vec!["doc-1".to_string()]);
    }

    #[tokio::test]
    async fn test_superseded_release_is_not_indexed() {
        let mut nodes = MockNodeRepository::new();
        nodes
            .expect_get_node_release()
            .returning(|_| Ok(Some(release("rel-1"))));
        nodes
            .expect_has_newer_indexed_release()
            .withf(|node, _| node == "node-1")
            .returning(|_, _| Ok(true));
        nodes.expect_update_release_doc_id().never();

        let mut kbs = MockKnowledgeBaseRepository::new();
        kbs.expect_get_knowledge_base().never();

        let mut index = MockVectorIndex::new();
        index.expect_upsert_release().never();
        index.expect_delete_documents().never();

        let ctx = context(nodes, kbs, index);
        let report = upserter(&ctx).upsert("kb-1", "rel-1").await.unwrap();
        assert!(report.is_none());
    }

    #[tokio::test]
    async fn test_upsert_missing_release_touches_nothing() {
        let mut nodes = MockNodeRepository::new();
        nodes.expect_get_node_release().returning(|_| Ok(None));

        let mut index = MockVectorIndex::new();
        index.expect_upsert_release().never();

        let ctx = context(nodes, MockKnowledgeBaseRepository::new(), index);
        let err = upserter(&ctx).upsert("kb-1", "rel-404").await.unwrap_err();
        assert!(matches!(err, KnowledgeError::NodeReleaseNotFound(id) if id == "rel-404"));
    }

    #[tokio::test]
    async fn test_upsert_rejects_release_of_other_knowledge_base() {
        let mut nodes = MockNodeRepository::new();
        nodes
            .expect_get_node_release()
            .returning(|_| Ok(Some(release("rel-1"))));

        let ctx = context(nodes, MockKnowledgeBaseRepository::new(), MockVectorIndex::new());
        let err = upserter(&ctx).upsert("kb-other", "rel-1").await.unwrap_err();
        assert!(matches!(err, KnowledgeError::InvalidEvent(_)));
    }

    #[tokio::test]
    async fn test_upsert_index_failure_leaves_doc_id_untouched() {
        let mut nodes = MockNodeRepository::new();
        nodes
            .expect_get_node_release()
            .returning(|_| Ok(Some(release("rel-1"))));
        nodes
            .expect_has_newer_indexed_release()
            .returning(|_, _| Ok(false));
        nodes.expect_update_release_doc_id().never();
        nodes.expect_list_stale_doc_ids().never();

        let mut kbs = MockKnowledgeBaseRepository::new();
        kbs.expect_get_knowledge_base().returning(|_| Ok(Some(kb("ds-1"))));

        let mut index = MockVectorIndex::new();
        index.expect_upsert_release().returning(|_, _| {
            Err(VectorIndexError::Status {
                status: 502,
                body: "bad gateway".into(),
            })
        });

        let ctx = context(nodes, kbs, index);
        let err = upserter(&ctx).upsert("kb-1", "rel-1").await.unwrap_err();
        assert!(matches!(err, KnowledgeError::VectorIndex(_)));
    }

    #[tokio::test]
    async fn test_delete_removes_document() {
        let mut kbs = MockKnowledgeBaseRepository::new();
        kbs.expect_get_knowledge_base().returning(|_| Ok(Some(kb("ds-1"))));

        let mut index = MockVectorIndex::new();
        index
            .expect_delete_documents()
            .withf(|ds, ids| ds == "ds-1" && ids == ["doc-9".to_string()])
            .times(1)
            .returning(|_, _| Ok(()));

        let ctx = context(MockNodeRepository::new(), kbs, index);
        let outcome = DeleteSynchronizer::new(&ctx).delete("kb-1", "doc-9").await.unwrap();
        assert_eq!(outcome, SyncOutcome::Applied);
    }

    #[tokio::test]
    async fn test_delete_without_dataset_is_skipped() {
        let mut kbs = MockKnowledgeBaseRepository::new();
        kbs.expect_get_knowledge_base().returning(|_| Ok(Some(kb(""))));

        let mut index = MockVectorIndex::new();
        index.expect_delete_documents().never();

        let ctx = context(MockNodeRepository::new(), kbs, index);
        let outcome = DeleteSynchronizer::new(&ctx).delete("kb-1", "doc-9").await.unwrap();
        assert_eq!(outcome, SyncOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_delete_unknown_knowledge_base() {
        let mut kbs = MockKnowledgeBaseRepository::new();
        kbs.expect_get_knowledge_base().returning(|_| Ok(None));

        let ctx = context(MockNodeRepository::new(), kbs, MockVectorIndex::new());
        let err = DeleteSynchronizer::new(&ctx).delete("kb-9", "doc-9").await.unwrap_err();
        assert!(matches!(err, KnowledgeError::KnowledgeBaseNotFound(_)));
    }
}
