use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::KnowledgeResult;
use crate::models::{ChatModel, KnowledgeBase, Node, NodeRelease};

/// Access to nodes and their published releases.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodeRepository: Send + Sync {
    async fn get_node_release(&self, id: &str) -> KnowledgeResult<Option<NodeRelease>>;

    async fn get_node(&self, id: &str) -> KnowledgeResult<Option<Node>>;

    async fn update_release_doc_id(&self, release_id: &str, doc_id: &str) -> KnowledgeResult<()>;

    /// Non-empty doc ids of `node_id`'s releases other than `release_id`,
    /// limited to releases created no later than `not_after`.
    async fn list_stale_doc_ids(
        &self,
        node_id: &str,
        release_id: &str,
        not_after: DateTime<Utc>,
    ) -> KnowledgeResult<Vec<String>>;

    /// Whether a release of `node_id` created after `created_after` already
    /// has a document in the index.
    async fn has_newer_indexed_release(
        &self,
        node_id: &str,
        created_after: DateTime<Utc>,
    ) -> KnowledgeResult<bool>;

    /// Blank out `doc_ids` on the node's releases once their documents are
    /// gone from the index. Returns the number of releases touched.
    async fn clear_doc_ids(&self, node_id: &str, doc_ids: &[String]) -> KnowledgeResult<u64>;

    /// Documents (never folders) with an empty or placeholder category.
    async fn list_uncategorized_nodes(&self, kb_id: &str) -> KnowledgeResult<Vec<Node>>;

    /// Write `category` on the node and on its most recent release.
    async fn update_node_category(&self, node_id: &str, category: &str) -> KnowledgeResult<()>;

    /// Copy `category` onto the node's most recent release when it differs,
    /// leaving the node itself untouched. Returns whether a release changed.
    async fn sync_release_category(&self, node_id: &str, category: &str) -> KnowledgeResult<bool>;

    async fn list_nodes(&self, kb_id: &str) -> KnowledgeResult<Vec<Node>>;

    async fn update_node_summary(
        &self,
        kb_id: &str,
        node_id: &str,
        summary: &str,
    ) -> KnowledgeResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KnowledgeBaseRepository: Send + Sync {
    async fn get_knowledge_base(&self, id: &str) -> KnowledgeResult<Option<KnowledgeBase>>;

    /// Compare-and-set: store `dataset_id` only while the column is still
    /// empty. Returns `true` when this call won.
    async fn set_dataset_id_if_empty(&self, kb_id: &str, dataset_id: &str)
    -> KnowledgeResult<bool>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelRepository: Send + Sync {
    /// The active chat model, if one is configured.
    async fn get_chat_model(&self) -> KnowledgeResult<Option<ChatModel>>;
}
