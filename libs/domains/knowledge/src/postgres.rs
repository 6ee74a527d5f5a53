use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait,
};

use crate::entity::{knowledge_base, llm_model, node, node_release};
use crate::error::{KnowledgeError, KnowledgeResult};
use crate::models::{ChatModel, KnowledgeBase, Node, NodeRelease, NodeType};
use crate::repository::{KnowledgeBaseRepository, ModelRepository, NodeRepository};
use crate::text::UNCATEGORIZED;

fn now() -> DateTimeWithTimeZone {
    Utc::now().into()
}

pub struct PgNodeRepository {
    db: DatabaseConnection,
}

impl PgNodeRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NodeRepository for PgNodeRepository {
    async fn get_node_release(&self, id: &str) -> KnowledgeResult<Option<NodeRelease>> {
        let model = node_release::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?;
        Ok(model.map(Into::into))
    }

    async fn get_node(&self, id: &str) -> KnowledgeResult<Option<Node>> {
        let model = node::Entity::find_by_id(id.to_string()).one(&self.db).await?;
        Ok(model.map(Into::into))
    }

    async fn update_release_doc_id(&self, release_id: &str, doc_id: &str) -> KnowledgeResult<()> {
        let result = node_release::Entity::update_many()
            .col_expr(node_release::Column::DocId, Expr::value(doc_id))
            .filter(node_release::Column::Id.eq(release_id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(KnowledgeError::NodeReleaseNotFound(release_id.to_string()));
        }
        Ok(())
    }

    async fn list_stale_doc_ids(
        &self,
        node_id: &str,
        release_id: &str,
        not_after: DateTime<Utc>,
    ) -> KnowledgeResult<Vec<String>> {
        let not_after: DateTimeWithTimeZone = not_after.into();
        let doc_ids = node_release::Entity::find()
            .filter(node_release::Column::NodeId.eq(node_id))
            .filter(node_release::Column::Id.ne(release_id))
            .filter(node_release::Column::DocId.ne(""))
            .filter(node_release::Column::CreatedAt.lte(not_after))
            .select_only()
            .column(node_release::Column::DocId)
            .distinct()
            .into_tuple::<String>()
            .all(&self.db)
            .await?;
        Ok(doc_ids)
    }

    async fn has_newer_indexed_release(
        &self,
        node_id: &str,
        created_after: DateTime<Utc>,
    ) -> KnowledgeResult<bool> {
        let created_after: DateTimeWithTimeZone = created_after.into();
        let newer = node_release::Entity::find()
            .filter(node_release::Column::NodeId.eq(node_id))
            .filter(node_release::Column::DocId.ne(""))
            .filter(node_release::Column::CreatedAt.gt(created_after))
            .count(&self.db)
            .await?;
        Ok(newer > 0)
    }

    async fn clear_doc_ids(&self, node_id: &str, doc_ids: &[String]) -> KnowledgeResult<u64> {
        if doc_ids.is_empty() {
            return Ok(0);
        }

        let result = node_release::Entity::update_many()
            .col_expr(node_release::Column::DocId, Expr::value(""))
            .filter(node_release::Column::NodeId.eq(node_id))
            .filter(node_release::Column::DocId.is_in(doc_ids.iter().cloned()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn list_uncategorized_nodes(&self, kb_id: &str) -> KnowledgeResult<Vec<Node>> {
        let models = node::Entity::find()
            .filter(node::Column::KbId.eq(kb_id))
            .filter(node::Column::NodeType.eq(NodeType::Document))
            .filter(
                Condition::any()
                    .add(node::Column::Category.eq(""))
                    .add(node::Column::Category.eq(UNCATEGORIZED)),
            )
            .order_by_asc(node::Column::CreatedAt)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn update_node_category(&self, node_id: &str, category: &str) -> KnowledgeResult<()> {
        let txn = self.db.begin().await?;

        let updated = node::Entity::update_many()
            .col_expr(node::Column::Category, Expr::value(category))
            .col_expr(node::Column::UpdatedAt, Expr::value(now()))
            .filter(node::Column::Id.eq(node_id))
            .exec(&txn)
            .await?;
        if updated.rows_affected == 0 {
            txn.rollback().await?;
            return Err(KnowledgeError::NodeNotFound(node_id.to_string()));
        }

        let latest = node_release::Entity::find()
            .filter(node_release::Column::NodeId.eq(node_id))
            .order_by_desc(node_release::Column::CreatedAt)
            .one(&txn)
            .await?;

        // Unpublished nodes have no release yet
        if let Some(release) = latest {
            node_release::Entity::update_many()
                .col_expr(node_release::Column::Category, Expr::value(category))
                .filter(node_release::Column::Id.eq(release.id))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(())
    }

    async fn sync_release_category(&self, node_id: &str, category: &str) -> KnowledgeResult<bool> {
        let latest = node_release::Entity::find()
            .filter(node_release::Column::NodeId.eq(node_id))
            .order_by_desc(node_release::Column::CreatedAt)
            .one(&self.db)
            .await?;

        let Some(release) = latest else {
            return Ok(false);
        };
        if release.category == category {
            return Ok(false);
        }

        let result = node_release::Entity::update_many()
            .col_expr(node_release::Column::Category, Expr::value(category))
            .filter(node_release::Column::Id.eq(release.id))
            .filter(node_release::Column::Category.ne(category))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn list_nodes(&self, kb_id: &str) -> KnowledgeResult<Vec<Node>> {
        let models = node::Entity::find()
            .filter(node::Column::KbId.eq(kb_id))
            .order_by_asc(node::Column::CreatedAt)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn update_node_summary(
        &self,
        kb_id: &str,
        node_id: &str,
        summary: &str,
    ) -> KnowledgeResult<()> {
        let result = node::Entity::update_many()
            .col_expr(node::Column::Summary, Expr::value(summary))
            .col_expr(node::Column::UpdatedAt, Expr::value(now()))
            .filter(node::Column::KbId.eq(kb_id))
            .filter(node::Column::Id.eq(node_id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(KnowledgeError::NodeNotFound(node_id.to_string()));
        }
        Ok(())
    }
}

pub struct PgKnowledgeBaseRepository {
    db: DatabaseConnection,
}

impl PgKnowledgeBaseRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl KnowledgeBaseRepository for PgKnowledgeBaseRepository {
    async fn get_knowledge_base(&self, id: &str) -> KnowledgeResult<Option<KnowledgeBase>> {
        let model = knowledge_base::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?;
        Ok(model.map(Into::into))
    }

    async fn set_dataset_id_if_empty(
        &self,
        kb_id: &str,
        dataset_id: &str,
    ) -> KnowledgeResult<bool> {
        let result = knowledge_base::Entity::update_many()
            .col_expr(knowledge_base::Column::DatasetId, Expr::value(dataset_id))
            .col_expr(knowledge_base::Column::UpdatedAt, Expr::value(now()))
            .filter(knowledge_base::Column::Id.eq(kb_id))
            .filter(knowledge_base::Column::DatasetId.eq(""))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }
}

pub struct PgModelRepository {
    db: DatabaseConnection,
}

impl PgModelRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ModelRepository for PgModelRepository {
    async fn get_chat_model(&self) -> KnowledgeResult<Option<ChatModel>> {
        let model = llm_model::Entity::find()
            .filter(llm_model::Column::ModelType.eq(llm_model::CHAT_MODEL_TYPE))
            .filter(llm_model::Column::IsActive.eq(true))
            .order_by_desc(llm_model::Column::CreatedAt)
            .one(&self.db)
            .await?;
        Ok(model.map(Into::into))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn ts() -> DateTimeWithTimeZone {
        "2026-10-01T08:00:00+00:00".parse().unwrap()
    }

    fn kb_row(dataset_id: &str) -> knowledge_base::Model {
        knowledge_base::Model {
            id: "kb-1".into(),
            name: "Handbook".into(),
            dataset_id: dataset_id.into(),
            created_at: ts(),
            updated_at: ts(),
        }
    }

    #[tokio::test]
    async fn test_get_knowledge_base_maps_row() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![kb_row("ds-9")]])
            .into_connection();
        let repo = PgKnowledgeBaseRepository::new(db);

        let kb = repo.get_knowledge_base("kb-1").await.unwrap().unwrap();
        assert_eq!(kb.dataset_id, "ds-9");
        assert!(kb.has_dataset());
    }

    #[tokio::test]
    async fn test_set_dataset_id_if_empty_reports_winner() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
            ])
            .into_connection();
        let repo = PgKnowledgeBaseRepository::new(db);

        assert!(repo.set_dataset_id_if_empty("kb-1", "ds-1").await.unwrap());
        assert!(!repo.set_dataset_id_if_empty("kb-1", "ds-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_release_doc_id_missing_release() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let repo = PgNodeRepository::new(db);

        let err = repo.update_release_doc_id("r-404", "doc-1").await.unwrap_err();
        assert!(matches!(err, KnowledgeError::NodeReleaseNotFound(id) if id == "r-404"));
    }

    #[tokio::test]
    async fn test_clear_doc_ids_skips_empty_list() {
        // No results queued: any query would fail
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let repo = PgNodeRepository::new(db);

        assert_eq!(repo.clear_doc_ids("n-1", &[]).await.unwrap(), 0);
    }

    fn release_row(category: &str) -> node_release::Model {
        node_release::Model {
            id: "r-2".into(),
            kb_id: "kb-1".into(),
            node_id: "n-1".into(),
            name: "Onboarding".into(),
            content: "<p>hello</p>".into(),
            category: category.into(),
            doc_id: "doc-2".into(),
            created_at: ts(),
        }
    }

    #[tokio::test]
    async fn test_sync_release_category_skips_matching_release() {
        // Only the lookup is queued: an update would fail
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![release_row("内部流程")]])
            .into_connection();
        let repo = PgNodeRepository::new(db);

        assert!(!repo.sync_release_category("n-1", "内部流程").await.unwrap());
    }

    #[tokio::test]
    async fn test_sync_release_category_rewrites_stale_release() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![release_row("")]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let repo = PgNodeRepository::new(db);

        assert!(repo.sync_release_category("n-1", "内部流程").await.unwrap());
    }

    #[tokio::test]
    async fn test_sync_release_category_without_release() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<node_release::Model>::new()])
            .into_connection();
        let repo = PgNodeRepository::new(db);

        assert!(!repo.sync_release_category("n-1", "内部流程").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_node_maps_meta() {
        let row = node::Model {
            id: "n-1".into(),
            kb_id: "kb-1".into(),
            node_type: NodeType::Document,
            name: "Onboarding".into(),
            content: "<p>hello</p>".into(),
            summary: "hello".into(),
            category: "内部流程".into(),
            created_at: ts(),
            updated_at: ts(),
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row]])
            .into_connection();
        let repo = PgNodeRepository::new(db);

        let node = repo.get_node("n-1").await.unwrap().unwrap();
        assert_eq!(node.meta.category, "内部流程");
        assert_eq!(node.meta.summary, "hello");
        assert!(!node.is_folder());
    }

    #[tokio::test]
    async fn test_get_chat_model_none_when_unconfigured() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<llm_model::Model>::new()])
            .into_connection();
        let repo = PgModelRepository::new(db);

        assert!(repo.get_chat_model().await.unwrap().is_none());
    }
}
