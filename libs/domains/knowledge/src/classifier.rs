use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::context::SyncContext;
use crate::error::KnowledgeResult;
use crate::llm::{ChatModelResolver, LlmClient, prompts};
use crate::metrics;
use crate::models::{ChatModel, Node};
use crate::repository::NodeRepository;
use crate::text::{fallback_category, strip_html};

/// Counts from one [`Classifier::auto_classify`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassifyReport {
    /// Nodes whose new category was written
    pub classified: usize,
    pub by_llm: usize,
    pub by_fallback: usize,
    /// Nodes whose category write failed
    pub failed: usize,
    /// Latest releases whose stale category was brought in line with the node
    pub repaired: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CategorySource {
    Llm,
    Fallback,
}

/// Assigns a category to every uncategorized document of a knowledge base.
pub struct Classifier {
    nodes: Arc<dyn NodeRepository>,
    llm: Arc<dyn LlmClient>,
    models: Arc<dyn ChatModelResolver>,
    timeout: Duration,
}

impl Classifier {
    pub fn new(ctx: &SyncContext) -> Self {
        Self {
            nodes: ctx.nodes.clone(),
            llm: ctx.llm.clone(),
            models: ctx.models.clone(),
            timeout: ctx.llm_config.classify_timeout(),
        }
    }

    /// Classify uncategorized documents, then copy every node's category
    /// onto its latest release. Per-node write failures are counted and
    /// skipped; only the initial listing can fail the run.
    #[instrument(skip(self))]
    pub async fn auto_classify(&self, kb_id: &str) -> KnowledgeResult<ClassifyReport> {
        let pending = self.nodes.list_uncategorized_nodes(kb_id).await?;
        let mut report = ClassifyReport::default();

        if !pending.is_empty() {
            let model = self.models.resolve().await;
            if model.is_none() {
                warn!("No chat model configured, classifying by keywords");
            }

            for node in pending.iter().filter(|node| !node.is_folder()) {
                let (category, source) = self.categorize(model.as_ref(), node).await;

                match self.nodes.update_node_category(&node.id, &category).await {
                    Ok(()) => {
                        debug!(node_id = %node.id, category = %category, ?source, "Classified node");
                        report.classified += 1;
                        match source {
                            CategorySource::Llm => report.by_llm += 1,
                            CategorySource::Fallback => report.by_fallback += 1,
                        }
                    }
                    Err(e) => {
                        error!(node_id = %node.id, error = %e, "Failed to store category");
                        report.failed += 1;
                    }
                }
            }
        }

        report.repaired = self.repair_release_categories(kb_id).await;

        info!(
            classified = report.classified,
            by_llm = report.by_llm,
            by_fallback = report.by_fallback,
            failed = report.failed,
            repaired = report.repaired,
            "Classification finished"
        );
        Ok(report)
    }

    async fn categorize(&self, model: Option<&ChatModel>, node: &Node) -> (String, CategorySource) {
        let plain = strip_html(&node.content);

        if let Some(model) = model {
            let messages = prompts::classify_messages(&node.name, &plain);
            match tokio::time::timeout(self.timeout, self.llm.complete(model, &messages)).await {
                Ok(Ok(answer)) if !answer.trim().is_empty() => {
                    return (answer.trim().to_string(), CategorySource::Llm);
                }
                Ok(Ok(_)) => warn!(node_id = %node.id, "LLM returned an empty category"),
                Ok(Err(e)) => warn!(node_id = %node.id, error = %e, "LLM classification failed"),
                Err(_) => warn!(
                    node_id = %node.id,
                    timeout_secs = self.timeout.as_secs(),
                    "LLM classification timed out"
                ),
            }
            metrics::record_llm_fallback("classify");
        }

        (fallback_category(&plain).to_string(), CategorySource::Fallback)
    }

    /// Releases published before a node was classified lack its category.
    async fn repair_release_categories(&self, kb_id: &str) -> usize {
        let nodes = match self.nodes.list_nodes(kb_id).await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(error = %e, "Failed to list nodes for category repair");
                return 0;
            }
        };

        let mut repaired = 0;
        for node in nodes.iter().filter(|node| !node.meta.category.is_empty()) {
            match self
                .nodes
                .sync_release_category(&node.id, &node.meta.category)
                .await
            {
                Ok(true) => repaired += 1,
                Ok(false) => {}
                Err(e) => warn!(node_id = %node.id, error = %e, "Failed to repair category"),
            }
        }
        repaired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{KnowledgeError, LlmError};
    use crate::llm::{LlmConfig, MockChatModelResolver, MockLlmClient};
    use crate::models::{NodeMeta, NodeType};
    use crate::rag::MockVectorIndex;
    use crate::repository::{MockKnowledgeBaseRepository, MockNodeRepository};
    use mockall::predicate::eq;

    fn doc(id: &str, content: &str, category: &str) -> Node {
        Node {
            id: id.into(),
            kb_id: "kb-1".into(),
            node_type: NodeType::Document,
            name: format!("Doc {}", id),
            content: content.into(),
            meta: NodeMeta {
                summary: String::new(),
                category: category.into(),
            },
        }
    }

    fn chat_model() -> ChatModel {
        ChatModel {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            base_url: "http://llm".into(),
            api_key: "k".into(),
        }
    }

    fn classifier(
        nodes: MockNodeRepository,
        llm: MockLlmClient,
        models: MockChatModelResolver,
    ) -> Classifier {
        let ctx = SyncContext {
            nodes: Arc::new(nodes),
            knowledge_bases: Arc::new(MockKnowledgeBaseRepository::new()),
            index: Arc::new(MockVectorIndex::new()),
            llm: Arc::new(llm),
            models: Arc::new(models),
            llm_config: LlmConfig::default(),
        };
        Classifier::new(&ctx)
    }

    #[tokio::test]
    async fn test_llm_labels_and_keyword_fallback() {
        let mut nodes = MockNodeRepository::new();
        nodes.expect_list_uncategorized_nodes().returning(|_| {
            Ok(vec![
                doc("a", "<p>季度营销复盘</p>", ""),
                doc("b", "<p>接口说明</p>", ""),
            ])
        });
        nodes
            .expect_update_node_category()
            .with(eq("a"), eq("产品方案"))
            .times(1)
            .returning(|_, _| Ok(()));
        nodes
            .expect_update_node_category()
            .with(eq("b"), eq("技术文档"))
            .times(1)
            .returning(|_, _| Ok(()));
        nodes.expect_list_nodes().returning(|_| Ok(vec![]));

        let mut llm = MockLlmClient::new();
        llm.expect_complete()
            .withf(|_, messages| messages[1].content.contains("季度营销复盘"))
            .returning(|_, _| Ok(" 产品方案\n".to_string()));
        llm.expect_complete()
            .withf(|_, messages| messages[1].content.contains("接口说明"))
            .returning(|_, _| Err(LlmError::Status { status: 503, body: String::new() }));

        let mut models = MockChatModelResolver::new();
        models.expect_resolve().times(1).returning(|| Some(chat_model()));

        let report = classifier(nodes, llm, models).auto_classify("kb-1").await.unwrap();
        assert_eq!(
            report,
            ClassifyReport {
                classified: 2,
                by_llm: 1,
                by_fallback: 1,
                failed: 0,
                repaired: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_no_model_uses_keywords_only() {
        let mut nodes = MockNodeRepository::new();
        nodes
            .expect_list_uncategorized_nodes()
            .returning(|_| Ok(vec![doc("a", "采购合同", ""), doc("b", "团建", "未分类")]));
        nodes
            .expect_update_node_category()
            .with(eq("a"), eq("商务合同"))
            .returning(|_, _| Ok(()));
        nodes
            .expect_update_node_category()
            .with(eq("b"), eq("未分类"))
            .returning(|_, _| Ok(()));
        nodes.expect_list_nodes().returning(|_| Ok(vec![]));

        let mut llm = MockLlmClient::new();
        llm.expect_complete().never();

        let mut models = MockChatModelResolver::new();
        models.expect_resolve().returning(|| None);

        let report = classifier(nodes, llm, models).auto_classify("kb-1").await.unwrap();
        assert_eq!(report.by_fallback, 2);
        assert_eq!(report.by_llm, 0);
    }

    #[tokio::test]
    async fn test_write_failure_is_counted_and_run_continues() {
        let mut nodes = MockNodeRepository::new();
        nodes
            .expect_list_uncategorized_nodes()
            .returning(|_| Ok(vec![doc("a", "SOP", ""), doc("b", "SOP", "")]));
        nodes
            .expect_update_node_category()
            .with(eq("a"), eq("内部流程"))
            .returning(|_, _| Err(KnowledgeError::Database("lock timeout".into())));
        nodes
            .expect_update_node_category()
            .with(eq("b"), eq("内部流程"))
            .returning(|_, _| Ok(()));
        nodes.expect_list_nodes().returning(|_| Ok(vec![]));

        let mut models = MockChatModelResolver::new();
        models.expect_resolve().returning(|| None);

        let report = classifier(nodes, MockLlmClient::new(), models)
            .auto_classify("kb-1")
            .await
            .unwrap();
        assert_eq!(report.classified, 1);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_repair_counts_only_changed_releases() {
        let mut nodes = MockNodeRepository::new();
        nodes.expect_list_uncategorized_nodes().returning(|_| Ok(vec![]));
        nodes.expect_list_nodes().returning(|_| {
            Ok(vec![
                doc("a", "", "技术文档"),
                doc("b", "", ""),
                doc("c", "", "财务"),
                doc("d", "", "内部流程"),
            ])
        });
        nodes
            .expect_sync_release_category()
            .with(eq("a"), eq("技术文档"))
            .times(1)
            .returning(|_, _| Ok(true));
        nodes
            .expect_sync_release_category()
            .with(eq("c"), eq("财务"))
            .times(1)
            .returning(|_, _| Err(KnowledgeError::Database("lock timeout".into())));
        nodes
            .expect_sync_release_category()
            .with(eq("d"), eq("内部流程"))
            .times(1)
            .returning(|_, _| Ok(false));
        // Repair never touches the node row
        nodes.expect_update_node_category().never();

        let mut models = MockChatModelResolver::new();
        models.expect_resolve().never();

        let report = classifier(nodes, MockLlmClient::new(), models)
            .auto_classify("kb-1")
            .await
            .unwrap();
        assert_eq!(report.classified, 0);
        assert_eq!(report.repaired, 1);
    }

    #[tokio::test]
    async fn test_listing_failure_fails_run() {
        let mut nodes = MockNodeRepository::new();
        nodes
            .expect_list_uncategorized_nodes()
            .returning(|_| Err(KnowledgeError::Database("connection refused".into())));

        let result = classifier(nodes, MockLlmClient::new(), MockChatModelResolver::new())
            .auto_classify("kb-1")
            .await;
        assert!(result.is_err());
    }
}
