use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::context::SyncContext;
use crate::error::{KnowledgeError, KnowledgeResult, LlmError};
use crate::events::SyncOutcome;
use crate::llm::{ChatModelResolver, LlmClient};
use crate::metrics;
use crate::repository::NodeRepository;
use crate::text::{fallback_summary, strip_html};

/// Writes a short synopsis onto a document node.
///
/// The LLM is tried first under a time budget; any failure falls back to
/// [`fallback_summary`], so only the final write can fail.
pub struct SummaryGenerator {
    nodes: Arc<dyn NodeRepository>,
    llm: Arc<dyn LlmClient>,
    models: Arc<dyn ChatModelResolver>,
    timeout: Duration,
}

impl SummaryGenerator {
    pub fn new(ctx: &SyncContext) -> Self {
        Self {
            nodes: ctx.nodes.clone(),
            llm: ctx.llm.clone(),
            models: ctx.models.clone(),
            timeout: ctx.llm_config.summary_timeout(),
        }
    }

    #[instrument(skip(self))]
    pub async fn summarize(&self, kb_id: &str, node_id: &str) -> KnowledgeResult<SyncOutcome> {
        let node = self
            .nodes
            .get_node(node_id)
            .await?
            .ok_or_else(|| KnowledgeError::NodeNotFound(node_id.to_string()))?;

        if node.is_folder() {
            debug!("Folder has no summary");
            return Ok(SyncOutcome::Skipped);
        }

        let plain = strip_html(&node.content);
        let summary = match self.generate(&node.name, &plain).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "LLM summary unavailable, using local fallback");
                metrics::record_llm_fallback("summary");
                fallback_summary(&plain)
            }
        };

        self.nodes.update_node_summary(kb_id, node_id, &summary).await?;
        info!(chars = summary.chars().count(), "Updated node summary");
        Ok(SyncOutcome::Applied)
    }

    async fn generate(&self, title: &str, plain: &str) -> Result<String, LlmError> {
        let model = self.models.resolve().await.ok_or(LlmError::NoModel)?;

        let summary = tokio::time::timeout(self.timeout, self.llm.summarize(&model, title, plain))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout.as_secs()))??;

        let summary = summary.trim();
        if summary.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(summary.to_string())
    }
}
