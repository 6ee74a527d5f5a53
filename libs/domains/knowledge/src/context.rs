use std::sync::Arc;

use crate::llm::{ChatModelResolver, LlmClient, LlmConfig};
use crate::rag::VectorIndex;
use crate::repository::{KnowledgeBaseRepository, NodeRepository};

/// Shared clients the sync components are built from.
#[derive(Clone)]
pub struct SyncContext {
    pub nodes: Arc<dyn NodeRepository>,
    pub knowledge_bases: Arc<dyn KnowledgeBaseRepository>,
    pub index: Arc<dyn VectorIndex>,
    pub llm: Arc<dyn LlmClient>,
    pub models: Arc<dyn ChatModelResolver>,
    pub llm_config: LlmConfig,
}
