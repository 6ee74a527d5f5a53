#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use domain_knowledge::memory::{InMemoryKnowledgeStore, InMemoryVectorIndex, ScriptedLlm, StaticModelResolver};
use domain_knowledge::{
    ChatModel, KnowledgeBase, LlmConfig, Node, NodeMeta, NodeRelease, NodeType, SyncContext,
};
use std::sync::Arc;

pub struct Harness {
    pub store: Arc<InMemoryKnowledgeStore>,
    pub index: Arc<InMemoryVectorIndex>,
    pub llm: Arc<ScriptedLlm>,
    pub ctx: SyncContext,
}

impl Harness {
    pub fn new(index: InMemoryVectorIndex, llm: ScriptedLlm, model: Option<ChatModel>) -> Self {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let index = Arc::new(index);
        let llm = Arc::new(llm);
        let ctx = SyncContext {
            nodes: store.clone(),
            knowledge_bases: store.clone(),
            index: index.clone(),
            llm: llm.clone(),
            models: Arc::new(StaticModelResolver(model)),
            llm_config: LlmConfig {
                summary_timeout_secs: 2,
                classify_timeout_secs: 1,
            },
        };
        Self {
            store,
            index,
            llm,
            ctx,
        }
    }

    /// No model configured: every LLM path falls back.
    pub fn offline() -> Self {
        Self::new(InMemoryVectorIndex::new(), ScriptedLlm::failing(), None)
    }
}

pub fn chat_model() -> ChatModel {
    ChatModel {
        provider: "openai".into(),
        model: "gpt-4o-mini".into(),
        base_url: "http://llm.local/v1".into(),
        api_key: "sk-test".into(),
    }
}

pub fn knowledge_base(id: &str, dataset_id: &str) -> KnowledgeBase {
    KnowledgeBase {
        id: id.into(),
        name: format!("KB {}", id),
        dataset_id: dataset_id.into(),
    }
}

pub fn document(id: &str, kb_id: &str, content: &str) -> Node {
    Node {
        id: id.into(),
        kb_id: kb_id.into(),
        node_type: NodeType::Document,
        name: format!("Doc {}", id),
        content: content.into(),
        meta: NodeMeta::default(),
    }
}

pub fn folder(id: &str, kb_id: &str) -> Node {
    Node {
        node_type: NodeType::Folder,
        ..document(id, kb_id, "")
    }
}

pub fn at(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 0).unwrap() + Duration::minutes(minute)
}

pub fn release(id: &str, kb_id: &str, node_id: &str, created_at: DateTime<Utc>) -> NodeRelease {
    NodeRelease {
        id: id.into(),
        kb_id: kb_id.into(),
        node_id: node_id.into(),
        name: format!("Release {}", id),
        content: format!("<p>content of {}</p>", id),
        doc_id: String::new(),
        created_at,
    }
}
