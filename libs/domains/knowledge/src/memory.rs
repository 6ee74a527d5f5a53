//! In-memory implementations of the store, index and LLM boundaries, for
//! exercising whole sync flows without Postgres, RAGFlow or a model.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{KnowledgeError, KnowledgeResult, LlmError, VectorIndexError};
use crate::llm::{ChatMessage, ChatModelResolver, LlmClient};
use crate::models::{ChatModel, KnowledgeBase, Node, NodeRelease};
use crate::rag::VectorIndex;
use crate::repository::{KnowledgeBaseRepository, ModelRepository, NodeRepository};
use crate::text::UNCATEGORIZED;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct StoreState {
    knowledge_bases: HashMap<String, KnowledgeBase>,
    nodes: HashMap<String, Node>,
    releases: HashMap<String, NodeRelease>,
    release_categories: HashMap<String, String>,
    chat_model: Option<ChatModel>,
    /// Dataset id written by a "concurrent process" just before the next CAS
    pending_race: Option<(String, String)>,
    failing_category_writes: HashSet<String>,
}

/// Knowledge bases, nodes, releases and the chat model in one map-backed store.
#[derive(Default)]
pub struct InMemoryKnowledgeStore {
    state: Mutex<StoreState>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_knowledge_base(&self, kb: KnowledgeBase) {
        locked(&self.state).knowledge_bases.insert(kb.id.clone(), kb);
    }

    pub fn insert_node(&self, node: Node) {
        locked(&self.state).nodes.insert(node.id.clone(), node);
    }

    pub fn insert_release(&self, release: NodeRelease) {
        locked(&self.state).releases.insert(release.id.clone(), release);
    }

    pub fn set_chat_model(&self, model: Option<ChatModel>) {
        locked(&self.state).chat_model = model;
    }

    /// Make the next dataset write for `kb_id` lose against `winner`.
    pub fn race_dataset_write(&self, kb_id: &str, winner: &str) {
        locked(&self.state).pending_race = Some((kb_id.to_string(), winner.to_string()));
    }

    pub fn fail_category_writes_for(&self, node_id: &str) {
        locked(&self.state)
            .failing_category_writes
            .insert(node_id.to_string());
    }

    pub fn knowledge_base(&self, id: &str) -> Option<KnowledgeBase> {
        locked(&self.state).knowledge_bases.get(id).cloned()
    }

    pub fn node(&self, id: &str) -> Option<Node> {
        locked(&self.state).nodes.get(id).cloned()
    }

    pub fn release(&self, id: &str) -> Option<NodeRelease> {
        locked(&self.state).releases.get(id).cloned()
    }

    /// Record `category` on a release as if it had been published with it.
    pub fn set_release_category(&self, release_id: &str, category: &str) {
        locked(&self.state)
            .release_categories
            .insert(release_id.to_string(), category.to_string());
    }

    pub fn release_category(&self, release_id: &str) -> Option<String> {
        locked(&self.state).release_categories.get(release_id).cloned()
    }

    fn latest_release_id(state: &StoreState, node_id: &str) -> Option<String> {
        state
            .releases
            .values()
            .filter(|r| r.node_id == node_id)
            .max_by_key(|r| r.created_at)
            .map(|r| r.id.clone())
    }

    /// Doc ids still recorded on the node's releases.
    pub fn recorded_doc_ids(&self, node_id: &str) -> Vec<String> {
        let state = locked(&self.state);
        let mut ids: Vec<String> = state
            .releases
            .values()
            .filter(|r| r.node_id == node_id && !r.doc_id.is_empty())
            .map(|r| r.doc_id.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl NodeRepository for InMemoryKnowledgeStore {
    async fn get_node_release(&self, id: &str) -> KnowledgeResult<Option<NodeRelease>> {
        Ok(self.release(id))
    }

    async fn get_node(&self, id: &str) -> KnowledgeResult<Option<Node>> {
        Ok(self.node(id))
    }

    async fn update_release_doc_id(&self, release_id: &str, doc_id: &str) -> KnowledgeResult<()> {
        let mut state = locked(&self.state);
        let release = state
            .releases
            .get_mut(release_id)
            .ok_or_else(|| KnowledgeError::NodeReleaseNotFound(release_id.to_string()))?;
        release.doc_id = doc_id.to_string();
        Ok(())
    }

    async fn list_stale_doc_ids(
        &self,
        node_id: &str,
        release_id: &str,
        not_after: DateTime<Utc>,
    ) -> KnowledgeResult<Vec<String>> {
        let state = locked(&self.state);
        let mut ids: Vec<String> = state
            .releases
            .values()
            .filter(|r| {
                r.node_id == node_id
                    && r.id != release_id
                    && !r.doc_id.is_empty()
                    && r.created_at <= not_after
            })
            .map(|r| r.doc_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn has_newer_indexed_release(
        &self,
        node_id: &str,
        created_after: DateTime<Utc>,
    ) -> KnowledgeResult<bool> {
        let state = locked(&self.state);
        Ok(state.releases.values().any(|r| {
            r.node_id == node_id && !r.doc_id.is_empty() && r.created_at > created_after
        }))
    }

    async fn clear_doc_ids(&self, node_id: &str, doc_ids: &[String]) -> KnowledgeResult<u64> {
        let mut state = locked(&self.state);
        let mut cleared = 0;
        for release in state.releases.values_mut() {
            if release.node_id == node_id && doc_ids.contains(&release.doc_id) {
                release.doc_id.clear();
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn list_uncategorized_nodes(&self, kb_id: &str) -> KnowledgeResult<Vec<Node>> {
        let state = locked(&self.state);
        let mut nodes: Vec<Node> = state
            .nodes
            .values()
            .filter(|n| {
                n.kb_id == kb_id
                    && !n.is_folder()
                    && (n.meta.category.is_empty() || n.meta.category == UNCATEGORIZED)
            })
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }

    async fn update_node_category(&self, node_id: &str, category: &str) -> KnowledgeResult<()> {
        let mut state = locked(&self.state);
        if state.failing_category_writes.contains(node_id) {
            return Err(KnowledgeError::Database(format!(
                "could not write category of {}",
                node_id
            )));
        }

        let node = state
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| KnowledgeError::NodeNotFound(node_id.to_string()))?;
        node.meta.category = category.to_string();

        if let Some(release_id) = Self::latest_release_id(&state, node_id) {
            state
                .release_categories
                .insert(release_id, category.to_string());
        }
        Ok(())
    }

    async fn sync_release_category(&self, node_id: &str, category: &str) -> KnowledgeResult<bool> {
        let mut state = locked(&self.state);
        let Some(release_id) = Self::latest_release_id(&state, node_id) else {
            return Ok(false);
        };
        if state.release_categories.get(&release_id).map(String::as_str) == Some(category) {
            return Ok(false);
        }
        state
            .release_categories
            .insert(release_id, category.to_string());
        Ok(true)
    }

    async fn list_nodes(&self, kb_id: &str) -> KnowledgeResult<Vec<Node>> {
        let state = locked(&self.state);
        let mut nodes: Vec<Node> = state
            .nodes
            .values()
            .filter(|n| n.kb_id == kb_id)
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }

    async fn update_node_summary(
        &self,
        kb_id: &str,
        node_id: &str,
        summary: &str,
    ) -> KnowledgeResult<()> {
        let mut state = locked(&self.state);
        match state.nodes.get_mut(node_id) {
            Some(node) if node.kb_id == kb_id => {
                node.meta.summary = summary.to_string();
                Ok(())
            }
            _ => Err(KnowledgeError::NodeNotFound(node_id.to_string())),
        }
    }
}

#[async_trait]
impl KnowledgeBaseRepository for InMemoryKnowledgeStore {
    async fn get_knowledge_base(&self, id: &str) -> KnowledgeResult<Option<KnowledgeBase>> {
        Ok(self.knowledge_base(id))
    }

    async fn set_dataset_id_if_empty(
        &self,
        kb_id: &str,
        dataset_id: &str,
    ) -> KnowledgeResult<bool> {
        let mut state = locked(&self.state);

        if let Some((race_kb, winner)) = state.pending_race.take() {
            if let Some(kb) = state.knowledge_bases.get_mut(&race_kb) {
                kb.dataset_id = winner;
            }
        }

        let kb = state
            .knowledge_bases
            .get_mut(kb_id)
            .ok_or_else(|| KnowledgeError::KnowledgeBaseNotFound(kb_id.to_string()))?;
        if !kb.dataset_id.is_empty() {
            return Ok(false);
        }
        kb.dataset_id = dataset_id.to_string();
        Ok(true)
    }
}

#[async_trait]
impl ModelRepository for InMemoryKnowledgeStore {
    async fn get_chat_model(&self) -> KnowledgeResult<Option<ChatModel>> {
        Ok(locked(&self.state).chat_model.clone())
    }
}

#[derive(Default)]
struct IndexState {
    /// dataset id -> doc id -> release id
    datasets: BTreeMap<String, BTreeMap<String, String>>,
    next_id: u64,
    create_calls: usize,
    deleted_datasets: Vec<String>,
    fail_upserts: bool,
}

/// Datasets and documents held in maps, with generated sequential ids.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    state: Mutex<IndexState>,
    create_delay: Duration,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slow down dataset creation so concurrent callers overlap.
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    pub fn fail_upserts(&self, fail: bool) {
        locked(&self.state).fail_upserts = fail;
    }

    pub fn create_calls(&self) -> usize {
        locked(&self.state).create_calls
    }

    pub fn datasets(&self) -> Vec<String> {
        locked(&self.state).datasets.keys().cloned().collect()
    }

    pub fn deleted_datasets(&self) -> Vec<String> {
        locked(&self.state).deleted_datasets.clone()
    }

    /// Doc ids in `dataset_id`, sorted.
    pub fn documents(&self, dataset_id: &str) -> Vec<String> {
        locked(&self.state)
            .datasets
            .get(dataset_id)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn next_id(state: &mut IndexState, prefix: &str) -> String {
        state.next_id += 1;
        format!("{}-{}", prefix, state.next_id)
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn create_dataset(&self, _name: &str) -> Result<String, VectorIndexError> {
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }

        let mut state = locked(&self.state);
        state.create_calls += 1;
        let id = Self::next_id(&mut state, "ds");
        state.datasets.insert(id.clone(), BTreeMap::new());
        Ok(id)
    }

    async fn upsert_release(
        &self,
        dataset_id: &str,
        release: &NodeRelease,
    ) -> Result<String, VectorIndexError> {
        let mut state = locked(&self.state);
        if state.fail_upserts {
            return Err(VectorIndexError::Status {
                status: 503,
                body: "index unavailable".to_string(),
            });
        }
        if !state.datasets.contains_key(dataset_id) {
            return Err(VectorIndexError::Api {
                code: 102,
                message: format!("dataset {} not found", dataset_id),
            });
        }

        let doc_id = Self::next_id(&mut state, "doc");
        if let Some(docs) = state.datasets.get_mut(dataset_id) {
            docs.insert(doc_id.clone(), release.id.clone());
        }
        Ok(doc_id)
    }

    async fn delete_documents(
        &self,
        dataset_id: &str,
        doc_ids: &[String],
    ) -> Result<(), VectorIndexError> {
        if doc_ids.is_empty() {
            return Ok(());
        }

        let mut state = locked(&self.state);
        let docs = state
            .datasets
            .get_mut(dataset_id)
            .ok_or_else(|| VectorIndexError::Api {
                code: 102,
                message: format!("dataset {} not found", dataset_id),
            })?;
        for doc_id in doc_ids {
            docs.remove(doc_id);
        }
        Ok(())
    }

    async fn delete_datasets(&self, dataset_ids: &[String]) -> Result<(), VectorIndexError> {
        let mut state = locked(&self.state);
        for id in dataset_ids {
            if state.datasets.remove(id).is_some() {
                state.deleted_datasets.push(id.clone());
            }
        }
        Ok(())
    }
}

/// How [`ScriptedLlm`] answers one call.
#[derive(Debug, Clone)]
pub enum LlmReply {
    Answer(String),
    Fail,
    /// Never completes; the caller's timeout decides
    Hang,
}

/// Replies from a queue, then a default, and counts calls.
pub struct ScriptedLlm {
    queue: Mutex<VecDeque<LlmReply>>,
    default: LlmReply,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(default: LlmReply) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            default,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn answering(text: impl Into<String>) -> Self {
        Self::new(LlmReply::Answer(text.into()))
    }

    pub fn failing() -> Self {
        Self::new(LlmReply::Fail)
    }

    pub fn hanging() -> Self {
        Self::new(LlmReply::Hang)
    }

    /// Queue a reply used before the default.
    pub fn then(self, reply: LlmReply) -> Self {
        locked(&self.queue).push_back(reply);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _model: &ChatModel, _messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = locked(&self.queue)
            .pop_front()
            .unwrap_or_else(|| self.default.clone());

        match reply {
            LlmReply::Answer(text) => Ok(text),
            LlmReply::Fail => Err(LlmError::Status {
                status: 500,
                body: "scripted failure".to_string(),
            }),
            LlmReply::Hang => std::future::pending().await,
        }
    }
}

/// Always resolves to the same model (or to none).
pub struct StaticModelResolver(pub Option<ChatModel>);

impl StaticModelResolver {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn with(model: ChatModel) -> Self {
        Self(Some(model))
    }
}

#[async_trait]
impl ChatModelResolver for StaticModelResolver {
    async fn resolve(&self) -> Option<ChatModel> {
        self.0.clone()
    }
}
