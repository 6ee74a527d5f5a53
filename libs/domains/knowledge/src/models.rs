use chrono::{DateTime, Utc};
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A knowledge base and the vector dataset backing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub id: String,
    pub name: String,
    /// Empty until the first document is indexed
    pub dataset_id: String,
}

impl KnowledgeBase {
    pub fn has_dataset(&self) -> bool {
        !self.dataset_id.is_empty()
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    DeriveActiveEnum,
    EnumIter,
)]
#[sea_orm(rs_type = "i16", db_type = "SmallInteger")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NodeType {
    #[sea_orm(num_value = 1)]
    Folder,
    #[sea_orm(num_value = 2)]
    Document,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMeta {
    pub summary: String,
    pub category: String,
}

/// Current editable state of a document or folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kb_id: String,
    pub node_type: NodeType,
    pub name: String,
    /// HTML as authored
    pub content: String,
    pub meta: NodeMeta,
}

impl Node {
    pub fn is_folder(&self) -> bool {
        self.node_type == NodeType::Folder
    }
}

/// Immutable published snapshot of a node. `doc_id` names the vector
/// document built from it, empty until indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRelease {
    pub id: String,
    pub kb_id: String,
    pub node_id: String,
    pub name: String,
    pub content: String,
    pub doc_id: String,
    pub created_at: DateTime<Utc>,
}

/// Connection settings for an OpenAI-compatible chat endpoint.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatModel {
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub api_key: String,
}

impl std::fmt::Debug for ChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatModel")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"***")
            .finish()
    }
}
