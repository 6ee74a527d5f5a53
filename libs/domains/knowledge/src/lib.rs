//! Knowledge Domain
//!
//! Keeps a vector-search index in step with published knowledge-base
//! documents. Sync requests arrive on a Redis stream and are applied to the
//! index at most once; LLM-backed summaries and categories fall back to
//! local heuristics whenever the model is missing, slow or wrong.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐
//! │ SyncDispatcher │  ← decode, route, count drops
//! └───────┬────────┘
//!         │
//! ┌───────▼──────────────────────────────────────────┐
//! │ Upsert / Delete synchronizers, SummaryGenerator  │
//! │ Classifier                DatasetProvisioner     │
//! └───────┬───────────────────────┬──────────────────┘
//!         │                       │
//! ┌───────▼──────┐  ┌─────────────▼─┐  ┌───────────┐
//! │ Repositories │  │  VectorIndex  │  │ LlmClient │
//! └──────────────┘  └───────────────┘  └───────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_knowledge::{
//!     LlmConfig, OpenAiChatClient, PgKnowledgeBaseRepository, PgModelRepository,
//!     PgNodeRepository, RagConfig, RagFlowClient, RepositoryModelResolver, SyncContext,
//!     SyncDispatcher,
//! };
//! use sea_orm::Database;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::connect("postgres://...").await?;
//!
//! let ctx = SyncContext {
//!     nodes: Arc::new(PgNodeRepository::new(db.clone())),
//!     knowledge_bases: Arc::new(PgKnowledgeBaseRepository::new(db.clone())),
//!     index: Arc::new(RagFlowClient::new(RagConfig::new("http://ragflow/api/v1", "key"))?),
//!     llm: Arc::new(OpenAiChatClient::new()?),
//!     models: Arc::new(RepositoryModelResolver::new(Arc::new(PgModelRepository::new(db)))),
//!     llm_config: LlmConfig::default(),
//! };
//! let dispatcher = SyncDispatcher::new(&ctx);
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod context;
pub mod dispatcher;
pub mod entity;
pub mod error;
pub mod events;
pub mod llm;
pub mod locks;
pub mod memory;
pub mod metrics;
pub mod models;
pub mod postgres;
pub mod provisioner;
pub mod publisher;
pub mod rag;
pub mod repository;
pub mod streams;
pub mod summary;
pub mod sync;
pub mod text;

pub use classifier::{ClassifyReport, Classifier};
pub use context::SyncContext;
pub use dispatcher::SyncDispatcher;
pub use error::{DropReason, KnowledgeError, KnowledgeResult, LlmError, VectorIndexError};
pub use events::{SyncAction, SyncEvent, SyncOutcome, SyncRequest};
pub use llm::{
    ChatModelResolver, LlmClient, LlmConfig, OpenAiChatClient, RepositoryModelResolver,
};
pub use models::{ChatModel, KnowledgeBase, Node, NodeMeta, NodeRelease, NodeType};
pub use postgres::{PgKnowledgeBaseRepository, PgModelRepository, PgNodeRepository};
pub use provisioner::DatasetProvisioner;
pub use publisher::SyncEventPublisher;
pub use rag::{RagConfig, RagFlowClient, VectorIndex};
pub use repository::{KnowledgeBaseRepository, ModelRepository, NodeRepository};
pub use streams::VectorTaskStream;
pub use summary::SummaryGenerator;
pub use sync::{DeleteSynchronizer, UpsertReport, UpsertSynchronizer};
