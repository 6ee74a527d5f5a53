//! Chat-completion boundary and chat-model resolution.

mod config;
mod openai;
pub mod prompts;

pub use config::LlmConfig;
pub use openai::OpenAiChatClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::models::ChatModel;
use crate::repository::ModelRepository;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat completion against a resolved model. Callers bound each call with
/// their own timeout.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, model: &ChatModel, messages: &[ChatMessage]) -> Result<String, LlmError>;

    /// Short synopsis of a document.
    async fn summarize(&self, model: &ChatModel, title: &str, text: &str) -> Result<String, LlmError> {
        self.complete(model, &prompts::summary_messages(title, text)).await
    }
}

/// Which chat model to use right now, if any.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatModelResolver: Send + Sync {
    /// `None` when no model is configured or the lookup failed.
    async fn resolve(&self) -> Option<ChatModel>;
}

/// Reads the active chat model from the `models` table on every call.
pub struct RepositoryModelResolver<M: ModelRepository> {
    models: Arc<M>,
}

impl<M: ModelRepository> RepositoryModelResolver<M> {
    pub fn new(models: Arc<M>) -> Self {
        Self { models }
    }
}

#[async_trait]
impl<M: ModelRepository + 'static> ChatModelResolver for RepositoryModelResolver<M> {
    async fn resolve(&self) -> Option<ChatModel> {
        match self.models.get_chat_model().await {
            Ok(Some(model)) => Some(model),
            Ok(None) => {
                debug!("No chat model configured");
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to load chat model");
                None
            }
        }
    }
}
