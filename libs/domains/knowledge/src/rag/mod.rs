//! Vector-search service boundary.

mod client;
mod config;

pub use client::RagFlowClient;
pub use config::RagConfig;

use async_trait::async_trait;

use crate::error::VectorIndexError;
use crate::models::NodeRelease;

/// Logical operations the sync needs from the vector index.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create an empty dataset and return its id.
    async fn create_dataset(&self, name: &str) -> Result<String, VectorIndexError>;

    /// Index the release's content in `dataset_id` and return the new document id.
    async fn upsert_release(
        &self,
        dataset_id: &str,
        release: &NodeRelease,
    ) -> Result<String, VectorIndexError>;

    /// Remove documents from a dataset. An empty list is a no-op.
    async fn delete_documents(
        &self,
        dataset_id: &str,
        doc_ids: &[String],
    ) -> Result<(), VectorIndexError>;

    /// Remove whole datasets. An empty list is a no-op.
    async fn delete_datasets(&self, dataset_ids: &[String]) -> Result<(), VectorIndexError>;
}
