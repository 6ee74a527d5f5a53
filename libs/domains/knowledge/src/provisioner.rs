use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{KnowledgeError, KnowledgeResult};
use crate::locks::KeyedLocks;
use crate::models::KnowledgeBase;
use crate::rag::VectorIndex;
use crate::repository::KnowledgeBaseRepository;

/// Creates a knowledge base's vector dataset on first use.
///
/// Within a process, callers for the same knowledge base queue on a keyed
/// lock and re-read the row, so only the first one creates a dataset.
/// Across processes the write is a compare-and-set on an empty
/// `dataset_id`; a process that loses deletes the dataset it just created
/// and adopts the stored one.
pub struct DatasetProvisioner {
    knowledge_bases: Arc<dyn KnowledgeBaseRepository>,
    index: Arc<dyn VectorIndex>,
    locks: KeyedLocks,
}

impl DatasetProvisioner {
    pub fn new(
        knowledge_bases: Arc<dyn KnowledgeBaseRepository>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            knowledge_bases,
            index,
            locks: KeyedLocks::new(),
        }
    }

    /// Dataset id for `kb`, creating and persisting one if it has none.
    #[instrument(skip(self, kb), fields(kb_id = %kb.id))]
    pub async fn ensure_dataset(&self, kb: &KnowledgeBase) -> KnowledgeResult<String> {
        if kb.has_dataset() {
            return Ok(kb.dataset_id.clone());
        }

        let _guard = self.locks.lock(&kb.id).await;

        let current = self.load(&kb.id).await?;
        if current.has_dataset() {
            return Ok(current.dataset_id);
        }

        let dataset_id = self.index.create_dataset(&dataset_name(&kb.id)).await?;

        match self
            .knowledge_bases
            .set_dataset_id_if_empty(&kb.id, &dataset_id)
            .await
        {
            Ok(true) => {
                info!(dataset_id = %dataset_id, "Provisioned dataset for knowledge base");
                Ok(dataset_id)
            }
            Ok(false) => {
                warn!(
                    dataset_id = %dataset_id,
                    "Another worker provisioned this knowledge base first, discarding our dataset"
                );
                self.discard(&dataset_id).await;

                let winner = self.load(&kb.id).await?;
                if winner.has_dataset() {
                    Ok(winner.dataset_id)
                } else {
                    Err(KnowledgeError::Database(format!(
                        "dataset id for knowledge base {} was neither written nor found",
                        kb.id
                    )))
                }
            }
            Err(e) => {
                self.discard(&dataset_id).await;
                Err(e)
            }
        }
    }

    async fn load(&self, kb_id: &str) -> KnowledgeResult<KnowledgeBase> {
        self.knowledge_bases
            .get_knowledge_base(kb_id)
            .await?
            .ok_or_else(|| KnowledgeError::KnowledgeBaseNotFound(kb_id.to_string()))
    }

    /// Best-effort removal of a dataset nobody will reference.
    async fn discard(&self, dataset_id: &str) {
        if let Err(e) = self.index.delete_datasets(&[dataset_id.to_string()]).await {
            warn!(dataset_id = %dataset_id, error = %e, "Failed to delete orphaned dataset");
        }
    }
}

/// Dataset names must be unique on the index; the suffix keeps a retried
/// provisioning from colliding with an orphan of an earlier attempt.
fn dataset_name(kb_id: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("kb-{}-{}", kb_id, &suffix[..8])
}
