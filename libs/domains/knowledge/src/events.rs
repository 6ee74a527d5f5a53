//! Sync events as they travel on the stream and as handlers see them.

use serde::{Deserialize, Serialize};
use stream_worker::StreamJob;
use strum::{AsRefStr, Display, EnumString};

use crate::error::{DropReason, KnowledgeError};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SyncAction {
    Upsert,
    Delete,
    Summary,
}

/// Wire form of a sync request, carried as JSON in the `job` field:
///
/// ```json
/// {"action": "upsert", "kb_id": "kb-1", "node_release_id": "rel-9"}
/// ```
///
/// Every field is optional on the wire so that incomplete requests still
/// decode and can be reported; [`SyncEvent::try_from`] enforces the rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kb_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_release_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
}

impl SyncRequest {
    /// Metric label for the action; anything unrecognised is `unknown`.
    pub fn action_label(&self) -> &'static str {
        match self.action.parse::<SyncAction>() {
            Ok(SyncAction::Upsert) => "upsert",
            Ok(SyncAction::Delete) => "delete",
            Ok(SyncAction::Summary) => "summary",
            Err(_) => "unknown",
        }
    }
}

impl StreamJob for SyncRequest {
    fn job_id(&self) -> String {
        let target = self
            .node_release_id
            .as_deref()
            .or(self.doc_id.as_deref())
            .or(self.node_id.as_deref())
            .unwrap_or("-");
        format!("{}:{}", self.action, target)
    }
}

/// A validated request: one variant per action, each with exactly the ids it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Upsert { kb_id: String, node_release_id: String },
    Delete { kb_id: String, doc_id: String },
    Summary { kb_id: String, node_id: String },
}

impl SyncEvent {
    pub fn action(&self) -> SyncAction {
        match self {
            SyncEvent::Upsert { .. } => SyncAction::Upsert,
            SyncEvent::Delete { .. } => SyncAction::Delete,
            SyncEvent::Summary { .. } => SyncAction::Summary,
        }
    }

    pub fn kb_id(&self) -> &str {
        match self {
            SyncEvent::Upsert { kb_id, .. }
            | SyncEvent::Delete { kb_id, .. }
            | SyncEvent::Summary { kb_id, .. } => kb_id,
        }
    }
}

fn required(value: &Option<String>, field: &str, action: SyncAction) -> Result<String, KnowledgeError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| KnowledgeError::InvalidEvent(format!("{} requires {}", action, field)))
}

impl TryFrom<&SyncRequest> for SyncEvent {
    type Error = KnowledgeError;

    fn try_from(request: &SyncRequest) -> Result<Self, Self::Error> {
        let action: SyncAction = request
            .action
            .parse()
            .map_err(|_| KnowledgeError::InvalidEvent(format!("unknown action '{}'", request.action)))?;
        let kb_id = required(&request.kb_id, "kb_id", action)?;

        Ok(match action {
            SyncAction::Upsert => SyncEvent::Upsert {
                kb_id,
                node_release_id: required(&request.node_release_id, "node_release_id", action)?,
            },
            SyncAction::Delete => SyncEvent::Delete {
                kb_id,
                doc_id: required(&request.doc_id, "doc_id", action)?,
            },
            SyncAction::Summary => SyncEvent::Summary {
                kb_id,
                node_id: required(&request.node_id, "node_id", action)?,
            },
        })
    }
}

impl From<&SyncEvent> for SyncRequest {
    fn from(event: &SyncEvent) -> Self {
        let mut request = SyncRequest {
            action: event.action().to_string(),
            kb_id: Some(event.kb_id().to_string()),
            ..Default::default()
        };
        match event {
            SyncEvent::Upsert { node_release_id, .. } => {
                request.node_release_id = Some(node_release_id.clone())
            }
            SyncEvent::Delete { doc_id, .. } => request.doc_id = Some(doc_id.clone()),
            SyncEvent::Summary { node_id, .. } => request.node_id = Some(node_id.clone()),
        }
        request
    }
}

/// What became of one event. Every outcome is acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Applied,
    /// Nothing to do, e.g. a folder or a knowledge base with no dataset
    Skipped,
    Dropped { reason: DropReason },
}
