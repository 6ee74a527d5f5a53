use clap::{Parser, Subcommand};
use domain_knowledge::{SyncAction, SyncRequest};

#[derive(Debug, Parser)]
#[command(name = "rag-worker")]
#[command(about = "Keep the RAG vector index in sync with published knowledge documents")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Consume the sync stream until SIGINT/SIGTERM (default)
    Run,

    /// Classify every uncategorized document of a knowledge base once
    Classify {
        #[arg(long)]
        kb_id: String,
    },

    /// Publish one sync request onto the stream
    Replay {
        /// upsert, delete or summary
        #[arg(long)]
        action: SyncAction,

        #[arg(long)]
        kb_id: String,

        #[arg(long)]
        node_id: Option<String>,

        #[arg(long)]
        node_release_id: Option<String>,

        #[arg(long)]
        doc_id: Option<String>,
    },

    /// Apply pending database migrations
    Migrate,
}

impl Command {
    /// The wire request a `replay` invocation describes; `None` for other commands.
    pub fn replay_request(&self) -> Option<SyncRequest> {
        match self {
            Command::Replay {
                action,
                kb_id,
                node_id,
                node_release_id,
                doc_id,
            } => Some(SyncRequest {
                action: action.to_string(),
                kb_id: Some(kb_id.clone()),
                node_id: node_id.clone(),
                node_release_id: node_release_id.clone(),
                doc_id: doc_id.clone(),
            }),
            _ => None,
        }
    }
}
