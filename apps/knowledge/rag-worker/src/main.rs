//! RAG Worker - Entry Point
//!
//! Consumes knowledge sync requests from the Redis stream, or runs one of
//! the maintenance subcommands.

use clap::Parser;
use core_config::tracing::install_color_eyre;
use knowledge_rag_worker::Cli;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    install_color_eyre();

    let cli = Cli::parse();
    knowledge_rag_worker::run(cli).await
}
