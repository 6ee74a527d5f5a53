//! Standalone migrator for the knowledge schema (`up`, `down`, `status`, `fresh`, ...).
//! Reads `DATABASE_URL`; the rag-worker's `migrate` subcommand runs the same set.

use migration::Migrator;
use sea_orm_migration::cli;

#[tokio::main]
async fn main() {
    cli::run_cli(Migrator).await;
}
