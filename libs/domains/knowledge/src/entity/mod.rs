//! Sea-ORM entities for the knowledge tables.

pub mod knowledge_base;
pub mod llm_model;
pub mod node;
pub mod node_release;
