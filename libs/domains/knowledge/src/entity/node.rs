use crate::models::{NodeMeta, NodeType};
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "nodes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub kb_id: String,
    #[sea_orm(column_name = "type")]
    pub node_type: NodeType,
    pub name: String,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    #[sea_orm(column_type = "Text")]
    pub summary: String,
    pub category: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for crate::models::Node {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            kb_id: model.kb_id,
            node_type: model.node_type,
            name: model.name,
            content: model.content,
            meta: NodeMeta {
                summary: model.summary,
                category: model.category,
            },
        }
    }
}
