use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "node_releases")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub kb_id: String,
    pub node_id: String,
    pub name: String,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    pub category: String,
    pub doc_id: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for crate::models::NodeRelease {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            kb_id: model.kb_id,
            node_id: model.node_id,
            name: model.name,
            content: model.content,
            doc_id: model.doc_id,
            created_at: model.created_at.into(),
        }
    }
}
