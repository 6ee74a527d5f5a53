use sea_orm::entity::prelude::*;

/// Model type stored for chat-completion models.
pub const CHAT_MODEL_TYPE: &str = "chat";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "models")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub model_type: String,
    pub is_active: bool,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for crate::models::ChatModel {
    fn from(model: Model) -> Self {
        Self {
            provider: model.provider,
            model: model.model,
            base_url: model.base_url,
            api_key: model.api_key,
        }
    }
}
