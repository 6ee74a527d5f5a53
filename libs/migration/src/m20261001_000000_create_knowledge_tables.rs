use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // dataset_id is '' until the first sync provisions a dataset
        manager
            .create_table(
                Table::create()
                    .table(KnowledgeBases::Table)
                    .if_not_exists()
                    .col(string(KnowledgeBases::Id).primary_key())
                    .col(string(KnowledgeBases::Name))
                    .col(string(KnowledgeBases::DatasetId).default(""))
                    .col(
                        timestamp_with_time_zone(KnowledgeBases::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(KnowledgeBases::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // type: 1 = folder, 2 = document
        manager
            .create_table(
                Table::create()
                    .table(Nodes::Table)
                    .if_not_exists()
                    .col(string(Nodes::Id).primary_key())
                    .col(string(Nodes::KbId))
                    .col(small_integer(Nodes::Type))
                    .col(string(Nodes::Name))
                    .col(text(Nodes::Content).default(""))
                    .col(text(Nodes::Summary).default(""))
                    .col(string(Nodes::Category).default(""))
                    .col(
                        timestamp_with_time_zone(Nodes::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Nodes::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_nodes_kb_id")
                            .from(Nodes::Table, Nodes::KbId)
                            .to(KnowledgeBases::Table, KnowledgeBases::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_nodes_kb_id")
                    .table(Nodes::Table)
                    .col(Nodes::KbId)
                    .to_owned(),
            )
            .await?;

        // Releases are snapshots; they outlive the node so its vector
        // documents can still be found and purged.
        manager
            .create_table(
                Table::create()
                    .table(NodeReleases::Table)
                    .if_not_exists()
                    .col(string(NodeReleases::Id).primary_key())
                    .col(string(NodeReleases::KbId))
                    .col(string(NodeReleases::NodeId))
                    .col(string(NodeReleases::Name))
                    .col(text(NodeReleases::Content).default(""))
                    .col(string(NodeReleases::Category).default(""))
                    .col(string(NodeReleases::DocId).default(""))
                    .col(
                        timestamp_with_time_zone(NodeReleases::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_node_releases_kb_id")
                            .from(NodeReleases::Table, NodeReleases::KbId)
                            .to(KnowledgeBases::Table, KnowledgeBases::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_node_releases_node_id_created_at")
                    .table(NodeReleases::Table)
                    .col(NodeReleases::NodeId)
                    .col(NodeReleases::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Models::Table)
                    .if_not_exists()
                    .col(string(Models::Id).primary_key())
                    .col(string(Models::Provider))
                    .col(string(Models::Model))
                    .col(string(Models::BaseUrl))
                    .col(string(Models::ApiKey).default(""))
                    .col(string(Models::ModelType))
                    .col(boolean(Models::IsActive).default(true))
                    .col(
                        timestamp_with_time_zone(Models::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_models_model_type")
                    .table(Models::Table)
                    .col(Models::ModelType)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Models::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(NodeReleases::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Nodes::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(KnowledgeBases::Table).if_exists().to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum KnowledgeBases {
    Table,
    Id,
    Name,
    DatasetId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Nodes {
    Table,
    Id,
    KbId,
    Type,
    Name,
    Content,
    Summary,
    Category,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum NodeReleases {
    Table,
    Id,
    KbId,
    NodeId,
    Name,
    Content,
    Category,
    DocId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Models {
    Table,
    Id,
    Provider,
    Model,
    BaseUrl,
    ApiKey,
    ModelType,
    IsActive,
    CreatedAt,
}
