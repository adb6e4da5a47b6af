use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Protocol: status lookups for startup recovery of interrupted jobs
        manager
            .create_index(
                Index::create()
                    .name("idx_protocol_status")
                    .table(Protocol::Table)
                    .col(Protocol::Status)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_protocol_status").table(Protocol::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Protocol { Table, Status }
