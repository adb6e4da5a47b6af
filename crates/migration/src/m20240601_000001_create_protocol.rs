//! Create `protocol` table.
//! One row per supported file-sharing protocol family, holding config and last-known service status.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Protocol::Table)
                    .if_not_exists()
                    .col(uuid(Protocol::Id).primary_key())
                    .col(string_len_uniq(Protocol::Name, 50))
                    .col(string_len(Protocol::DisplayName, 100))
                    .col(boolean(Protocol::IsEnabled).default(false))
                    .col(boolean(Protocol::IsInstalled).default(false))
                    .col(integer_null(Protocol::Port))
                    .col(boolean(Protocol::SslEnabled).default(false))
                    .col(json_null(Protocol::ConfigJson))
                    .col(string_len(Protocol::Status, 16))
                    .col(timestamp_with_time_zone_null(Protocol::InstalledAt))
                    .col(timestamp_with_time_zone(Protocol::UpdatedAt))
                    .col(integer(Protocol::Version).default(0))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Protocol::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Protocol {
    Table,
    Id,
    Name,
    DisplayName,
    IsEnabled,
    IsInstalled,
    Port,
    SslEnabled,
    ConfigJson,
    Status,
    InstalledAt,
    UpdatedAt,
    Version,
}
