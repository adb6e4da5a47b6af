//! Add `protocol.error_message`.
//! Additive only: databases that already carry the column (added by hand or by an
//! older upgrade script) are left untouched.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        if manager.has_column("protocol", "error_message").await? {
            return Ok(());
        }
        manager
            .alter_table(
                Table::alter()
                    .table(Protocol::Table)
                    .add_column(text_null(Protocol::ErrorMessage))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(Protocol::Table)
                    .drop_column(Protocol::ErrorMessage)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum Protocol {
    Table,
    ErrorMessage,
}
