//! Migrator for the protocol lifecycle schema.
//! Column additions land as separate migrations so existing databases upgrade in place.
//! Indexes are applied last.
pub use sea_orm_migration::prelude::*;

mod m20240601_000001_create_protocol;
mod m20240601_000002_add_protocol_error_message;
mod m20240601_000003_add_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_protocol::Migration),
            Box::new(m20240601_000002_add_protocol_error_message::Migration),
            // Indexes should always be applied last
            Box::new(m20240601_000003_add_indexes::Migration),
        ]
    }
}
