pub use sea_orm_migration::prelude::*;

mod m20250515_000001_create_chats;
mod m20250515_000002_create_messages;
mod m20250515_000003_create_attachments;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250515_000001_create_chats::Migration),
            Box::new(m20250515_000002_create_messages::Migration),
            Box::new(m20250515_000003_create_attachments::Migration),
        ]
    }
}
