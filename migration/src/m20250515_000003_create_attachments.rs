use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Attachments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Attachments::Uid)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Attachments::ChatUid).string_len(36).null())
                    .col(ColumnDef::new(Attachments::MessageUid).string_len(36).null())
                    .col(ColumnDef::new(Attachments::Name).string().not_null())
                    .col(ColumnDef::new(Attachments::MimeType).string().not_null())
                    .col(ColumnDef::new(Attachments::Size).big_integer().not_null())
                    .col(ColumnDef::new(Attachments::Path).string().not_null())
                    .col(ColumnDef::new(Attachments::Url).string().not_null())
                    .col(ColumnDef::new(Attachments::RemoteId).string_len(64).null())
                    .col(ColumnDef::new(Attachments::CreatedAt).string().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_attachment_chat")
                            .from(Attachments::Table, Attachments::ChatUid)
                            .to(Chats::Table, Chats::Uid)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_attachment_message")
                            .from(Attachments::Table, Attachments::MessageUid)
                            .to(Messages::Table, Messages::Uid)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_attachments_message_uid")
                    .table(Attachments::Table)
                    .col(Attachments::MessageUid)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Attachments::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Attachments {
    Table,
    Uid,
    ChatUid,
    MessageUid,
    Name,
    #[sea_orm(iden = "type")]
    MimeType,
    Size,
    Path,
    Url,
    RemoteId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Chats {
    Table,
    Uid,
}

#[derive(DeriveIden)]
enum Messages {
    Table,
    Uid,
}
