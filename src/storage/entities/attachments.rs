use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "attachments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub uid: String,
    pub chat_uid: Option<String>,
    pub message_uid: Option<String>,
    pub name: String,
    #[sea_orm(column_name = "type")]
    pub mime_type: String,
    pub size: i64,
    pub path: String,
    pub url: String,
    pub remote_id: Option<String>,
    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::chats::Entity",
        from = "Column::ChatUid",
        to = "super::chats::Column::Uid",
        on_delete = "Cascade"
    )]
    Chat,
    #[sea_orm(
        belongs_to = "super::messages::Entity",
        from = "Column::MessageUid",
        to = "super::messages::Column::Uid",
        on_delete = "Cascade"
    )]
    Message,
}

impl Related<super::chats::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Chat.def()
    }
}

impl Related<super::messages::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Message.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
