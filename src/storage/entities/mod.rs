pub mod attachments;
pub mod chats;
pub mod messages;
