pub mod attachment_repository;
pub mod blob_store;
pub mod db;
pub mod entities;
pub mod repository;
pub mod timestamps;

pub use attachment_repository::{AttachmentRepository, SeaOrmAttachmentRepository};
pub use blob_store::{BlobError, BlobStore, FilesystemBlobStore};
pub use db::{init_db, init_db_with_pool};
pub use entities::{attachments, chats, messages};
pub use repository::{ConversationRepository, RepositoryError, SeaOrmConversationRepository};
