pub mod internal;

pub use internal::{
    Attachment, Chat, Message, NewAttachment, NewMessage, Role, TurnRequest, UnknownRole,
};
