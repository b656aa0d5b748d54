use utoipa::OpenApi;

use crate::api::dto::*;
use crate::api::routes;
use crate::models::internal::Role;

#[derive(OpenApi)]
#[openapi(
    info(title = "Conspectator API", description = "Chats with GigaChat over uploaded documents"),
    paths(
        routes::list_chats,
        routes::create_chat,
        routes::get_chat_messages,
        routes::submit_message,
        routes::upload_file,
        routes::delete_file,
        routes::download_file,
    ),
    components(schemas(
        CreateChatRequest,
        SubmitMessageRequest,
        UploadForm,
        ChatResponse,
        MessageResponse,
        MessagesResponse,
        AttachmentResponse,
        DeleteFileResponse,
        ErrorResponse,
        Role,
    ))
)]
pub struct ApiDoc;
