use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use uuid::Uuid;

use crate::{
    api::{docs::ApiDoc, dto::*, error::ApiError},
    config::Config,
    models::internal::{Role, TurnRequest},
    orchestrator::ConversationOrchestrator,
    services::{AttachmentService, UploadedFile},
    storage::repository::ConversationRepository,
};

/// Room for multipart boundaries and the text fields next to the document.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub chats: Arc<dyn ConversationRepository>,
    pub attachments: Arc<AttachmentService>,
    pub orchestrator: Arc<ConversationOrchestrator>,
}

// ==================== CHATS ====================

#[utoipa::path(
    get,
    path = "/api/chats",
    responses((status = 200, description = "Chats, newest first", body = [ChatResponse]))
)]
pub async fn list_chats(
    State(state): State<AppState>,
) -> Result<Json<Vec<ChatResponse>>, ApiError> {
    let chats = state.chats.list_chats().await?;
    Ok(Json(chats.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/api/chats",
    request_body = CreateChatRequest,
    responses(
        (status = 201, description = "Chat created", body = ChatResponse),
        (status = 400, description = "Empty title", body = ErrorResponse),
        (status = 409, description = "Uid already taken", body = ErrorResponse)
    )
)]
pub async fn create_chat(
    State(state): State<AppState>,
    Json(req): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<ChatResponse>), ApiError> {
    let uid = req.uid.unwrap_or_else(Uuid::new_v4);
    let chat = state.chats.create_chat(uid, &req.title).await?;
    Ok((StatusCode::CREATED, Json(chat.into())))
}

#[utoipa::path(
    get,
    path = "/api/chats/{id}",
    params(("id" = Uuid, Path, description = "Chat uid")),
    responses(
        (status = 200, description = "Messages in creation order", body = MessagesResponse),
        (status = 404, description = "Chat not found", body = ErrorResponse)
    )
)]
pub async fn get_chat_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessagesResponse>, ApiError> {
    if state.chats.find_chat(id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Chat {} not found", id)));
    }

    let messages = state.chats.list_messages(id).await?;
    Ok(Json(MessagesResponse {
        messages: messages.into_iter().map(Into::into).collect(),
    }))
}

// ==================== MESSAGES ====================

#[utoipa::path(
    post,
    path = "/api/messages",
    request_body = SubmitMessageRequest,
    responses(
        (status = 200, description = "Assistant reply", body = MessageResponse),
        (status = 400, description = "Invalid turn", body = ErrorResponse),
        (status = 404, description = "Chat not found", body = ErrorResponse),
        (status = 502, description = "Provider failed; the user message is kept", body = ErrorResponse)
    )
)]
pub async fn submit_message(
    State(state): State<AppState>,
    Json(req): Json<SubmitMessageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let role = match req.role.as_deref() {
        None => Role::User,
        Some(raw) => raw
            .parse::<Role>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
    };
    if role != Role::User {
        return Err(ApiError::BadRequest(format!(
            "only user messages can be submitted, got '{}'",
            role
        )));
    }

    let request = TurnRequest {
        chat_uid: req.chat_uid,
        message_uid: req.message_uid,
        role,
        content: req.content,
        attachment_uids: req.attachments,
    };

    // Detached so a client disconnect does not cancel provider calls mid-turn.
    let orchestrator = state.orchestrator.clone();
    let reply = tokio::spawn(async move { orchestrator.submit_turn(request).await })
        .await
        .map_err(|e| ApiError::Internal(format!("turn task failed: {}", e)))??;

    Ok(Json(reply.into()))
}

// ==================== FILES ====================

#[utoipa::path(
    post,
    path = "/api/files",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Staged attachments; empty when no document was sent", body = [AttachmentResponse]),
        (status = 400, description = "Empty file or extension not allowed", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse)
    )
)]
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Vec<AttachmentResponse>>, ApiError> {
    let mut document: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut chat_uid = None;
    let mut message_uid = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("document") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                document = Some((file_name, content_type, bytes.to_vec()));
            }
            Some("chat_uid") => chat_uid = parse_form_uid("chat_uid", &field.text().await?)?,
            Some("message_uid") => {
                message_uid = parse_form_uid("message_uid", &field.text().await?)?
            }
            _ => {}
        }
    }

    let Some((name, mime_type, bytes)) = document else {
        return Ok(Json(Vec::new()));
    };

    let attachment = state
        .attachments
        .stage(UploadedFile {
            bytes,
            name,
            mime_type,
            chat_uid,
            message_uid,
        })
        .await?;

    Ok(Json(vec![attachment.into()]))
}

#[utoipa::path(
    delete,
    path = "/api/files/{id}",
    params(("id" = Uuid, Path, description = "Attachment uid")),
    responses(
        (status = 200, description = "File deleted", body = DeleteFileResponse),
        (status = 404, description = "File not found", body = ErrorResponse)
    )
)]
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteFileResponse>, ApiError> {
    state.attachments.remove(id).await?;
    Ok(Json(DeleteFileResponse {
        message: "File deleted".to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/files/{id}",
    params(("id" = Uuid, Path, description = "Attachment uid")),
    responses(
        (status = 200, description = "File contents with the declared MIME type"),
        (status = 404, description = "File not found", body = ErrorResponse)
    )
)]
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let (attachment, bytes) = state.attachments.fetch(id).await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        urlencoding::encode(&attachment.name)
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, attachment.mime_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// Multipart text fields arrive as strings; browsers send "null" for unset values.
fn parse_form_uid(field: &str, raw: &str) -> Result<Option<Uuid>, ApiError> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "null" || raw == "undefined" {
        return Ok(None);
    }
    Uuid::parse_str(raw)
        .map(Some)
        .map_err(|_| ApiError::BadRequest(format!("{} is not a valid uid: '{}'", field, raw)))
}

// ==================== ROUTER ====================

pub fn create_router(state: AppState) -> Router {
    let upload_limit = usize::try_from(state.config.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);
    let cors_enabled = state.config.cors_enabled;

    let router = Router::new()
        .route("/api/chats", get(list_chats).post(create_chat))
        .route("/api/chats/{id}", get(get_chat_messages))
        .route("/api/messages", post(submit_message))
        .route("/api/messages/{id}", get(get_chat_messages))
        .route(
            "/api/files",
            post(upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/files/{id}", get(download_file).delete(delete_file))
        .route("/health", get(health))
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cors_enabled {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

pub async fn health() -> &'static str {
    "OK"
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
