pub mod attachment_service;
pub mod gigachat_client;
pub mod provider_gateway;

// Re-export for convenience
pub use attachment_service::{AttachmentError, AttachmentService, StagingPolicy, UploadedFile};
pub use gigachat_client::{GigaChatClient, GigaChatSettings};
pub use provider_gateway::{
    CompletionReply, CompletionRequest, FilePurpose, FileUpload, GatewayError, GenerationParams,
    HistoryTurn, ProviderErrorKind, ProviderGateway, RemoteFile,
};
