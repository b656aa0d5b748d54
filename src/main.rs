use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use conspectator::{
    api::routes::{self, AppState},
    config::Config,
    orchestrator::ConversationOrchestrator,
    services::{AttachmentService, GigaChatClient, ProviderGateway},
    storage::{
        self, AttachmentRepository, BlobStore, ConversationRepository, FilesystemBlobStore,
        SeaOrmAttachmentRepository, SeaOrmConversationRepository,
    },
};

#[derive(Parser, Debug)]
#[command(name = "conspectator", version, about = "Chat backend for GigaChat")]
struct Cli {
    /// Configuration file (toml, yaml or json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured server port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    // Load config
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server_port = port;
    }
    let config = Arc::new(config);

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("conspectator={},tower_http=info", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Initialize database
    let db_conn = storage::init_db_with_pool(&config.database_url, config.max_connections).await?;

    // Local attachment bytes
    let blob_store = FilesystemBlobStore::new(&config.storage_dir);
    blob_store.ensure_root().await?;
    let blobs: Arc<dyn BlobStore> = Arc::new(blob_store);

    let attachments: Arc<dyn AttachmentRepository> =
        Arc::new(SeaOrmAttachmentRepository::new(db_conn.clone()));
    let chats: Arc<dyn ConversationRepository> = Arc::new(SeaOrmConversationRepository::new(
        db_conn,
        attachments.clone(),
    ));

    // Missing credentials stop the service here
    let gateway: Arc<dyn ProviderGateway> = Arc::new(GigaChatClient::new(config.gateway_settings())?);

    let orchestrator = Arc::new(ConversationOrchestrator::new(
        chats.clone(),
        attachments.clone(),
        blobs.clone(),
        gateway.clone(),
        config.orchestrator_settings(),
    ));

    let attachment_service = Arc::new(AttachmentService::new(
        attachments,
        blobs,
        gateway,
        config.staging_policy(),
    ));

    // Create application state
    let state = AppState {
        config: config.clone(),
        chats,
        attachments: attachment_service,
        orchestrator,
    };

    let app = routes::create_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("GigaChat model: {}", config.gigachat_model);
    tracing::info!("Uploads directory: {}", config.storage_dir.display());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
