use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use tourism_chat_api::build_router;
use tourism_chat_api::config::Settings;
use tourism_chat_api::services::conversation::{
    ContextAssembler, ConversationManager, ConversationStep,
};
use tourism_chat_api::services::{EmbeddingService, LlmService, PineconeIndex};
use tourism_chat_api::state::AppState;
use tourism_chat_api::storage::SessionStore;
use tourism_chat_api::utils::logger::init_logger;

#[tokio::main]
async fn main() -> Result<()> {
    // Loads .env before reading RUST_LOG and LOG_FORMAT.
    let _log_guard = init_logger()?;

    info!("Starting tourism chat API v{}", env!("CARGO_PKG_VERSION"));

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return Err(e);
        }
    };
    info!("Configuration loaded");

    let embedding_service = Arc::new(EmbeddingService::new(&settings.embedding)?);
    let llm_service = Arc::new(LlmService::new(settings.llm.clone())?);
    let vector_index = Arc::new(
        PineconeIndex::connect(&settings.vector_index)
            .await
            .context("Failed to connect to vector index")?,
    );
    info!("External services initialized");

    let store = SessionStore::from_settings(&settings).await?;

    let manager = Arc::new(ConversationManager::new(
        store.clone(),
        ContextAssembler::new(
            embedding_service,
            vector_index,
            settings.vector_index.top_k,
        ),
        ConversationStep::new(llm_service, settings.prompts.system_prompt.clone()),
    ));

    let app = build_router(AppState::new(manager), &settings.cors.allowed_origin)?;

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
