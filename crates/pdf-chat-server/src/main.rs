use anyhow::Result;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use pdf_chat_server::config::Settings;
use pdf_chat_server::document::DocumentContext;
use pdf_chat_server::services::{LlmProvider, LlmService};
use pdf_chat_server::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,pdf_chat_server=debug".to_string()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .init();

    info!("🚀 Starting PDF Chat Server...");

    // Load configuration
    let settings = Settings::load()?;
    info!("✅ Configuration loaded");

    // Load the grounding document; failures leave the context empty
    let pdf_path = PathBuf::from(&settings.document.path);
    let document = tokio::task::spawn_blocking(move || DocumentContext::load_or_empty(&pdf_path))
        .await?;

    // Initialize model client
    let llm: Option<Arc<dyn LlmProvider>> = match LlmService::new(settings.llm.clone()) {
        Ok(service) => {
            info!("✅ LLM client initialized (model: {})", service.model());
            Some(Arc::new(service))
        }
        Err(e) => {
            warn!("⚠️ {}. /chat is disabled until OPENAI_API_KEY is set.", e);
            None
        }
    };

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));
    let sweep_interval = settings.conversation.sweep_interval();

    let state = AppState::new(settings, document, llm);

    if state.registry.clone().spawn_sweeper(sweep_interval).is_some() {
        info!("✅ Idle conversation sweeper started");
    }

    let app = build_router(state);

    info!("🎯 Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
