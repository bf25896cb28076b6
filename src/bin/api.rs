use expense_chat_orchestrator::{
    api::{start_server, ApiState},
    config::AppConfig,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;

    info!("🚀 Expense Chat Orchestrator - API Server");
    info!("📍 Port: {}", config.port);

    if !config.completion.is_configured() {
        warn!("⚠️  AZURE_OPENAI_ENDPOINT / AZURE_OPENAI_DEPLOYMENT not set; chat will return setup instructions");
    }

    let state = ApiState::from_config(&config)?;

    info!(
        chat_configured = state.chat.is_configured(),
        "✅ Chat service initialized"
    );
    info!("📡 Starting API server...");

    start_server(state, config.port).await?;

    Ok(())
}
