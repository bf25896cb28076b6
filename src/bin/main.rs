use expense_chat_orchestrator::{
    agent::{CancellationToken, ChatService},
    config::AppConfig,
    llm::backend_from_settings,
    store::store_from_config,
    tools::create_expense_registry,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// One chat turn from the command line: `expense-chat "What expenses are pending?"`
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let message = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if message.trim().is_empty() {
        eprintln!("Usage: expense-chat <message>");
        std::process::exit(2);
    }

    let config = AppConfig::from_env()?;

    // Create components
    let store = store_from_config(config.database_url.as_deref())?;
    let registry = Arc::new(create_expense_registry(store, config.principal));
    let backend = backend_from_settings(&config.completion)?;
    let service = ChatService::new(config.completion.clone(), backend, registry);

    let token = CancellationToken::new();
    tokio::spawn({
        let token = token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        }
    });

    info!(message = %message, "Running chat turn");

    match service.get_chat_response_with_cancel(&message, &[], token).await {
        Ok(response) => {
            println!("{}", response);
            Ok(())
        }
        Err(e) => {
            eprintln!("Chat turn failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
