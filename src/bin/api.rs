use fintrack_agent::{
    api::{start_server, AppState},
    config::AppConfig,
    llm::GeminiClient,
    orchestrator::{AgentSettings, Orchestrator},
    store::build_store,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load environment variables
    let config = AppConfig::from_env()?;

    let Some(api_key) = config.gemini_api_key.clone() else {
        error!("GEMINI_API_KEY is not set");
        return Err("GEMINI_API_KEY is required".into());
    };

    info!("FinTrack Agent - API Server");
    info!(port = config.port, model = %config.gemini_model, "Configuration loaded");

    // Create components
    let store = build_store(config.database_url.as_deref());
    let model = Arc::new(GeminiClient::new(api_key, config.gemini_model.clone())?);
    let settings = AgentSettings {
        tool_timeout: config.tool_timeout,
        delegate_timeout: config.session.turn_timeout,
        max_iterations: config.max_iterations,
    };
    let orchestrator = Arc::new(Orchestrator::new(model, store.clone(), &settings)?);

    info!("Orchestrator initialized");
    info!("Starting API server...");

    let state = AppState::new(orchestrator, store, &config);
    start_server(state, config.port).await?;

    Ok(())
}
