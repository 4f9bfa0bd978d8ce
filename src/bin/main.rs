//! Terminal chat against the in-memory ledger.

use fintrack_agent::{
    config::AppConfig,
    llm::GeminiClient,
    orchestrator::{AgentSettings, Orchestrator},
    session::{ChatSession, DeliveryHub, OutboundFrame},
    store::{InMemoryLedgerStore, LedgerStore},
    tools::CallerContext,
};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config = AppConfig::from_env()?;
    let api_key = config
        .gemini_api_key
        .clone()
        .ok_or("GEMINI_API_KEY is required")?;

    let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedgerStore::new());
    let user = store.create_user("Local User", "local@fintrack.dev").await?;
    info!(user_id = %user.id, "Created local user");

    let model = Arc::new(GeminiClient::new(api_key, config.gemini_model.clone())?);
    let settings = AgentSettings {
        tool_timeout: config.tool_timeout,
        delegate_timeout: config.session.turn_timeout,
        max_iterations: config.max_iterations,
    };
    let orchestrator = Arc::new(Orchestrator::new(model, store, &settings)?);

    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(128);
    let printer = tokio::spawn(async move {
        let mut current = None;
        while let Some(frame) = rx.recv().await {
            if frame.message_id != current {
                println!();
                current = frame.message_id;
            }
            print!("{}", frame.message);
            let _ = std::io::stdout().flush();
        }
    });

    let caller = CallerContext::new(user.id, &config.session.currency, &config.session.timezone);
    let mut session = ChatSession::open(
        Some(caller),
        orchestrator,
        DeliveryHub::new(),
        config.session.clone(),
        tx,
    )
    .await?;

    println!("FinTrack chat. Type a message, or 'exit' to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }
        // Failures were already printed through the error frame.
        if let Err(e) = session.handle_message(line).await {
            debug!(error = %e, "Turn ended with error");
        }
        println!();
    }

    session.close().await;
    let _ = printer.await;
    Ok(())
}
