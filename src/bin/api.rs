use scam_triage_orchestrator::{
    api::start_server, config::OrchestratorConfig, reasoning::ReasoningClient,
    session::SessionManager, tasks::AnalysisSuite,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let api_key = std::env::var("REASONING_API_KEY").unwrap_or_else(|_| {
        eprintln!("⚠️  REASONING_API_KEY not set in .env");
        eprintln!("📌 Analysis tasks will fail until it is configured");
        String::new()
    });

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("🚀 Scam Investigation Orchestrator - API Server");
    info!("📍 Port: {}", api_port);

    let config = OrchestratorConfig::from_env()?;
    let client = Arc::new(ReasoningClient::new(api_key));
    let suite = Arc::new(AnalysisSuite::remote(client));
    let sessions = Arc::new(SessionManager::new(suite, config));

    info!("✅ Session manager initialized");
    info!("📡 Starting API server...");

    start_server(sessions, api_port).await?;

    Ok(())
}
