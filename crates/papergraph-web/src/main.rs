//! Papergraph Web Server
//!
//! Run with: cargo run -p papergraph-web

use papergraph_config::Config;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.server.log_filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Papergraph Web Server...");
    warn_missing_keys(&config);

    let bind = config.server.bind.clone();
    let state = papergraph_web::state::AppState::from_config(config).await?;
    let app = papergraph_web::router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

fn warn_missing_keys(config: &Config) {
    let keys = &config.keys;
    if keys.groq.is_none() {
        warn!("GROQ_API_KEY not set");
    }
    if keys.google.is_none() {
        warn!("GOOGLE_API_KEY not set");
    }
    if keys.groq.is_none() && keys.google.is_none() {
        warn!("No LLM key configured, metadata extraction will fail");
    }
    if keys.llama_cloud.is_none() {
        warn!("LLAMA_CLOUD_API_KEY not set, PDFs will be converted locally");
    }
}
