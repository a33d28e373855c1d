use anyhow::{Context, Result};
use clap::Parser;
use docqa::{
    api::{self, AppState},
    config, logging,
    processing::DocumentService,
    tasks::TaskRegistry,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(
    name = "docqa",
    about = "Document question-answering server",
    version
)]
struct Cli {
    /// Bind host, overriding `API_HOST`.
    #[arg(long)]
    host: Option<String>,
    /// Bind port, overriding `API_PORT`.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing();
    let config = config::init_config().context("Failed to load configuration")?;

    let service =
        DocumentService::new(config).context("Failed to initialize document service")?;
    let state = AppState::new(
        Arc::new(service),
        TaskRegistry::new(config.task_history_limit),
        config.max_upload_bytes,
    );
    let app = api::create_router(state);

    let host = cli.host.unwrap_or_else(|| config.api_host.clone());
    let port = cli.port.unwrap_or(config.api_port);
    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;
    tracing::info!("Listening on http://{host}:{port}");
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
