use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webhook_capture::config::Config;
use webhook_capture::http_server::{self, AppState};
use webhook_capture::store::MemoryStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webhook_capture=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();

    let store = match &config.data_dir {
        Some(dir) => MemoryStore::with_data_dir(dir),
        None => MemoryStore::new(),
    };
    let store = Arc::new(store.with_retention(config.max_requests_per_webhook));
    store.load()?;

    let bind = config.bind;
    info!(domain = %config.domain, data_dir = ?config.data_dir, "starting webhook capture");
    let state = AppState::new(config, store.clone(), store)?;

    let listener = TcpListener::bind(bind).await?;
    http_server::serve(listener, state, shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
