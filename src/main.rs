mod api;
mod attestation;
mod bootstrap;
mod config;
mod error;
mod ledger;
mod portfolio;
mod reconciler;
mod server;
mod settlement;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,safevault_backend=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("🚀 Starting SafeVault Reconciliation Backend");

    dotenv::dotenv().ok();
    let config = config::Config::from_env();

    let state = bootstrap::initialize_app_state(&config).await?;

    let app = server::create_app(state).await;
    server::run_server(app, &config.bind_address).await?;

    Ok(())
}
