use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::api::{
    handler::{
        get_action_status, get_portfolio, get_receipt, health_check, list_receipts, submit_action,
        AppState,
    },
    streaming::stream_action,
};

pub async fn create_app(state: AppState) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let app = Router::new()
        // Public health check endpoint
        .route("/health", get(health_check))
        // API v1 routes
        .nest(
            "/api/v1",
            Router::new()
                // Action endpoints
                .route("/actions", post(submit_action))
                .route("/actions/:id", get(get_action_status))
                .route("/actions/:id/stream", get(stream_action))
                // Receipt endpoints
                .route("/receipts", get(list_receipts))
                .route("/receipts/:tx_hash", get(get_receipt))
                // Portfolio endpoint
                .route("/portfolio/:principal", get(get_portfolio)),
        )
        .layer(CompressionLayer::new())
        // Allow all origins in dev, restrict in prod
        .layer(CorsLayer::very_permissive())
        // Add request tracing
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

pub async fn run_server(app: Router, bind_address: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}
