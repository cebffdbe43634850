use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::{
    api::handler::AppState,
    attestation::{AttestationCoordinator, HttpAttestationClient},
    config::Config,
    error::AppResult,
    ledger::ReceiptLedger,
    portfolio::VaultReader,
    reconciler::{ActionTracker, Reconciler},
    settlement::{ActionSubmitter, GatewaySettlementClient, SettlementClient},
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    let pool = initialize_database(&config.database_url).await?;
    let ledger = Arc::new(ReceiptLedger::new(pool));
    info!("✅ Receipt ledger ready");

    let settlement: Arc<dyn SettlementClient> = Arc::new(GatewaySettlementClient::new(
        config.settlement_gateway_url.clone(),
        config.confirmation_poll_ms,
    ));
    info!(
        "✅ Settlement gateway client pointed at {}",
        config.settlement_gateway_url
    );

    let attestation_client = Arc::new(HttpAttestationClient::new(
        config.attestation_url.clone(),
        config.attestation_api_key.clone(),
    ));
    let attestation = Arc::new(AttestationCoordinator::new(
        attestation_client,
        config.attestation_timeout_ms,
    ));
    info!(
        "✅ Attestation coordinator ready (timeout {}ms)",
        config.attestation_timeout_ms
    );

    let submitter = Arc::new(ActionSubmitter::new(
        settlement.clone(),
        config.default_penalty_bps,
    ));
    let reader = Arc::new(VaultReader::new(
        settlement.clone(),
        config.batch_read_timeout_ms,
    ));
    let tracker = Arc::new(ActionTracker::new());
    let reconciler = Arc::new(Reconciler::new(
        submitter.clone(),
        attestation,
        ledger.clone(),
        tracker.clone(),
    ));
    info!("✅ Reconciler wired");

    Ok(AppState {
        ledger,
        submitter,
        reconciler,
        tracker,
        reader,
        default_penalty_bps: config.default_penalty_bps,
    })
}

async fn initialize_database(database_url: &str) -> AppResult<SqlitePool> {
    info!("Connecting to database: {}", database_url);

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("✅ Database migrations applied");

    Ok(pool)
}
