use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use super::models::*;
use crate::{
    error::{AppError, AppResult},
    ledger::{ReceiptEntry, ReceiptLedger},
    portfolio::{aggregate, VaultReader},
    reconciler::{ActionTracker, ActionUpdate, Reconciler},
    settlement::ActionSubmitter,
};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<ReceiptLedger>,
    pub submitter: Arc<ActionSubmitter>,
    pub reconciler: Arc<Reconciler>,
    pub tracker: Arc<ActionTracker>,
    pub reader: Arc<VaultReader>,
    pub default_penalty_bps: u32,
}

/// Health check
/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "safevault-backend".to_string(),
        timestamp: Utc::now(),
    })
}

/// Submit a create or break action
/// POST /api/v1/actions
///
/// Validation happens inline so the caller gets a 400 before anything is
/// submitted. The settlement and attestation phases run in a detached
/// task; progress is observable via the status and stream endpoints.
pub async fn submit_action(
    State(state): State<AppState>,
    Json(request): Json<SubmitActionRequest>,
) -> AppResult<Json<SubmitActionResponse>> {
    let principal = request.principal().to_string();
    let action = request.into_action(state.default_penalty_bps);
    info!(
        "Received {} action from principal {}",
        action.kind(),
        principal
    );

    let prepared = state.submitter.prepare(&principal, &action).await?;

    let action_id = Uuid::new_v4();
    state.tracker.register(action_id);

    let reconciler = state.reconciler.clone();
    tokio::spawn(async move {
        if let Err(e) = reconciler.run(action_id, prepared).await {
            error!("Action {} did not reconcile: {}", action_id, e);
        }
    });

    let update = state
        .tracker
        .latest(action_id)
        .ok_or_else(|| AppError::Internal("action vanished after registration".to_string()))?;

    Ok(Json(SubmitActionResponse {
        action_id,
        state: update.state,
    }))
}

/// Latest known progress of one action
/// GET /api/v1/actions/:id
pub async fn get_action_status(
    State(state): State<AppState>,
    Path(action_id): Path<Uuid>,
) -> AppResult<Json<ActionUpdate>> {
    let update = state
        .tracker
        .latest(action_id)
        .ok_or_else(|| AppError::NotFound(format!("action {}", action_id)))?;
    Ok(Json(update))
}

/// All recorded receipts, newest first
/// GET /api/v1/receipts
pub async fn list_receipts(
    State(state): State<AppState>,
) -> AppResult<Json<ReceiptListResponse>> {
    let receipts = state.ledger.list().await?;
    Ok(Json(ReceiptListResponse {
        count: receipts.len(),
        receipts,
    }))
}

/// One receipt by settlement transaction hash
/// GET /api/v1/receipts/:tx_hash
pub async fn get_receipt(
    State(state): State<AppState>,
    Path(tx_hash): Path<String>,
) -> AppResult<Json<ReceiptEntry>> {
    let entry = state
        .ledger
        .get(&tx_hash)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("receipt {}", tx_hash)))?;
    Ok(Json(entry))
}

/// Aggregated portfolio snapshot for one principal
/// GET /api/v1/portfolio/:principal
///
/// Individual vault read failures degrade the snapshot instead of
/// failing the request; only a failed enumeration is fatal.
pub async fn get_portfolio(
    State(state): State<AppState>,
    Path(principal): Path<String>,
) -> AppResult<Json<PortfolioResponse>> {
    let results = state.reader.read_portfolio(&principal).await?;
    let snapshot = aggregate(&results);
    let vaults = results.iter().map(VaultView::from).collect();

    Ok(Json(PortfolioResponse {
        principal,
        snapshot,
        vaults,
    }))
}
