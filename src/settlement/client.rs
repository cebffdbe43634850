use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::models::{SettlementEffects, SettlementOutcome, SubmittedAction, TxHandle};
use crate::error::{EnumerationError, ReadError, SettlementError};

/// Settlement layer collaborator - authoritative for fund custody.
///
/// All operations are fallible and asynchronous. Submission and outcome
/// wait are on the critical path; the read operations feed the portfolio
/// reader and fail independently per call.
#[async_trait]
pub trait SettlementClient: Send + Sync {
    /// Submit one state-changing action. Exactly one settlement-layer
    /// mutation per eventual Confirmed outcome.
    async fn submit(&self, action: &SubmittedAction) -> Result<TxHandle, SettlementError>;

    /// Wait for the terminal outcome of a submitted transaction. Returns
    /// Confirmed or Failed, never Pending; bounded only by the gateway's
    /// own latency.
    async fn await_outcome(&self, handle: &TxHandle) -> Result<SettlementOutcome, SettlementError>;

    /// Enumerate vault addresses owned by a principal, in the settlement
    /// layer's stable enumeration order.
    async fn list_owned(&self, principal: &str) -> Result<Vec<String>, EnumerationError>;

    async fn read_balance(&self, vault: &str) -> Result<u128, ReadError>;

    async fn read_unlock_time(&self, vault: &str) -> Result<DateTime<Utc>, ReadError>;

    async fn read_purpose(&self, vault: &str) -> Result<String, ReadError>;
}

// ---------- Gateway wire models ----------

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    tx_hash: String,
}

#[derive(Debug, Deserialize)]
struct ReceiptResponse {
    status: String,
    from: Option<String>,
    to: Option<String>,
    value: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VaultListResponse {
    vaults: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: String,
}

#[derive(Debug, Deserialize)]
struct UnlockTimeResponse {
    unlock_timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct PurposeResponse {
    purpose: String,
}

/// HTTP client for the settlement gateway
pub struct GatewaySettlementClient {
    client: Client,
    base_url: String,
    poll_interval: Duration,
}

impl GatewaySettlementClient {
    pub fn new(base_url: String, poll_interval_ms: u64) -> Self {
        Self {
            client: Client::new(),
            base_url,
            poll_interval: Duration::from_millis(poll_interval_ms),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, ReadError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ReadError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| ReadError::Transport(e.to_string()))?;

        response
            .json::<T>()
            .await
            .map_err(|e| ReadError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl SettlementClient for GatewaySettlementClient {
    async fn submit(&self, action: &SubmittedAction) -> Result<TxHandle, SettlementError> {
        let url = format!("{}/v1/transactions", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(action)
            .send()
            .await
            .map_err(|e| SettlementError::Transport(e.to_string()))?;

        if response.status().is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(SettlementError::Rejected(body));
        }
        let response = response
            .error_for_status()
            .map_err(|e| SettlementError::Transport(e.to_string()))?;

        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| SettlementError::MalformedResponse(e.to_string()))?;

        info!("Submitted settlement transaction: {}", submitted.tx_hash);
        Ok(TxHandle(submitted.tx_hash))
    }

    async fn await_outcome(&self, handle: &TxHandle) -> Result<SettlementOutcome, SettlementError> {
        let url = format!("{}/v1/transactions/{}/receipt", self.base_url, handle.0);

        loop {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| SettlementError::Transport(e.to_string()))?
                .error_for_status()
                .map_err(|e| SettlementError::Transport(e.to_string()))?;

            let receipt: ReceiptResponse = response
                .json()
                .await
                .map_err(|e| SettlementError::MalformedResponse(e.to_string()))?;

            match receipt.status.as_str() {
                "pending" => {
                    debug!("Transaction {} still pending", handle.0);
                    tokio::time::sleep(self.poll_interval).await;
                }
                "confirmed" => {
                    let value = receipt
                        .value
                        .as_deref()
                        .unwrap_or("0")
                        .parse::<u128>()
                        .map_err(|e| SettlementError::MalformedResponse(e.to_string()))?;
                    return Ok(SettlementOutcome::Confirmed {
                        tx_hash: handle.0.clone(),
                        effects: SettlementEffects {
                            from: receipt.from.unwrap_or_default(),
                            to: receipt.to.unwrap_or_default(),
                            value,
                        },
                    });
                }
                "failed" => {
                    return Ok(SettlementOutcome::Failed {
                        reason: receipt
                            .reason
                            .unwrap_or_else(|| "transaction reverted".to_string()),
                    });
                }
                other => {
                    return Err(SettlementError::MalformedResponse(format!(
                        "unknown receipt status: {}",
                        other
                    )));
                }
            }
        }
    }

    async fn list_owned(&self, principal: &str) -> Result<Vec<String>, EnumerationError> {
        let url = format!("{}/v1/principals/{}/vaults", self.base_url, principal);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EnumerationError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| EnumerationError::Transport(e.to_string()))?;

        let listing: VaultListResponse = response
            .json()
            .await
            .map_err(|e| EnumerationError::Malformed(e.to_string()))?;

        Ok(listing.vaults)
    }

    async fn read_balance(&self, vault: &str) -> Result<u128, ReadError> {
        let body: BalanceResponse = self.get_json(&format!("/v1/vaults/{}/balance", vault)).await?;
        body.balance
            .parse::<u128>()
            .map_err(|e| ReadError::Malformed(e.to_string()))
    }

    async fn read_unlock_time(&self, vault: &str) -> Result<DateTime<Utc>, ReadError> {
        let body: UnlockTimeResponse = self
            .get_json(&format!("/v1/vaults/{}/unlock-time", vault))
            .await?;
        Utc.timestamp_opt(body.unlock_timestamp, 0)
            .single()
            .ok_or_else(|| ReadError::Malformed(format!("bad timestamp: {}", body.unlock_timestamp)))
    }

    async fn read_purpose(&self, vault: &str) -> Result<String, ReadError> {
        let body: PurposeResponse = self.get_json(&format!("/v1/vaults/{}/purpose", vault)).await?;
        Ok(body.purpose)
    }
}
