use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::error::AttestationError;
use crate::ledger::ReceiptKind;

/// Outcome of the attestation attempt for one settlement transaction.
/// Produced at most once per tx_hash; never blocks settlement finality.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttestationOutcome {
    NotAttempted,
    Succeeded { attestation_id: String },
    Failed { reason: String },
}

impl AttestationOutcome {
    pub fn attestation_id(&self) -> Option<&str> {
        match self {
            AttestationOutcome::Succeeded { attestation_id } => Some(attestation_id),
            _ => None,
        }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, AttestationOutcome::Succeeded { .. })
    }
}

/// Payload sent to the attestation service for one confirmed transaction
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptTemplate {
    pub kind: ReceiptKind,
    /// Display-unit amount
    pub amount: Decimal,
    pub from: String,
    pub to: String,
    pub purpose: String,
    pub transaction_hash: String,
}

/// Attestation service collaborator
#[async_trait]
pub trait AttestationClient: Send + Sync {
    async fn attest(&self, template: &ReceiptTemplate) -> Result<String, AttestationError>;
}

#[derive(Debug, Deserialize)]
struct AttestResponse {
    id: String,
}

/// HTTP client for the external attestation service
pub struct HttpAttestationClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpAttestationClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl AttestationClient for HttpAttestationClient {
    async fn attest(&self, template: &ReceiptTemplate) -> Result<String, AttestationError> {
        let url = format!("{}/v1/receipts", self.base_url);
        let mut request = self.client.post(&url).json(template);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AttestationError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AttestationError::Rejected(format!("{}: {}", status, body)));
        }

        let attested: AttestResponse = response
            .json()
            .await
            .map_err(|e| AttestationError::MalformedResponse(e.to_string()))?;

        Ok(attested.id)
    }
}

/// Fire-once, best-effort side channel for independent receipts.
///
/// Invoked exactly once per Confirmed settlement. Classifies the attempt
/// and hands the outcome back; errors never escape this boundary and the
/// attempt is never retried, since a retry could duplicate attestation
/// records on the external side while the user's funds are already settled.
pub struct AttestationCoordinator {
    client: Arc<dyn AttestationClient>,
    timeout: Duration,
}

impl AttestationCoordinator {
    pub fn new(client: Arc<dyn AttestationClient>, timeout_ms: u64) -> Self {
        Self {
            client,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[instrument(skip(self, template), fields(tx_hash = %template.transaction_hash))]
    pub async fn attest_once(&self, template: ReceiptTemplate) -> AttestationOutcome {
        match tokio::time::timeout(self.timeout, self.client.attest(&template)).await {
            Ok(Ok(attestation_id)) => {
                info!(
                    "Attestation succeeded for {}: {}",
                    template.transaction_hash, attestation_id
                );
                AttestationOutcome::Succeeded { attestation_id }
            }
            Ok(Err(e)) => {
                warn!(
                    "Attestation failed for {}: {}",
                    template.transaction_hash, e
                );
                AttestationOutcome::Failed {
                    reason: e.to_string(),
                }
            }
            Err(_) => {
                warn!(
                    "Attestation timed out for {} after {:?}",
                    template.transaction_hash, self.timeout
                );
                AttestationOutcome::Failed {
                    reason: AttestationError::Timeout.to_string(),
                }
            }
        }
    }
}
