use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::client::SettlementClient;
use super::models::{
    parse_units, ActionRequest, SettlementOutcome, SubmittedAction, TxHandle, MAX_PURPOSE_LEN,
};
use crate::error::{AppResult, SettlementError, ValidationError};
use crate::ledger::ReceiptKind;

/// Pause between outcome polls interrupted by a transport error.
const OUTCOME_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// A validated action, ready for submission, carrying the ingredients the
/// reconciler needs to build the eventual receipt.
#[derive(Debug, Clone)]
pub struct PreparedAction {
    pub principal: String,
    pub action: SubmittedAction,
    pub kind: ReceiptKind,
    pub purpose: String,
    /// Net amount in smallest units. None when the pre-submission balance
    /// read failed; the confirmed transaction's effects fill it in.
    pub amount: Option<u128>,
    /// Penalty withheld in smallest units (Break only)
    pub penalty: Option<u128>,
}

/// Validates and submits one ActionRequest against the settlement layer.
///
/// Never retries a rejected submission; the caller resubmits as a fresh
/// ActionRequest.
pub struct ActionSubmitter {
    settlement: Arc<dyn SettlementClient>,
    default_penalty_bps: u32,
}

impl ActionSubmitter {
    pub fn new(settlement: Arc<dyn SettlementClient>, default_penalty_bps: u32) -> Self {
        Self {
            settlement,
            default_penalty_bps,
        }
    }

    /// Validate locally before any settlement-layer mutation.
    ///
    /// Create checks are strict. Break checks are best-effort: the
    /// settlement layer is authoritative, so a failed ownership or balance
    /// read does not block submission.
    #[instrument(skip(self, request), fields(kind = %request.kind()))]
    pub async fn prepare(&self, principal: &str, request: &ActionRequest) -> AppResult<PreparedAction> {
        match request {
            ActionRequest::Create(params) => {
                let purpose = params.purpose.trim();
                if purpose.is_empty() {
                    return Err(ValidationError::EmptyPurpose.into());
                }
                if purpose.chars().count() > MAX_PURPOSE_LEN {
                    return Err(ValidationError::PurposeTooLong {
                        max: MAX_PURPOSE_LEN,
                    }
                    .into());
                }
                if params.amount <= rust_decimal::Decimal::ZERO {
                    return Err(ValidationError::NonPositiveAmount.into());
                }
                if params.duration_days < 1 {
                    return Err(ValidationError::DurationTooShort.into());
                }
                if params.penalty_bps > 10_000 {
                    return Err(ValidationError::PenaltyOutOfRange(params.penalty_bps).into());
                }

                let value = parse_units(params.amount)?;
                let unlock_timestamp =
                    (Utc::now() + chrono::Duration::days(params.duration_days as i64)).timestamp();

                Ok(PreparedAction {
                    principal: principal.to_string(),
                    action: SubmittedAction::CreateVault {
                        principal: principal.to_string(),
                        purpose: purpose.to_string(),
                        unlock_timestamp,
                        penalty_bps: params.penalty_bps,
                        value: value.to_string(),
                    },
                    kind: ReceiptKind::Created,
                    purpose: purpose.to_string(),
                    amount: Some(value),
                    penalty: None,
                })
            }
            ActionRequest::Break { vault } => {
                match self.settlement.list_owned(principal).await {
                    Ok(owned) if !owned.iter().any(|v| v == vault) => {
                        return Err(ValidationError::UnknownVault(vault.clone()).into());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Ownership check skipped for {}: {}", vault, e);
                    }
                }

                let (amount, penalty) = match self.settlement.read_balance(vault).await {
                    Ok(0) => return Err(ValidationError::EmptyVault(vault.clone()).into()),
                    Ok(balance) => {
                        let bps = self.default_penalty_bps as u128;
                        // Divide-first fallback loses at most a rounding
                        // unit when balance * bps would overflow
                        let penalty = balance
                            .checked_mul(bps)
                            .map(|scaled| scaled / 10_000)
                            .unwrap_or_else(|| balance / 10_000 * bps);
                        (Some(balance - penalty), Some(penalty))
                    }
                    Err(e) => {
                        warn!("Balance read failed for {}, deferring to effects: {}", vault, e);
                        (None, None)
                    }
                };

                let purpose = match self.settlement.read_purpose(vault).await {
                    Ok(p) if !p.is_empty() => p,
                    _ => "Vault Broken".to_string(),
                };

                Ok(PreparedAction {
                    principal: principal.to_string(),
                    action: SubmittedAction::BreakVault {
                        principal: principal.to_string(),
                        vault: vault.clone(),
                    },
                    kind: ReceiptKind::Broken,
                    purpose,
                    amount,
                    penalty,
                })
            }
        }
    }

    /// Submit the prepared action. Exactly one settlement-layer mutation
    /// per eventual Confirmed outcome.
    pub async fn submit(&self, prepared: &PreparedAction) -> Result<TxHandle, SettlementError> {
        info!(
            "Submitting {} action for principal {}",
            prepared.kind.as_str(),
            prepared.principal
        );
        self.settlement.submit(&prepared.action).await
    }

    /// Wait for the transaction's terminal outcome.
    ///
    /// A dropped poll is not a verdict on the transaction: the submission
    /// already happened and the gateway may well confirm it, so transport
    /// errors here are retried rather than reported as settlement failure.
    pub async fn await_outcome(
        &self,
        handle: &TxHandle,
    ) -> Result<SettlementOutcome, SettlementError> {
        loop {
            match self.settlement.await_outcome(handle).await {
                Err(SettlementError::Transport(reason)) => {
                    warn!(
                        "Outcome poll for {} interrupted, retrying: {}",
                        handle.0, reason
                    );
                    tokio::time::sleep(OUTCOME_RETRY_BACKOFF).await;
                }
                result => return result,
            }
        }
    }
}
