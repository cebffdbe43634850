use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::ReceiptEntry;
use crate::portfolio::{PortfolioSnapshot, VaultReadResult};
use crate::reconciler::ReconcileState;
use crate::settlement::models::{format_units, ActionRequest, CreateParams};

// ========== REQUEST MODELS ==========

/// Submit a vault action for settlement and reconciliation
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmitActionRequest {
    Create {
        principal: String,
        purpose: String,
        /// Display-unit amount to lock
        amount: Decimal,
        duration_days: u32,
        /// Basis points withheld on early exit; server default when omitted
        penalty_bps: Option<u32>,
    },
    Break {
        principal: String,
        vault: String,
    },
}

impl SubmitActionRequest {
    pub fn principal(&self) -> &str {
        match self {
            SubmitActionRequest::Create { principal, .. } => principal,
            SubmitActionRequest::Break { principal, .. } => principal,
        }
    }

    pub fn into_action(self, default_penalty_bps: u32) -> ActionRequest {
        match self {
            SubmitActionRequest::Create {
                purpose,
                amount,
                duration_days,
                penalty_bps,
                ..
            } => ActionRequest::Create(CreateParams {
                purpose,
                amount,
                duration_days,
                penalty_bps: penalty_bps.unwrap_or(default_penalty_bps),
            }),
            SubmitActionRequest::Break { vault, .. } => ActionRequest::Break { vault },
        }
    }
}

// ========== RESPONSE MODELS ==========

#[derive(Debug, Serialize)]
pub struct SubmitActionResponse {
    pub action_id: Uuid,
    pub state: ReconcileState,
}

#[derive(Debug, Serialize)]
pub struct ReceiptListResponse {
    pub count: usize,
    pub receipts: Vec<ReceiptEntry>,
}

/// One vault's reads, with per-field failure preserved
#[derive(Debug, Serialize)]
pub struct VaultView {
    pub address: String,
    pub balance: Option<Decimal>,
    pub unlock_time: Option<DateTime<Utc>>,
    pub purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_error: Option<String>,
}

impl From<&VaultReadResult> for VaultView {
    fn from(result: &VaultReadResult) -> Self {
        let read_error = result.balance.as_ref().err().map(|e| e.to_string());
        VaultView {
            address: result.address.clone(),
            balance: result.balance.as_ref().ok().map(|b| format_units(*b)),
            unlock_time: result.unlock_time.as_ref().ok().copied(),
            purpose: result.purpose.as_ref().ok().cloned(),
            read_error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PortfolioResponse {
    pub principal: String,
    #[serde(flatten)]
    pub snapshot: PortfolioSnapshot,
    pub vaults: Vec<VaultView>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: DateTime<Utc>,
}
