use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::error::ValidationError;

/// The settlement layer counts in integer smallest units; receipts and
/// portfolio totals use display units. One display unit = 10^18 smallest.
pub const UNIT_DECIMALS: u32 = 18;

/// Maximum length of a savings purpose label.
pub const MAX_PURPOSE_LEN: usize = 50;

/// Kind of state-changing action against the settlement layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Create,
    Break,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Break => "break",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parameters for creating a new time-locked vault
#[derive(Debug, Clone)]
pub struct CreateParams {
    pub purpose: String,
    /// Deposit amount in display units
    pub amount: Decimal,
    pub duration_days: u32,
    pub penalty_bps: u32,
}

/// User intent, immutable once submitted
#[derive(Debug, Clone)]
pub enum ActionRequest {
    Create(CreateParams),
    Break { vault: String },
}

impl ActionRequest {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionRequest::Create(_) => ActionKind::Create,
            ActionRequest::Break { .. } => ActionKind::Break,
        }
    }
}

/// Chain-level payload submitted to the settlement gateway
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmittedAction {
    CreateVault {
        principal: String,
        purpose: String,
        unlock_timestamp: i64,
        penalty_bps: u32,
        /// Deposit value in smallest units, decimal string
        value: String,
    },
    BreakVault {
        principal: String,
        vault: String,
    },
}

/// Opaque handle for a submitted transaction, used to await its outcome
#[derive(Debug, Clone)]
pub struct TxHandle(pub String);

/// Effects of a confirmed settlement transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementEffects {
    pub from: String,
    pub to: String,
    /// Value transferred in smallest units
    pub value: u128,
}

/// Outcome of one submission. Starts Pending and transitions exactly once
/// to Confirmed or Failed; never back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SettlementOutcome {
    Pending,
    Confirmed {
        tx_hash: String,
        effects: SettlementEffects,
    },
    Failed {
        reason: String,
    },
}

/// Convert a display-unit amount to smallest units.
///
/// Rejects negative amounts and amounts carrying more precision than the
/// settlement layer can represent.
pub fn parse_units(amount: Decimal) -> Result<u128, ValidationError> {
    if amount.is_sign_negative() {
        return Err(ValidationError::InvalidAmount(amount.to_string()));
    }
    let scale = Decimal::from(10u64.pow(UNIT_DECIMALS));
    let scaled = amount
        .checked_mul(scale)
        .ok_or_else(|| ValidationError::InvalidAmount(amount.to_string()))?;
    if scaled.fract() != Decimal::ZERO {
        return Err(ValidationError::InvalidAmount(amount.to_string()));
    }
    scaled
        .to_u128()
        .ok_or_else(|| ValidationError::InvalidAmount(amount.to_string()))
}

/// Convert smallest units to a display-unit decimal.
pub fn format_units(value: u128) -> Decimal {
    match i128::try_from(value)
        .ok()
        .and_then(|v| Decimal::try_from_i128_with_scale(v, UNIT_DECIMALS).ok())
    {
        Some(d) => d.normalize(),
        None => {
            // Out of Decimal range; a real vault balance never gets here
            warn!("Balance {} exceeds display precision, clamping", value);
            Decimal::MAX
        }
    }
}
