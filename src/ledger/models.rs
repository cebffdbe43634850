use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use std::fmt;

/// What kind of settled action a receipt records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ReceiptKind {
    Created,
    Broken,
    Completed,
}

impl ReceiptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptKind::Created => "created",
            ReceiptKind::Broken => "broken",
            ReceiptKind::Completed => "completed",
        }
    }
}

impl fmt::Display for ReceiptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The durable unit: one reconciled outcome per settlement transaction.
///
/// INVARIANT: exactly one entry per tx_hash. Writes are idempotent
/// upserts; the last reconciliation for a given hash wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ReceiptEntry {
    pub tx_hash: String,
    pub created_at: DateTime<Utc>,
    pub purpose: String,
    /// Display-unit decimal string
    pub amount: String,
    /// Penalty withheld, display-unit decimal string (Break only)
    pub penalty: Option<String>,
    pub kind: ReceiptKind,
    /// True iff the attestation attempt succeeded. False still means the
    /// settled action is recorded; only the side channel was degraded.
    pub attested: bool,
    pub attestation_id: Option<String>,
}
