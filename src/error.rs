use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sqlx::migrate::MigrateError;
use thiserror::Error;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),

    #[error("Enumeration error: {0}")]
    Enumeration(#[from] EnumerationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Local pre-submission validation failures.
///
/// Rejected before any settlement-layer call is made, so no state changes
/// anywhere and the caller may simply correct and resubmit.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Deposit amount must be greater than zero")]
    NonPositiveAmount,

    #[error("Lock duration must be at least 1 day")]
    DurationTooShort,

    #[error("Savings purpose must not be empty")]
    EmptyPurpose,

    #[error("Savings purpose exceeds {max} characters")]
    PurposeTooLong { max: usize },

    #[error("Penalty rate {0} bps exceeds 10000")]
    PenaltyOutOfRange(u32),

    #[error("Vault {0} is not owned by this principal")]
    UnknownVault(String),

    #[error("Vault {0} has no locked balance")]
    EmptyVault(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

/// Settlement-layer failures. Always surfaced to the caller; a rejected or
/// failed submission produces no ledger entry, and retry means a fresh
/// ActionRequest.
#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("Submission rejected: {0}")]
    Rejected(String),

    #[error("Transaction {tx_hash} failed: {reason}")]
    TransactionFailed { tx_hash: String, reason: String },

    #[error("Gateway transport error: {0}")]
    Transport(String),

    #[error("Malformed gateway response: {0}")]
    MalformedResponse(String),
}

/// Attestation side-channel failures. These never cross the reconciler
/// boundary: the coordinator downgrades them to an unattested receipt.
#[derive(Error, Debug)]
pub enum AttestationError {
    #[error("Attestation request timed out")]
    Timeout,

    #[error("Attestation service rejected request: {0}")]
    Rejected(String),

    #[error("Attestation transport error: {0}")]
    Transport(String),

    #[error("Malformed attestation response: {0}")]
    MalformedResponse(String),
}

/// A single commitment-record field failed to read. Absorbed per item by
/// the portfolio reader; never fails the batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("Read timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// The owned-vault listing itself failed; no snapshot can be produced.
#[derive(Error, Debug)]
pub enum EnumerationError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AppError::Validation(e) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
            }
            AppError::Settlement(SettlementError::Rejected(reason)) => (
                StatusCode::BAD_REQUEST,
                "SUBMISSION_REJECTED",
                format!("Submission rejected: {}", reason),
            ),
            AppError::Settlement(SettlementError::TransactionFailed { tx_hash, reason }) => (
                StatusCode::BAD_GATEWAY,
                "SETTLEMENT_FAILED",
                format!("Transaction {} failed: {}", tx_hash, reason),
            ),
            AppError::Settlement(e) => (
                StatusCode::BAD_GATEWAY,
                "SETTLEMENT_UNAVAILABLE",
                e.to_string(),
            ),
            AppError::Enumeration(e) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "ENUMERATION_FAILED",
                e.to_string(),
            ),
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Not found: {}", what),
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<MigrateError> for AppError {
    fn from(error: MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("Error converting: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
