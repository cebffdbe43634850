use sqlx::SqlitePool;
use tracing::info;

use super::models::ReceiptEntry;
use crate::error::AppResult;

/// Receipt ledger - the durable local record of reconciled outcomes.
///
/// Keyed strictly by settlement transaction hash. Safe under arbitrary
/// interleaving of concurrent reconcilers: writes to different keys never
/// conflict, and a same-key write is last-write-wins.
pub struct ReceiptLedger {
    pool: SqlitePool,
}

impl ReceiptLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Write or replace the entry for `entry.tx_hash`. Idempotent: a
    /// second upsert with the same payload leaves exactly one identical
    /// entry; it never appends.
    pub async fn upsert(&self, entry: &ReceiptEntry) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO receipts (tx_hash, created_at, purpose, amount, penalty, kind, attested, attestation_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(tx_hash) DO UPDATE SET
                created_at = excluded.created_at,
                purpose = excluded.purpose,
                amount = excluded.amount,
                penalty = excluded.penalty,
                kind = excluded.kind,
                attested = excluded.attested,
                attestation_id = excluded.attestation_id
            "#,
        )
        .bind(&entry.tx_hash)
        .bind(entry.created_at)
        .bind(&entry.purpose)
        .bind(&entry.amount)
        .bind(&entry.penalty)
        .bind(entry.kind)
        .bind(entry.attested)
        .bind(&entry.attestation_id)
        .execute(&self.pool)
        .await?;

        info!("Receipt recorded for {}", entry.tx_hash);
        Ok(())
    }

    /// All entries, newest first
    pub async fn list(&self) -> AppResult<Vec<ReceiptEntry>> {
        let entries = sqlx::query_as::<_, ReceiptEntry>(
            r#"
            SELECT tx_hash, created_at, purpose, amount, penalty, kind, attested, attestation_id
            FROM receipts
            ORDER BY created_at DESC, tx_hash
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    pub async fn get(&self, tx_hash: &str) -> AppResult<Option<ReceiptEntry>> {
        let entry = sqlx::query_as::<_, ReceiptEntry>(
            r#"
            SELECT tx_hash, created_at, purpose, amount, penalty, kind, attested, attestation_id
            FROM receipts
            WHERE tx_hash = ?1
            "#,
        )
        .bind(tx_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }
}
