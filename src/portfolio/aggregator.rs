use rust_decimal::Decimal;
use serde::Serialize;

use super::reader::VaultReadResult;
use crate::settlement::models::format_units;

/// Portfolio totals derived from one batch of commitment-record reads.
/// Ephemeral: recomputed from scratch on every new batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortfolioSnapshot {
    /// Sum of successfully-read balances, display units
    pub total_locked: Decimal,
    /// Vaults with a successfully-read balance > 0
    pub active_count: usize,
    /// Vaults with a successfully-read balance == 0
    pub completed_count: usize,
    /// Vaults whose balance read succeeded
    pub known_count: usize,
    /// Vaults excluded because their balance read failed
    pub failed_count: usize,
}

/// Reduce one read batch into portfolio totals.
///
/// A record contributes only if its balance read succeeded; failed reads
/// are unknown and excluded from every sum, never treated as zero.
/// Completion is balance exhaustion, so an unlock-time read failure does
/// not exclude a record that has a known balance.
pub fn aggregate(records: &[VaultReadResult]) -> PortfolioSnapshot {
    let mut total: u128 = 0;
    let mut active = 0;
    let mut completed = 0;
    let mut failed = 0;

    for record in records {
        match &record.balance {
            Ok(balance) => {
                total = total.saturating_add(*balance);
                if *balance > 0 {
                    active += 1;
                } else {
                    completed += 1;
                }
            }
            Err(_) => failed += 1,
        }
    }

    PortfolioSnapshot {
        total_locked: format_units(total),
        active_count: active,
        completed_count: completed,
        known_count: active + completed,
        failed_count: failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReadError;
    use crate::settlement::models::parse_units;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn record(address: &str, balance: Result<u128, ReadError>) -> VaultReadResult {
        VaultReadResult {
            address: address.to_string(),
            balance,
            unlock_time: Ok(Utc::now()),
            purpose: Ok("test".to_string()),
        }
    }

    #[test]
    fn test_failed_reads_excluded() {
        // 3 vaults, one balance read fails: totals reflect the other two only
        let batch = vec![
            record("0xvault1", Ok(parse_units(dec!(100)).unwrap())),
            record("0xvault2", Err(ReadError::Transport("rpc hiccup".to_string()))),
            record("0xvault3", Ok(parse_units(dec!(50)).unwrap())),
        ];

        let snapshot = aggregate(&batch);
        assert_eq!(snapshot.total_locked, dec!(150));
        assert_eq!(snapshot.active_count, 2);
        assert_eq!(snapshot.completed_count, 0);
        assert_eq!(snapshot.known_count, 2);
        assert_eq!(snapshot.failed_count, 1);
    }

    #[test]
    fn test_zero_balance_counts_completed() {
        let batch = vec![
            record("0xvault1", Ok(parse_units(dec!(25)).unwrap())),
            record("0xvault2", Ok(0)),
        ];

        let snapshot = aggregate(&batch);
        assert_eq!(snapshot.total_locked, dec!(25));
        assert_eq!(snapshot.active_count, 1);
        assert_eq!(snapshot.completed_count, 1);
    }

    #[test]
    fn test_unlock_time_failure_does_not_exclude() {
        // Completion is defined by balance exhaustion, not unlock time
        let mut rec = record("0xvault1", Ok(parse_units(dec!(10)).unwrap()));
        rec.unlock_time = Err(ReadError::Timeout);

        let snapshot = aggregate(&[rec]);
        assert_eq!(snapshot.active_count, 1);
        assert_eq!(snapshot.total_locked, dec!(10));
    }

    #[test]
    fn test_empty_batch() {
        let snapshot = aggregate(&[]);
        assert_eq!(snapshot.total_locked, Decimal::ZERO);
        assert_eq!(snapshot.known_count, 0);
        assert_eq!(snapshot.failed_count, 0);
    }

    #[test]
    fn test_deterministic() {
        let batch = vec![record("0xvault1", Ok(parse_units(dec!(7)).unwrap()))];
        assert_eq!(aggregate(&batch), aggregate(&batch));
    }
}
