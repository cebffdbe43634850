use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

use crate::error::{EnumerationError, ReadError};
use crate::settlement::SettlementClient;

/// Per-vault read result. One entry per enumerated address, in
/// enumeration order, with each field independently succeeded or failed.
#[derive(Debug, Clone)]
pub struct VaultReadResult {
    pub address: String,
    pub balance: Result<u128, ReadError>,
    pub unlock_time: Result<DateTime<Utc>, ReadError>,
    pub purpose: Result<String, ReadError>,
}

/// Reads a principal's commitment records from the settlement layer.
///
/// Enumeration failure is fatal to the batch; per-field read failures are
/// captured in place and never raised. All per-vault reads fan out
/// concurrently and the batch joins before anything is returned, so a
/// snapshot is always computed from one consistent batch boundary.
pub struct VaultReader {
    settlement: Arc<dyn SettlementClient>,
    read_timeout: Duration,
}

impl VaultReader {
    pub fn new(settlement: Arc<dyn SettlementClient>, read_timeout_ms: u64) -> Self {
        Self {
            settlement,
            read_timeout: Duration::from_millis(read_timeout_ms),
        }
    }

    #[instrument(skip(self))]
    pub async fn read_portfolio(
        &self,
        principal: &str,
    ) -> Result<Vec<VaultReadResult>, EnumerationError> {
        let addresses = self.settlement.list_owned(principal).await?;
        info!("Enumerated {} vaults for {}", addresses.len(), principal);

        let reads = addresses.into_iter().map(|address| self.read_vault(address));
        Ok(join_all(reads).await)
    }

    async fn read_vault(&self, address: String) -> VaultReadResult {
        let (balance, unlock_time, purpose) = tokio::join!(
            self.bounded(self.settlement.read_balance(&address)),
            self.bounded(self.settlement.read_unlock_time(&address)),
            self.bounded(self.settlement.read_purpose(&address)),
        );

        VaultReadResult {
            address,
            balance,
            unlock_time,
            purpose,
        }
    }

    async fn bounded<T>(
        &self,
        read: impl Future<Output = Result<T, ReadError>>,
    ) -> Result<T, ReadError> {
        match tokio::time::timeout(self.read_timeout, read).await {
            Ok(result) => result,
            Err(_) => Err(ReadError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SettlementError;
    use crate::settlement::models::{SettlementOutcome, SubmittedAction, TxHandle};
    use async_trait::async_trait;

    struct PartialFailureClient;

    #[async_trait]
    impl SettlementClient for PartialFailureClient {
        async fn submit(&self, _action: &SubmittedAction) -> Result<TxHandle, SettlementError> {
            unimplemented!("reads only")
        }

        async fn await_outcome(
            &self,
            _handle: &TxHandle,
        ) -> Result<SettlementOutcome, SettlementError> {
            unimplemented!("reads only")
        }

        async fn list_owned(&self, _principal: &str) -> Result<Vec<String>, EnumerationError> {
            Ok(vec![
                "0xvault1".to_string(),
                "0xvault2".to_string(),
                "0xvault3".to_string(),
            ])
        }

        async fn read_balance(&self, vault: &str) -> Result<u128, ReadError> {
            match vault {
                "0xvault1" => Ok(100),
                "0xvault2" => Err(ReadError::Transport("rpc hiccup".to_string())),
                _ => Ok(0),
            }
        }

        async fn read_unlock_time(&self, _vault: &str) -> Result<DateTime<Utc>, ReadError> {
            Ok(Utc::now())
        }

        async fn read_purpose(&self, vault: &str) -> Result<String, ReadError> {
            Ok(format!("purpose of {}", vault))
        }
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_failures() {
        let reader = VaultReader::new(Arc::new(PartialFailureClient), 1000);
        let batch = reader.read_portfolio("0xuser").await.unwrap();

        // Same length and order as enumeration, failed field held in place
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].address, "0xvault1");
        assert_eq!(batch[0].balance, Ok(100));
        assert!(batch[1].balance.is_err());
        assert_eq!(batch[2].balance, Ok(0));
    }

    struct DownClient;

    #[async_trait]
    impl SettlementClient for DownClient {
        async fn submit(&self, _action: &SubmittedAction) -> Result<TxHandle, SettlementError> {
            unimplemented!()
        }

        async fn await_outcome(
            &self,
            _handle: &TxHandle,
        ) -> Result<SettlementOutcome, SettlementError> {
            unimplemented!()
        }

        async fn list_owned(&self, _principal: &str) -> Result<Vec<String>, EnumerationError> {
            Err(EnumerationError::Transport("gateway down".to_string()))
        }

        async fn read_balance(&self, _vault: &str) -> Result<u128, ReadError> {
            unimplemented!()
        }

        async fn read_unlock_time(&self, _vault: &str) -> Result<DateTime<Utc>, ReadError> {
            unimplemented!()
        }

        async fn read_purpose(&self, _vault: &str) -> Result<String, ReadError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn test_enumeration_failure_is_fatal() {
        let reader = VaultReader::new(Arc::new(DownClient), 1000);
        assert!(reader.read_portfolio("0xuser").await.is_err());
    }
}
