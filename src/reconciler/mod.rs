pub mod tracker;

pub use tracker::{ActionTracker, ActionUpdate};

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::attestation::{AttestationCoordinator, AttestationOutcome, ReceiptTemplate};
use crate::error::{AppResult, SettlementError};
use crate::ledger::{ReceiptEntry, ReceiptLedger};
use crate::settlement::models::{format_units, SettlementOutcome};
use crate::settlement::{ActionSubmitter, PreparedAction};

/// Reconciler states for one action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileState {
    AwaitingSettlement,
    AwaitingAttestation,
    Reconciled,
}

/// Orchestrates submit -> attest -> record for one ActionRequest.
///
/// Phase 1 (settlement) is authoritative and durable; phase 2
/// (attestation) is best-effort metadata. A ReceiptEntry is written if
/// and only if settlement confirmed; the attestation outcome only decides
/// the `attested` flag, never whether the entry exists. A user whose
/// funds moved always keeps a record, even with the side channel offline.
pub struct Reconciler {
    submitter: Arc<ActionSubmitter>,
    attestation: Arc<AttestationCoordinator>,
    ledger: Arc<ReceiptLedger>,
    tracker: Arc<ActionTracker>,
}

impl Reconciler {
    pub fn new(
        submitter: Arc<ActionSubmitter>,
        attestation: Arc<AttestationCoordinator>,
        ledger: Arc<ReceiptLedger>,
        tracker: Arc<ActionTracker>,
    ) -> Self {
        Self {
            submitter,
            attestation,
            ledger,
            tracker,
        }
    }

    /// Drive one prepared action to its terminal state.
    #[instrument(skip(self, prepared), fields(action_id = %action_id, kind = %prepared.kind))]
    pub async fn run(&self, action_id: Uuid, prepared: PreparedAction) -> AppResult<ReceiptEntry> {
        let handle = match self.submitter.submit(&prepared).await {
            Ok(handle) => handle,
            Err(e) => {
                self.publish(
                    action_id,
                    ReconcileState::AwaitingSettlement,
                    SettlementOutcome::Failed {
                        reason: e.to_string(),
                    },
                    AttestationOutcome::NotAttempted,
                );
                return Err(e.into());
            }
        };

        self.publish(
            action_id,
            ReconcileState::AwaitingSettlement,
            SettlementOutcome::Pending,
            AttestationOutcome::NotAttempted,
        );

        let outcome = match self.submitter.await_outcome(&handle).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.publish(
                    action_id,
                    ReconcileState::AwaitingSettlement,
                    SettlementOutcome::Failed {
                        reason: e.to_string(),
                    },
                    AttestationOutcome::NotAttempted,
                );
                return Err(e.into());
            }
        };

        let (tx_hash, effects) = match outcome {
            SettlementOutcome::Confirmed { tx_hash, effects } => (tx_hash, effects),
            SettlementOutcome::Failed { reason } => {
                // No ledger write on a failed settlement; the flow ends here
                error!("Settlement failed for action {}: {}", action_id, reason);
                self.publish(
                    action_id,
                    ReconcileState::AwaitingSettlement,
                    SettlementOutcome::Failed {
                        reason: reason.clone(),
                    },
                    AttestationOutcome::NotAttempted,
                );
                return Err(SettlementError::TransactionFailed {
                    tx_hash: handle.0,
                    reason,
                }
                .into());
            }
            SettlementOutcome::Pending => {
                return Err(SettlementError::MalformedResponse(
                    "await_outcome returned a non-terminal outcome".to_string(),
                )
                .into());
            }
        };

        info!("Settlement confirmed: {}", tx_hash);
        let confirmed = SettlementOutcome::Confirmed {
            tx_hash: tx_hash.clone(),
            effects: effects.clone(),
        };
        self.publish(
            action_id,
            ReconcileState::AwaitingAttestation,
            confirmed.clone(),
            AttestationOutcome::NotAttempted,
        );

        // The pre-submission balance read may have failed for a break; the
        // confirmed effects carry the transferred value in that case
        let amount = prepared.amount.unwrap_or(effects.value);

        let attestation = self
            .attestation
            .attest_once(ReceiptTemplate {
                kind: prepared.kind,
                amount: format_units(amount),
                from: effects.from.clone(),
                to: effects.to.clone(),
                purpose: prepared.purpose.clone(),
                transaction_hash: tx_hash.clone(),
            })
            .await;

        let entry = ReceiptEntry {
            tx_hash: tx_hash.clone(),
            created_at: Utc::now(),
            purpose: prepared.purpose,
            amount: format_units(amount).to_string(),
            penalty: prepared.penalty.map(|p| format_units(p).to_string()),
            kind: prepared.kind,
            attested: attestation.is_succeeded(),
            attestation_id: attestation.attestation_id().map(str::to_string),
        };
        self.ledger.upsert(&entry).await?;

        self.publish(action_id, ReconcileState::Reconciled, confirmed, attestation);
        info!("Action {} reconciled into receipt {}", action_id, tx_hash);
        Ok(entry)
    }

    fn publish(
        &self,
        action_id: Uuid,
        state: ReconcileState,
        settlement: SettlementOutcome,
        attestation: AttestationOutcome,
    ) {
        self.tracker.publish(ActionUpdate {
            action_id,
            state,
            settlement,
            attestation,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::AttestationClient;
    use crate::error::{AppError, AttestationError, EnumerationError, ReadError};
    use crate::ledger::ReceiptKind;
    use crate::settlement::models::{
        parse_units, ActionRequest, CreateParams, SettlementEffects, SubmittedAction, TxHandle,
    };
    use crate::settlement::SettlementClient;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::time::Duration;

    enum SettlementScript {
        Confirm { value: u128 },
        Fail,
    }

    struct ScriptedSettlement {
        script: SettlementScript,
        balance: Option<u128>,
        transient_failures: usize,
        outcome_polls: std::sync::atomic::AtomicUsize,
    }

    impl ScriptedSettlement {
        fn new(script: SettlementScript, balance: Option<u128>) -> Self {
            Self {
                script,
                balance,
                transient_failures: 0,
                outcome_polls: std::sync::atomic::AtomicUsize::new(0),
            }
        }

        fn with_transient_failures(mut self, failures: usize) -> Self {
            self.transient_failures = failures;
            self
        }
    }

    #[async_trait]
    impl SettlementClient for ScriptedSettlement {
        async fn submit(&self, _action: &SubmittedAction) -> Result<TxHandle, SettlementError> {
            Ok(TxHandle("0xtx1".to_string()))
        }

        async fn await_outcome(
            &self,
            handle: &TxHandle,
        ) -> Result<SettlementOutcome, SettlementError> {
            let poll = self
                .outcome_polls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if poll < self.transient_failures {
                return Err(SettlementError::Transport(
                    "connection reset by peer".to_string(),
                ));
            }
            match self.script {
                SettlementScript::Confirm { value } => Ok(SettlementOutcome::Confirmed {
                    tx_hash: handle.0.clone(),
                    effects: SettlementEffects {
                        from: "0xuser".to_string(),
                        to: "0xfactory".to_string(),
                        value,
                    },
                }),
                SettlementScript::Fail => Ok(SettlementOutcome::Failed {
                    reason: "reverted".to_string(),
                }),
            }
        }

        async fn list_owned(&self, _principal: &str) -> Result<Vec<String>, EnumerationError> {
            Ok(vec!["0xvault1".to_string()])
        }

        async fn read_balance(&self, _vault: &str) -> Result<u128, ReadError> {
            self.balance
                .ok_or_else(|| ReadError::Transport("down".to_string()))
        }

        async fn read_unlock_time(&self, _vault: &str) -> Result<DateTime<Utc>, ReadError> {
            Ok(Utc::now())
        }

        async fn read_purpose(&self, _vault: &str) -> Result<String, ReadError> {
            Ok("Emergency Fund".to_string())
        }
    }

    enum AttestScript {
        Succeed,
        Hang,
    }

    struct ScriptedAttestation {
        script: AttestScript,
    }

    #[async_trait]
    impl AttestationClient for ScriptedAttestation {
        async fn attest(&self, _template: &ReceiptTemplate) -> Result<String, AttestationError> {
            match self.script {
                AttestScript::Succeed => Ok("att_1".to_string()),
                AttestScript::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    unreachable!("coordinator timeout should fire first")
                }
            }
        }
    }

    struct Harness {
        reconciler: Reconciler,
        submitter: Arc<ActionSubmitter>,
        ledger: Arc<ReceiptLedger>,
        tracker: Arc<ActionTracker>,
    }

    async fn harness(settlement: ScriptedSettlement, attest: AttestScript) -> Harness {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        let settlement: Arc<dyn SettlementClient> = Arc::new(settlement);
        let submitter = Arc::new(ActionSubmitter::new(settlement, 1000));
        let coordinator = Arc::new(AttestationCoordinator::new(
            Arc::new(ScriptedAttestation { script: attest }),
            100,
        ));
        let ledger = Arc::new(ReceiptLedger::new(pool));
        let tracker = Arc::new(ActionTracker::new());

        Harness {
            reconciler: Reconciler::new(
                submitter.clone(),
                coordinator,
                ledger.clone(),
                tracker.clone(),
            ),
            submitter,
            ledger,
            tracker,
        }
    }

    fn create_request() -> ActionRequest {
        ActionRequest::Create(CreateParams {
            purpose: "New Laptop".to_string(),
            amount: dec!(100),
            duration_days: 30,
            penalty_bps: 1000,
        })
    }

    #[tokio::test]
    async fn test_confirmed_and_attested_create() {
        let h = harness(
            ScriptedSettlement::new(
                SettlementScript::Confirm {
                    value: parse_units(dec!(100)).unwrap(),
                },
                None,
            ),
            AttestScript::Succeed,
        )
        .await;

        let action_id = Uuid::new_v4();
        h.tracker.register(action_id);
        let prepared = h.submitter.prepare("0xuser", &create_request()).await.unwrap();
        h.reconciler.run(action_id, prepared).await.unwrap();

        let entries = h.ledger.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, ReceiptKind::Created);
        assert_eq!(entries[0].amount, "100");
        assert!(entries[0].attested);
        assert_eq!(entries[0].attestation_id.as_deref(), Some("att_1"));

        let latest = h.tracker.latest(action_id).unwrap();
        assert_eq!(latest.state, ReconcileState::Reconciled);
    }

    #[tokio::test]
    async fn test_attestation_timeout_still_records_receipt() {
        let h = harness(
            ScriptedSettlement::new(
                SettlementScript::Confirm {
                    value: parse_units(dec!(100)).unwrap(),
                },
                None,
            ),
            AttestScript::Hang,
        )
        .await;

        let action_id = Uuid::new_v4();
        h.tracker.register(action_id);
        let prepared = h.submitter.prepare("0xuser", &create_request()).await.unwrap();

        // The flow completes normally; the degraded side channel is absorbed
        let entry = h.reconciler.run(action_id, prepared).await.unwrap();
        assert_eq!(entry.kind, ReceiptKind::Created);
        assert!(!entry.attested);
        assert!(entry.attestation_id.is_none());

        let entries = h.ledger.list().await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_break_receipt_records_penalty() {
        // Balance 200, default 10% penalty: receive 180, forfeit 20
        let h = harness(
            ScriptedSettlement::new(
                SettlementScript::Confirm {
                    value: parse_units(dec!(180)).unwrap(),
                },
                Some(parse_units(dec!(200)).unwrap()),
            ),
            AttestScript::Succeed,
        )
        .await;

        let action_id = Uuid::new_v4();
        h.tracker.register(action_id);
        let prepared = h
            .submitter
            .prepare(
                "0xuser",
                &ActionRequest::Break {
                    vault: "0xvault1".to_string(),
                },
            )
            .await
            .unwrap();
        h.reconciler.run(action_id, prepared).await.unwrap();

        let entry = h.ledger.get("0xtx1").await.unwrap().unwrap();
        assert_eq!(entry.kind, ReceiptKind::Broken);
        assert_eq!(entry.amount, "180");
        assert_eq!(entry.penalty.as_deref(), Some("20"));
    }

    #[tokio::test]
    async fn test_interrupted_outcome_poll_still_reconciles() {
        // The poll GET drops twice after a successful submit; the action
        // must still confirm and keep its receipt, never end up recorded
        // as failed
        let h = harness(
            ScriptedSettlement::new(
                SettlementScript::Confirm {
                    value: parse_units(dec!(100)).unwrap(),
                },
                None,
            )
            .with_transient_failures(2),
            AttestScript::Succeed,
        )
        .await;

        let action_id = Uuid::new_v4();
        h.tracker.register(action_id);
        let prepared = h.submitter.prepare("0xuser", &create_request()).await.unwrap();

        h.reconciler.run(action_id, prepared).await.unwrap();

        let entries = h.ledger.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, ReceiptKind::Created);

        let latest = h.tracker.latest(action_id).unwrap();
        assert_eq!(latest.state, ReconcileState::Reconciled);
        assert!(matches!(
            latest.settlement,
            SettlementOutcome::Confirmed { .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_settlement_writes_nothing() {
        let h = harness(
            ScriptedSettlement::new(SettlementScript::Fail, None),
            AttestScript::Succeed,
        )
        .await;

        let action_id = Uuid::new_v4();
        h.tracker.register(action_id);
        let prepared = h.submitter.prepare("0xuser", &create_request()).await.unwrap();

        let result = h.reconciler.run(action_id, prepared).await;
        assert!(matches!(
            result,
            Err(AppError::Settlement(SettlementError::TransactionFailed { .. }))
        ));
        assert!(h.ledger.list().await.unwrap().is_empty());

        let latest = h.tracker.latest(action_id).unwrap();
        assert!(latest.is_terminal());
        assert!(matches!(
            latest.settlement,
            SettlementOutcome::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_rerun_same_transaction_does_not_duplicate() {
        let h = harness(
            ScriptedSettlement::new(
                SettlementScript::Confirm {
                    value: parse_units(dec!(100)).unwrap(),
                },
                None,
            ),
            AttestScript::Succeed,
        )
        .await;

        let prepared = h.submitter.prepare("0xuser", &create_request()).await.unwrap();

        for _ in 0..2 {
            let action_id = Uuid::new_v4();
            h.tracker.register(action_id);
            h.reconciler.run(action_id, prepared.clone()).await.unwrap();
        }

        // Both runs settled as 0xtx1; the ledger holds exactly one entry
        assert_eq!(h.ledger.list().await.unwrap().len(), 1);
    }
}
