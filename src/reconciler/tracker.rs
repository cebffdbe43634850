use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use uuid::Uuid;

/// How long a finished action stays pollable before it is evicted.
const DEFAULT_RETENTION: Duration = Duration::from_secs(600);

use super::ReconcileState;
use crate::attestation::AttestationOutcome;
use crate::settlement::models::SettlementOutcome;

/// One staged update of a live action, as published to callers
#[derive(Debug, Clone, Serialize)]
pub struct ActionUpdate {
    pub action_id: Uuid,
    pub state: ReconcileState,
    pub settlement: SettlementOutcome,
    pub attestation: AttestationOutcome,
}

impl ActionUpdate {
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, ReconcileState::Reconciled)
            || matches!(self.settlement, SettlementOutcome::Failed { .. })
    }
}

struct ActionEntry {
    latest: ActionUpdate,
    sender: broadcast::Sender<ActionUpdate>,
    terminal_at: Option<Instant>,
}

/// In-memory registry of live and recently finished actions.
///
/// Callers poll the latest update or subscribe to the broadcast stream.
/// Dropping a subscription is abandonment in the "stop observing" sense:
/// the reconciler keeps running and still writes its ledger entry.
/// Terminal entries stay pollable for the retention window, then get
/// evicted on the next registration; live entries are never evicted.
pub struct ActionTracker {
    actions: RwLock<HashMap<Uuid, ActionEntry>>,
    retention: Duration,
}

impl ActionTracker {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            actions: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Register a freshly submitted action in its initial state.
    pub fn register(&self, action_id: Uuid) {
        let (sender, _) = broadcast::channel(16);
        let initial = ActionUpdate {
            action_id,
            state: ReconcileState::AwaitingSettlement,
            settlement: SettlementOutcome::Pending,
            attestation: AttestationOutcome::NotAttempted,
        };
        let mut actions = self.actions.write();
        actions.retain(|_, entry| match entry.terminal_at {
            Some(finished) => finished.elapsed() < self.retention,
            None => true,
        });
        actions.insert(
            action_id,
            ActionEntry {
                latest: initial,
                sender,
                terminal_at: None,
            },
        );
    }

    pub fn publish(&self, update: ActionUpdate) {
        let mut actions = self.actions.write();
        if let Some(entry) = actions.get_mut(&update.action_id) {
            if update.is_terminal() && entry.terminal_at.is_none() {
                entry.terminal_at = Some(Instant::now());
            }
            entry.latest = update.clone();
            // No receivers is fine; polling still sees the latest state
            let _ = entry.sender.send(update);
        }
    }

    pub fn latest(&self, action_id: Uuid) -> Option<ActionUpdate> {
        self.actions.read().get(&action_id).map(|e| e.latest.clone())
    }

    pub fn subscribe(
        &self,
        action_id: Uuid,
    ) -> Option<(ActionUpdate, broadcast::Receiver<ActionUpdate>)> {
        let actions = self.actions.read();
        actions
            .get(&action_id)
            .map(|e| (e.latest.clone(), e.sender.subscribe()))
    }
}

impl Default for ActionTracker {
    fn default() -> Self {
        Self::new()
    }
}
