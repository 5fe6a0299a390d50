//! Outbound settlement requests.
//!
//! The ledger authorizes value movement; it never moves value itself. Each
//! recorded deposit and each paid claim yields one [`SettlementRequest`] for
//! the external value-transfer service.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::SinkError;
use crate::types::{Amount, GoalId, ParticipantId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum TransferTarget {
    /// Escrow account of a goal's pool.
    GoalPool(GoalId),
    Participant(ParticipantId),
}

impl fmt::Display for TransferTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferTarget::GoalPool(id) => write!(f, "pool:{id}"),
            TransferTarget::Participant(id) => write!(f, "participant:{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub to: TransferTarget,
    pub amount: Amount,
    pub memo: String,
}

impl SettlementRequest {
    /// Pull `amount` from `participant` into the goal pool under permit `nonce`.
    pub fn deposit(goal_id: GoalId, participant: &ParticipantId, nonce: u64, amount: Amount) -> Self {
        Self {
            to: TransferTarget::GoalPool(goal_id),
            amount,
            memo: format!("deposit goal={goal_id} from={participant} nonce={nonce}"),
        }
    }

    /// Release a claimed entitlement from the goal pool to `participant`.
    pub fn payout(goal_id: GoalId, participant: &ParticipantId, amount: Amount) -> Self {
        Self {
            to: TransferTarget::Participant(participant.clone()),
            amount,
            memo: format!("payout goal={goal_id}"),
        }
    }
}

/// The external value-transfer collaborator.
pub trait SettlementSink: Send + Sync {
    fn authorize_transfer(&self, request: &SettlementRequest) -> Result<(), SinkError>;
}

/// Keeps every request in memory. Cloning shares the buffer.
#[derive(Clone, Default)]
pub struct MemorySettlement {
    requests: Arc<Mutex<Vec<SettlementRequest>>>,
}

impl MemorySettlement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<SettlementRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

impl SettlementSink for MemorySettlement {
    fn authorize_transfer(&self, request: &SettlementRequest) -> Result<(), SinkError> {
        self.requests
            .lock()
            .map_err(|_| SinkError::Other("memory settlement poisoned".into()))?
            .push(request.clone());
        Ok(())
    }
}
