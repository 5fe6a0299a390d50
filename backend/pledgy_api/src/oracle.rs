//! Outcome oracle backed by attestations posted over the API.

use std::collections::HashMap;
use std::sync::RwLock;

use pledgy_ledger::{Goal, GoalId, OutcomeOracle};
use tracing::{info, warn};

/// Answers the ledger's one question per goal from recorded attestations.
/// A goal nobody attested counts as not met; the resolve handler holds off
/// until the attestation timeout has passed before letting that happen.
#[derive(Default)]
pub struct AttestationOracle {
    attestations: RwLock<HashMap<GoalId, bool>>,
}

impl AttestationOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite) the verdict for `goal_id`. Only consulted while
    /// the goal is unresolved.
    pub fn attest(&self, goal_id: GoalId, met: bool) {
        match self.attestations.write() {
            Ok(mut attestations) => {
                attestations.insert(goal_id, met);
                info!(goal_id = %goal_id, met, "outcome attested");
            }
            Err(_) => warn!(goal_id = %goal_id, "attestation store poisoned; attestation dropped"),
        }
    }

    pub fn attestation(&self, goal_id: GoalId) -> Option<bool> {
        self.attestations
            .read()
            .ok()
            .and_then(|attestations| attestations.get(&goal_id).copied())
    }
}

impl OutcomeOracle for AttestationOracle {
    fn resolve_condition(&self, goal: &Goal) -> bool {
        let verdict = self.attestation(goal.id);
        if verdict.is_none() {
            warn!(goal_id = %goal.id, "no attestation at resolution; treating goal as failed");
        }
        verdict.unwrap_or(false)
    }
}
