//! # Payout engine
//!
//! Entitlements are fixed once, at resolution, from the frozen stake set:
//!
//! | Outcome   | Who is entitled        | Entitlement                                      |
//! |-----------|------------------------|--------------------------------------------------|
//! | `Success` | every staker           | `floor(stake * pool / total_staked)`             |
//! | `Failure` | every staker but the creator | `floor(stake * pool / (pool - creator_stake))` |
//!
//! On failure the creator's stake is forfeited into the pool. Division
//! remainders stay with the goal as `dust`; `Σ entitlements + dust == pool`
//! holds by construction. Closing a goal after the grace period moves every
//! unclaimed entitlement into the dust as well, where it stays unclaimable.

use std::collections::BTreeMap;

use tracing::info;

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::registry::GoalRegistry;
use crate::types::{
    Amount, ClaimRecord, Goal, GoalId, GoalState, Outcome, ParticipantId, Stake, Timestamp,
};

/// Entitlements computed from a frozen pool.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PayoutPlan {
    /// In stake order.
    pub entitlements: Vec<(ParticipantId, Amount)>,
    pub dust: Amount,
    /// Creator whose stake was forfeited, if any.
    pub forfeited: Option<ParticipantId>,
}

impl PayoutPlan {
    pub fn total_entitled(&self) -> Amount {
        self.entitlements.iter().map(|(_, amount)| amount).sum()
    }

    /// Whether anyone has something to claim.
    pub fn has_claimants(&self) -> bool {
        self.entitlements.iter().any(|(_, amount)| *amount > 0)
    }
}

/// `floor(amount * numerator / denominator)`, widened so it cannot overflow.
fn pro_rata(amount: Amount, numerator: Amount, denominator: Amount) -> Amount {
    debug_assert!(denominator > 0 && amount <= denominator);
    let share = amount as u128 * numerator as u128 / denominator as u128;
    // amount <= denominator, so share <= numerator.
    share as Amount
}

/// Compute every entitlement of `goal` from its frozen `stakes`.
pub fn compute_payouts(goal: &Goal, stakes: &[Stake], outcome: Outcome) -> PayoutPlan {
    let pool = goal.pool;
    let mut plan = PayoutPlan::default();

    match outcome {
        Outcome::Success => {
            let total: Amount = stakes.iter().map(|stake| stake.amount).sum();
            for stake in stakes {
                let share = if total == 0 {
                    0
                } else {
                    pro_rata(stake.amount, pool, total)
                };
                plan.entitlements.push((stake.participant.clone(), share));
            }
        }
        Outcome::Failure => {
            let creator_stake = stakes
                .iter()
                .find(|stake| stake.participant == goal.creator)
                .map(|stake| stake.amount)
                .unwrap_or(0);
            if creator_stake > 0 {
                plan.forfeited = Some(goal.creator.clone());
            }
            let remaining = pool.saturating_sub(creator_stake);
            for stake in stakes.iter().filter(|s| s.participant != goal.creator) {
                let share = if remaining == 0 {
                    0
                } else {
                    pro_rata(stake.amount, pool, remaining)
                };
                plan.entitlements.push((stake.participant.clone(), share));
            }
        }
    }

    plan.dust = pool - plan.total_entitled();
    plan
}

/// A successful claim.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClaimReceipt {
    pub record: ClaimRecord,
    /// Final dust when this claim closed the goal.
    pub closed_with_dust: Option<Amount>,
}

#[derive(Debug)]
pub struct PayoutEngine {
    entitlements: BTreeMap<GoalId, BTreeMap<ParticipantId, Amount>>,
    claims: BTreeMap<GoalId, BTreeMap<ParticipantId, ClaimRecord>>,
    grace_period: u64,
}

impl PayoutEngine {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            entitlements: BTreeMap::new(),
            claims: BTreeMap::new(),
            grace_period: config.claim_grace_period,
        }
    }

    pub(crate) fn install(&mut self, goal_id: GoalId, plan: &PayoutPlan) {
        self.entitlements
            .insert(goal_id, plan.entitlements.iter().cloned().collect());
    }

    /// Pay `participant` their entitlement on a `Resolved` goal.
    pub fn claim(
        &mut self,
        registry: &mut GoalRegistry,
        goal_id: GoalId,
        participant: &ParticipantId,
        now: Timestamp,
    ) -> Result<ClaimReceipt> {
        let goal = registry.get_goal(goal_id)?;
        if matches!(goal.state, GoalState::Open | GoalState::Locked) {
            return Err(LedgerError::NotResolved(goal_id));
        }
        if self.claim_record(goal_id, participant).is_some() {
            return Err(LedgerError::AlreadyClaimed(goal_id));
        }
        let amount = self
            .entitlements
            .get(&goal_id)
            .and_then(|rows| rows.get(participant))
            .copied()
            .ok_or(LedgerError::NoStake(goal_id))?;
        if goal.state == GoalState::Closed {
            return Err(LedgerError::ClaimWindowClosed(goal_id));
        }

        let record = ClaimRecord {
            goal_id,
            participant: participant.clone(),
            amount_paid: amount,
            claimed_at: now,
        };
        registry.record_payment(goal_id, amount)?;
        self.claims
            .entry(goal_id)
            .or_default()
            .insert(participant.clone(), record.clone());
        info!(goal_id = %goal_id, participant = %participant, amount, "claim paid");

        let closed_with_dust = if self.outstanding(goal_id) == 0 {
            registry.transition(goal_id, GoalState::Resolved, GoalState::Closed)?;
            Some(goal.dust)
        } else {
            None
        };

        Ok(ClaimReceipt {
            record,
            closed_with_dust,
        })
    }

    /// Close a `Resolved` goal whose grace period has elapsed. Returns the
    /// final dust, including every entitlement left unclaimed.
    pub fn close_expired(
        &mut self,
        registry: &mut GoalRegistry,
        goal_id: GoalId,
        now: Timestamp,
    ) -> Result<Amount> {
        let goal = registry.get_goal(goal_id)?;
        let resolved_at = match (goal.state, goal.resolved_at) {
            (GoalState::Resolved, Some(resolved_at)) => resolved_at,
            (GoalState::Closed, _) => return Err(LedgerError::ClaimWindowClosed(goal_id)),
            _ => return Err(LedgerError::NotResolved(goal_id)),
        };
        if now < resolved_at.saturating_add(self.grace_period) {
            return Err(LedgerError::ClaimWindowOpen(goal_id));
        }

        let unclaimed = self.outstanding(goal_id);
        registry.transition(goal_id, GoalState::Resolved, GoalState::Closed)?;
        let dust = registry.add_dust(goal_id, unclaimed)?;
        info!(goal_id = %goal_id, unclaimed, dust, "claim window closed");
        Ok(dust)
    }

    /// Amount `participant` could claim right now.
    pub fn entitlement(
        &self,
        registry: &GoalRegistry,
        goal_id: GoalId,
        participant: &ParticipantId,
    ) -> Result<Amount> {
        let goal = registry.get_goal(goal_id)?;
        if goal.state != GoalState::Resolved || self.claim_record(goal_id, participant).is_some() {
            return Ok(0);
        }
        Ok(self
            .entitlements
            .get(&goal_id)
            .and_then(|rows| rows.get(participant))
            .copied()
            .unwrap_or(0))
    }

    pub fn claim_record(&self, goal_id: GoalId, participant: &ParticipantId) -> Option<&ClaimRecord> {
        self.claims.get(&goal_id)?.get(participant)
    }

    pub fn claims_for(&self, goal_id: GoalId) -> Vec<ClaimRecord> {
        let mut records: Vec<ClaimRecord> = self
            .claims
            .get(&goal_id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by_key(|record| record.claimed_at);
        records
    }

    /// Sum of entitlements not yet claimed.
    fn outstanding(&self, goal_id: GoalId) -> Amount {
        let Some(rows) = self.entitlements.get(&goal_id) else {
            return 0;
        };
        let claimed = self.claims.get(&goal_id);
        rows.iter()
            .filter(|(participant, _)| !claimed.is_some_and(|c| c.contains_key(*participant)))
            .map(|(_, amount)| amount)
            .sum()
    }
}
