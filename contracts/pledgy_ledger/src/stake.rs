//! Stake ledger: one row per `(goal, participant)`, grown by deposits.

use std::collections::BTreeMap;

use tracing::info;

use crate::config::LedgerConfig;
use crate::error::{AuthorizationError, LedgerError, Result};
use crate::permit::{PermitAuthorizer, PermitProof};
use crate::registry::GoalRegistry;
use crate::types::{Amount, GoalId, GoalState, ParticipantId, Stake, StakeId, Timestamp};

/// What a successful deposit changed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DepositReceipt {
    pub stake_id: StakeId,
    pub goal_id: GoalId,
    pub participant: ParticipantId,
    pub amount: Amount,
    pub nonce: u64,
    /// Participant's stake after the deposit.
    pub stake_total: Amount,
    /// Goal pool after the deposit.
    pub pool: Amount,
}

#[derive(Debug)]
pub struct StakeLedger {
    stake_count: u64,
    stakes: BTreeMap<GoalId, BTreeMap<ParticipantId, Stake>>,
    min_stake: Amount,
    pool_cap: Option<Amount>,
}

impl StakeLedger {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            stake_count: 0,
            stakes: BTreeMap::new(),
            min_stake: config.min_stake.max(1),
            pool_cap: config.pool_cap,
        }
    }

    /// Record `amount` from `participant` against an `Open` goal.
    ///
    /// Every check that can fail runs before the permit is consumed, and
    /// nothing after consumption can fail, so the nonce is spent exactly when
    /// the stake is recorded.
    pub(crate) fn deposit(
        &mut self,
        registry: &mut GoalRegistry,
        authorizer: &mut PermitAuthorizer,
        goal_id: GoalId,
        participant: &ParticipantId,
        amount: Amount,
        proof: &PermitProof,
        now: Timestamp,
    ) -> Result<DepositReceipt> {
        let goal = registry.get_goal(goal_id)?;
        if goal.state != GoalState::Open || now >= goal.deadline {
            return Err(LedgerError::GoalNotOpen(goal_id));
        }
        if amount == 0 || amount < self.min_stake {
            return Err(LedgerError::InvalidAmount);
        }
        let pool = goal
            .pool
            .checked_add(amount)
            .ok_or(LedgerError::PoolCapExceeded(goal_id))?;
        if self.pool_cap.is_some_and(|cap| pool > cap) {
            return Err(LedgerError::PoolCapExceeded(goal_id));
        }

        let permit = proof.authorization();
        if &permit.participant != participant {
            return Err(AuthorizationError::ParticipantMismatch.into());
        }
        if permit.amount != amount {
            return Err(AuthorizationError::AmountMismatch.into());
        }

        authorizer.consume_proof(proof, now)?;

        let stake = self.upsert(goal_id, participant, amount, now);
        let stake_id = stake.id;
        let stake_total = stake.amount;
        let pool = registry.credit_pool(goal_id, amount)?;

        info!(
            goal_id = %goal_id,
            participant = %participant,
            amount,
            stake_total,
            pool,
            "stake recorded"
        );

        Ok(DepositReceipt {
            stake_id,
            goal_id,
            participant: participant.clone(),
            amount,
            nonce: permit.nonce,
            stake_total,
            pool,
        })
    }

    /// Stakes of one goal ordered by first deposit, ties broken by stake id.
    pub fn stakes_for(&self, goal_id: GoalId) -> Vec<Stake> {
        let mut stakes: Vec<Stake> = self
            .stakes
            .get(&goal_id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default();
        stakes.sort_by_key(|stake| (stake.deposited_at, stake.id));
        stakes
    }

    fn upsert(
        &mut self,
        goal_id: GoalId,
        participant: &ParticipantId,
        amount: Amount,
        now: Timestamp,
    ) -> &Stake {
        let next_id = StakeId(self.stake_count);
        let rows = self.stakes.entry(goal_id).or_default();
        let stake = rows.entry(participant.clone()).or_insert_with(|| Stake {
            id: next_id,
            goal_id,
            participant: participant.clone(),
            amount: 0,
            deposited_at: now,
            updated_at: now,
        });
        if stake.id == next_id {
            self.stake_count += 1;
        }
        // Bounded by the pool check in `deposit`.
        stake.amount += amount;
        stake.updated_at = now;
        stake
    }
}
