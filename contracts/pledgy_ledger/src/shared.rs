//! Serialized access to one [`Ledger`] from many threads.
//!
//! Every mutating call runs to completion under the write lock; queries share
//! the read lock and return owned snapshots. Two kinds of latency stay outside
//! the lock: permit signature verification (before it is taken) and delivery
//! of the outbox to sinks (after it is released).

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

use crate::error::{LedgerError, Result};
use crate::events::EventDispatcher;
use crate::permit::{verify_permit, PermitAuthorization, PermitVerifier};
use crate::settlement::SettlementSink;
use crate::types::{
    Amount, ClaimRecord, Goal, GoalId, GoalState, NewGoal, Outcome, ParticipantId, Stake, StakeId,
    Timestamp,
};
use crate::{Ledger, Outbox};

pub struct SharedLedger {
    ledger: RwLock<Ledger>,
    verifier: Arc<dyn PermitVerifier>,
    dispatcher: EventDispatcher,
    settlement: Arc<dyn SettlementSink>,
}

impl SharedLedger {
    pub fn new(
        ledger: Ledger,
        dispatcher: EventDispatcher,
        settlement: Arc<dyn SettlementSink>,
    ) -> Self {
        let verifier = ledger.permit_verifier();
        Self {
            ledger: RwLock::new(ledger),
            verifier,
            dispatcher,
            settlement,
        }
    }

    pub fn create_goal(
        &self,
        creator: ParticipantId,
        goal: NewGoal,
        now: Timestamp,
    ) -> Result<GoalId> {
        self.mutate(|ledger| ledger.create_goal(creator, goal, now))
    }

    pub fn deposit(
        &self,
        goal_id: GoalId,
        participant: &ParticipantId,
        amount: Amount,
        permit: PermitAuthorization,
        now: Timestamp,
    ) -> Result<StakeId> {
        let verified = verify_permit(&self.verifier, permit, now)?;
        self.mutate(|ledger| ledger.deposit_verified(goal_id, participant, amount, verified, now))
    }

    pub fn resolve(&self, goal_id: GoalId, now: Timestamp) -> Result<Outcome> {
        self.mutate(|ledger| ledger.resolve(goal_id, now))
    }

    pub fn claim(
        &self,
        goal_id: GoalId,
        participant: &ParticipantId,
        now: Timestamp,
    ) -> Result<Amount> {
        self.mutate(|ledger| ledger.claim(goal_id, participant, now))
    }

    pub fn close_expired(&self, goal_id: GoalId, now: Timestamp) -> Result<Amount> {
        self.mutate(|ledger| ledger.close_expired(goal_id, now))
    }

    pub fn get_goal(&self, goal_id: GoalId) -> Result<Goal> {
        self.read()?.get_goal(goal_id)
    }

    pub fn goals(&self) -> Result<Vec<Goal>> {
        Ok(self.read()?.goals())
    }

    pub fn goal_count(&self) -> Result<usize> {
        Ok(self.read()?.goal_count())
    }

    pub fn stakes_for(&self, goal_id: GoalId) -> Result<Vec<Stake>> {
        self.read()?.stakes_for(goal_id)
    }

    pub fn entitlement(&self, goal_id: GoalId, participant: &ParticipantId) -> Result<Amount> {
        self.read()?.entitlement(goal_id, participant)
    }

    pub fn claims_for(&self, goal_id: GoalId) -> Result<Vec<ClaimRecord>> {
        self.read()?.claims_for(goal_id)
    }

    pub fn is_nonce_consumed(&self, participant: &ParticipantId, nonce: u64) -> Result<bool> {
        Ok(self.read()?.is_nonce_consumed(participant, nonce))
    }

    /// Run `op` on a goal that is still `Open`, holding the write lock so no
    /// resolution interleaves. `AlreadyResolved` once the goal has left `Open`.
    pub fn while_open<T>(&self, goal_id: GoalId, op: impl FnOnce(&Goal) -> T) -> Result<T> {
        let ledger = self.write()?;
        let goal = ledger.get_goal(goal_id)?;
        if goal.state != GoalState::Open {
            return Err(LedgerError::AlreadyResolved(goal_id));
        }
        Ok(op(&goal))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Ledger>> {
        self.ledger
            .read()
            .map_err(|_| LedgerError::Unavailable("ledger lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Ledger>> {
        self.ledger
            .write()
            .map_err(|_| LedgerError::Unavailable("ledger lock poisoned".into()))
    }

    fn mutate<T>(&self, op: impl FnOnce(&mut Ledger) -> Result<T>) -> Result<T> {
        let (result, outbox) = {
            let mut ledger = self.write()?;
            let result = op(&mut *ledger);
            (result, ledger.take_outbox())
        };
        self.flush(outbox);
        result
    }

    fn flush(&self, outbox: Outbox) {
        for request in &outbox.settlements {
            if let Err(e) = self.settlement.authorize_transfer(request) {
                warn!(to = %request.to, amount = request.amount, "settlement sink error: {}", e);
            }
        }
        for event in &outbox.events {
            self.dispatcher.dispatch(event);
        }
    }
}
