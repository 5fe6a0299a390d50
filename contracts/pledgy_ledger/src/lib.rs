//! # Pledgy Ledger
//!
//! Accounting core of **Pledgy**: a participant stakes value behind a goal
//! with a deadline, others add stakes, and at the deadline the pool is
//! resolved and paid out.
//!
//! | Phase        | Entry Point(s)                                   |
//! |--------------|--------------------------------------------------|
//! | Registration | [`Ledger::create_goal`]                          |
//! | Funding      | [`Ledger::deposit`], [`SharedLedger::deposit`]    |
//! | Resolution   | [`Ledger::resolve`]                              |
//! | Payout       | [`Ledger::claim`], [`Ledger::close_expired`]     |
//! | Queries      | `get_goal`, `goals`, `stakes_for`, `entitlement`, `claims_for` |
//!
//! ## Architecture
//!
//! Each component owns its records exclusively:
//!
//! - [`registry::GoalRegistry`]: goals and their lifecycle.
//! - [`stake::StakeLedger`]: stakes.
//! - [`permit::PermitAuthorizer`]: the consumed-nonce set.
//! - [`resolver::DeadlineResolver`]: the oracle call at the deadline.
//! - [`payout::PayoutEngine`]: entitlements and claim records.
//!
//! This file contains **only** the entry points and the outbox of events and
//! settlement requests they produce. [`shared::SharedLedger`] serializes
//! access for concurrent callers and flushes the outbox after each call.

mod config;
mod error;
mod storage;
mod types;

pub mod events;
pub mod payout;
pub mod permit;
pub mod registry;
pub mod resolver;
pub mod settlement;
pub mod shared;
pub mod stake;

#[cfg(test)]
mod invariants;
#[cfg(test)]
mod test_claims;
#[cfg(test)]
mod test_deposits;

use std::sync::Arc;

use tracing::debug;

use permit::{PermitProof, VerifiedPermit};

pub use config::LedgerConfig;
pub use error::{AuthorizationError, LedgerError, Result, SinkError};
pub use events::{EventDispatcher, EventSink, LedgerEvent, MemorySink};
pub use payout::{ClaimReceipt, PayoutEngine, PayoutPlan};
pub use permit::{
    Ed25519PermitVerifier, PermitAuthorization, PermitAuthorizer, PermitVerifier,
};
pub use registry::GoalRegistry;
pub use resolver::{DeadlineResolver, OutcomeOracle, Resolution};
pub use settlement::{MemorySettlement, SettlementRequest, SettlementSink, TransferTarget};
pub use shared::SharedLedger;
pub use stake::{DepositReceipt, StakeLedger};
pub use types::{
    Amount, ClaimRecord, Goal, GoalId, GoalState, NewGoal, Outcome, ParticipantId, Stake,
    StakeId, Timestamp, VerificationRule,
};

/// Side effects produced by mutating calls, waiting to be delivered.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Outbox {
    pub events: Vec<LedgerEvent>,
    pub settlements: Vec<SettlementRequest>,
}

impl Outbox {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.settlements.is_empty()
    }
}

/// Single authoritative ledger. Mutating calls take `&mut self`; callers
/// that share one ledger go through [`SharedLedger`].
pub struct Ledger {
    registry: GoalRegistry,
    stakes: StakeLedger,
    authorizer: PermitAuthorizer,
    resolver: DeadlineResolver,
    payouts: PayoutEngine,
    outbox: Outbox,
}

impl Ledger {
    pub fn new(
        config: LedgerConfig,
        verifier: Arc<dyn PermitVerifier>,
        oracle: Arc<dyn OutcomeOracle>,
    ) -> Self {
        Self {
            registry: GoalRegistry::new(&config),
            stakes: StakeLedger::new(&config),
            authorizer: PermitAuthorizer::new(verifier),
            resolver: DeadlineResolver::new(oracle),
            payouts: PayoutEngine::new(&config),
            outbox: Outbox::default(),
        }
    }

    // ─────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────

    /// Register a new goal in state `Open`.
    pub fn create_goal(
        &mut self,
        creator: ParticipantId,
        goal: NewGoal,
        now: Timestamp,
    ) -> Result<GoalId> {
        let deadline = goal.deadline;
        let goal_id = self.registry.create_goal(creator.clone(), goal, now)?;
        self.outbox.events.push(LedgerEvent::GoalCreated {
            goal_id,
            creator,
            deadline,
            timestamp: now,
        });
        Ok(goal_id)
    }

    // ─────────────────────────────────────────────────────────
    // Funding
    // ─────────────────────────────────────────────────────────

    /// Deposit `amount` into a goal under `permit`, verifying its signature
    /// inline.
    pub fn deposit(
        &mut self,
        goal_id: GoalId,
        participant: &ParticipantId,
        amount: Amount,
        permit: PermitAuthorization,
        now: Timestamp,
    ) -> Result<StakeId> {
        self.deposit_with(goal_id, participant, amount, PermitProof::Unverified(permit), now)
    }

    /// Deposit under a permit whose signature was checked beforehand by this
    /// ledger's own verifier.
    pub(crate) fn deposit_verified(
        &mut self,
        goal_id: GoalId,
        participant: &ParticipantId,
        amount: Amount,
        permit: VerifiedPermit,
        now: Timestamp,
    ) -> Result<StakeId> {
        self.deposit_with(goal_id, participant, amount, PermitProof::Verified(permit), now)
    }

    fn deposit_with(
        &mut self,
        goal_id: GoalId,
        participant: &ParticipantId,
        amount: Amount,
        proof: PermitProof,
        now: Timestamp,
    ) -> Result<StakeId> {
        let receipt = self.stakes.deposit(
            &mut self.registry,
            &mut self.authorizer,
            goal_id,
            participant,
            amount,
            &proof,
            now,
        )?;
        self.outbox.settlements.push(SettlementRequest::deposit(
            goal_id,
            participant,
            receipt.nonce,
            amount,
        ));
        self.outbox.events.push(LedgerEvent::StakeRecorded {
            goal_id,
            participant: participant.clone(),
            amount,
            pool: receipt.pool,
            timestamp: now,
        });
        Ok(receipt.stake_id)
    }

    // ─────────────────────────────────────────────────────────
    // Resolution & payout
    // ─────────────────────────────────────────────────────────

    /// Resolve a goal at or after its deadline. Only the first call succeeds.
    pub fn resolve(&mut self, goal_id: GoalId, now: Timestamp) -> Result<Outcome> {
        let resolution = self.resolver.resolve(
            &mut self.registry,
            &self.stakes,
            &mut self.payouts,
            goal_id,
            now,
        )?;
        self.outbox.events.push(LedgerEvent::GoalResolved {
            goal_id,
            outcome: resolution.outcome,
            pool: resolution.pool,
            dust: resolution.dust,
            timestamp: now,
        });
        if resolution.closed {
            self.outbox.events.push(LedgerEvent::GoalClosed {
                goal_id,
                dust: resolution.dust,
                timestamp: now,
            });
        }
        Ok(resolution.outcome)
    }

    /// Pay `participant` their entitlement. Returns the amount paid.
    pub fn claim(
        &mut self,
        goal_id: GoalId,
        participant: &ParticipantId,
        now: Timestamp,
    ) -> Result<Amount> {
        let receipt = self
            .payouts
            .claim(&mut self.registry, goal_id, participant, now)?;
        let amount = receipt.record.amount_paid;
        if amount > 0 {
            self.outbox
                .settlements
                .push(SettlementRequest::payout(goal_id, participant, amount));
        }
        self.outbox.events.push(LedgerEvent::Claimed {
            goal_id,
            participant: participant.clone(),
            amount,
            timestamp: now,
        });
        if let Some(dust) = receipt.closed_with_dust {
            self.outbox.events.push(LedgerEvent::GoalClosed {
                goal_id,
                dust,
                timestamp: now,
            });
        }
        Ok(amount)
    }

    /// Close a resolved goal once its claim window has elapsed. Returns the
    /// final, permanently unclaimable dust.
    pub fn close_expired(&mut self, goal_id: GoalId, now: Timestamp) -> Result<Amount> {
        let dust = self
            .payouts
            .close_expired(&mut self.registry, goal_id, now)?;
        self.outbox.events.push(LedgerEvent::GoalClosed {
            goal_id,
            dust,
            timestamp: now,
        });
        Ok(dust)
    }

    // ─────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────

    pub fn get_goal(&self, goal_id: GoalId) -> Result<Goal> {
        self.registry.get_goal(goal_id)
    }

    pub fn goals(&self) -> Vec<Goal> {
        self.registry.goals()
    }

    pub fn goal_count(&self) -> usize {
        self.registry.goal_count()
    }

    /// Stakes of a goal in deposit order.
    pub fn stakes_for(&self, goal_id: GoalId) -> Result<Vec<Stake>> {
        self.registry.get_goal(goal_id)?;
        Ok(self.stakes.stakes_for(goal_id))
    }

    pub fn entitlement(&self, goal_id: GoalId, participant: &ParticipantId) -> Result<Amount> {
        self.payouts
            .entitlement(&self.registry, goal_id, participant)
    }

    pub fn claims_for(&self, goal_id: GoalId) -> Result<Vec<ClaimRecord>> {
        self.registry.get_goal(goal_id)?;
        Ok(self.payouts.claims_for(goal_id))
    }

    pub fn is_nonce_consumed(&self, participant: &ParticipantId, nonce: u64) -> bool {
        self.authorizer.is_consumed(participant, nonce)
    }

    pub(crate) fn permit_verifier(&self) -> Arc<dyn PermitVerifier> {
        self.authorizer.verifier()
    }

    /// Hand over every pending event and settlement request.
    pub fn take_outbox(&mut self) -> Outbox {
        let outbox = std::mem::take(&mut self.outbox);
        if !outbox.is_empty() {
            debug!(
                events = outbox.events.len(),
                settlements = outbox.settlements.len(),
                "outbox drained"
            );
        }
        outbox
    }
}
