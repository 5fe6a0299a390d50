//! Deadline resolver: the single `Open → Locked → Resolved` step.

use std::sync::Arc;

use tracing::info;

use crate::error::{LedgerError, Result};
use crate::payout::{compute_payouts, PayoutEngine};
use crate::registry::GoalRegistry;
use crate::stake::StakeLedger;
use crate::types::{Amount, Goal, GoalId, GoalState, Outcome, Timestamp};

/// Decides whether the creator met the declared goal.
///
/// Called exactly once per goal; the answer is cached on the goal.
pub trait OutcomeOracle: Send + Sync {
    fn resolve_condition(&self, goal: &Goal) -> bool;
}

/// Result of a resolution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Resolution {
    pub goal_id: GoalId,
    pub outcome: Outcome,
    pub pool: Amount,
    pub dust: Amount,
    /// Set when nobody was entitled to anything and the goal closed at once.
    pub closed: bool,
}

pub struct DeadlineResolver {
    oracle: Arc<dyn OutcomeOracle>,
}

impl DeadlineResolver {
    pub fn new(oracle: Arc<dyn OutcomeOracle>) -> Self {
        Self { oracle }
    }

    pub fn resolve(
        &self,
        registry: &mut GoalRegistry,
        stakes: &StakeLedger,
        payouts: &mut PayoutEngine,
        goal_id: GoalId,
        now: Timestamp,
    ) -> Result<Resolution> {
        let goal = registry.get_goal(goal_id)?;
        if now < goal.deadline {
            return Err(LedgerError::TooEarly(goal_id));
        }
        if goal.state != GoalState::Open {
            return Err(LedgerError::AlreadyResolved(goal_id));
        }

        registry.transition(goal_id, GoalState::Open, GoalState::Locked)?;

        // Frozen from here on: deposits require `Open`.
        let snapshot = stakes.stakes_for(goal_id);
        let outcome = Outcome::from_condition(self.oracle.resolve_condition(&goal));
        let plan = compute_payouts(&goal, &snapshot, outcome);

        payouts.install(goal_id, &plan);
        registry.record_outcome(goal_id, outcome, plan.dust, now)?;
        registry.transition(goal_id, GoalState::Locked, GoalState::Resolved)?;
        info!(
            goal_id = %goal_id,
            %outcome,
            pool = goal.pool,
            dust = plan.dust,
            stakers = snapshot.len(),
            "goal resolved"
        );

        let closed = !plan.has_claimants();
        if closed {
            registry.transition(goal_id, GoalState::Resolved, GoalState::Closed)?;
            info!(goal_id = %goal_id, dust = plan.dust, "goal closed with nothing to claim");
        }

        Ok(Resolution {
            goal_id,
            outcome,
            pool: goal.pool,
            dust: plan.dust,
            closed,
        })
    }
}
