//! Goal registry: the aggregate root owning goal metadata and lifecycle.
//!
//! Only this module mutates a goal. Other components read owned snapshots
//! through [`GoalRegistry::get_goal`] and ask the registry to apply the
//! status changes they are entitled to (pool credit, outcome, payouts).

use tracing::{error, info};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::storage::GoalStore;
use crate::types::{
    Amount, Goal, GoalConfig, GoalId, GoalState, GoalStatus, NewGoal, Outcome, ParticipantId,
    Timestamp,
};

#[derive(Debug, Clone, Copy)]
struct GoalLimits {
    max_title_len: usize,
    max_description_len: usize,
    max_goal_duration: u64,
}

#[derive(Debug)]
pub struct GoalRegistry {
    store: GoalStore,
    limits: GoalLimits,
}

impl GoalRegistry {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            store: GoalStore::new(),
            limits: GoalLimits {
                max_title_len: config.max_title_len,
                max_description_len: config.max_description_len,
                max_goal_duration: config.max_goal_duration,
            },
        }
    }

    /// Register a new goal in state `Open` with an empty pool.
    pub fn create_goal(
        &mut self,
        creator: ParticipantId,
        goal: NewGoal,
        now: Timestamp,
    ) -> Result<GoalId> {
        let title = goal.title.trim();
        let description = goal.description.trim();

        if title.is_empty() {
            return Err(LedgerError::InvalidInput("title must not be empty".into()));
        }
        if description.is_empty() {
            return Err(LedgerError::InvalidInput(
                "description must not be empty".into(),
            ));
        }
        if title.chars().count() > self.limits.max_title_len {
            return Err(LedgerError::InvalidInput(format!(
                "title is longer than {} characters",
                self.limits.max_title_len
            )));
        }
        if description.chars().count() > self.limits.max_description_len {
            return Err(LedgerError::InvalidInput(format!(
                "description is longer than {} characters",
                self.limits.max_description_len
            )));
        }
        if goal.deadline <= now {
            return Err(LedgerError::InvalidDeadline);
        }
        if goal.deadline - now > self.limits.max_goal_duration {
            return Err(LedgerError::InvalidInput(format!(
                "deadline is more than {} seconds away",
                self.limits.max_goal_duration
            )));
        }

        let id = self.store.next_goal_id();
        let config = GoalConfig {
            id,
            creator,
            title: title.to_string(),
            description: description.to_string(),
            rule: goal.rule,
            deadline: goal.deadline,
            created_at: now,
        };
        info!(goal_id = %id, creator = %config.creator, deadline = goal.deadline, "goal created");
        self.store.save_goal(config, GoalStatus::open());
        Ok(id)
    }

    pub fn get_goal(&self, id: GoalId) -> Result<Goal> {
        self.store.load_goal(id)
    }

    /// Every goal, ordered by id.
    pub fn goals(&self) -> Vec<Goal> {
        self.store.goals()
    }

    pub fn goal_count(&self) -> usize {
        self.store.len()
    }

    /// State-machine guard. Fails unless the goal is currently in `from` and
    /// `to` is the single forward successor of `from`.
    pub(crate) fn transition(&mut self, id: GoalId, from: GoalState, to: GoalState) -> Result<()> {
        let mut status = self.store.load_goal_status(id)?.clone();
        if status.state != from || from.successor() != Some(to) {
            error!(
                goal_id = %id,
                current = %status.state,
                %from,
                %to,
                "rejected goal transition"
            );
            return Err(LedgerError::InvalidTransition {
                goal_id: id,
                from: status.state,
                to,
            });
        }
        status.state = to;
        self.store.save_goal_status(id, status)?;
        info!(goal_id = %id, %from, %to, "goal transitioned");
        Ok(())
    }

    /// Add a recorded stake to the pool. Only the deposit path calls this.
    pub(crate) fn credit_pool(&mut self, id: GoalId, amount: Amount) -> Result<Amount> {
        let mut status = self.store.load_goal_status(id)?.clone();
        status.pool = status
            .pool
            .checked_add(amount)
            .ok_or(LedgerError::PoolCapExceeded(id))?;
        let pool = status.pool;
        self.store.save_goal_status(id, status)?;
        Ok(pool)
    }

    /// Cache the oracle answer and the resolution dust on a `Locked` goal.
    pub(crate) fn record_outcome(
        &mut self,
        id: GoalId,
        outcome: Outcome,
        dust: Amount,
        now: Timestamp,
    ) -> Result<()> {
        let mut status = self.store.load_goal_status(id)?.clone();
        if status.state != GoalState::Locked {
            return Err(LedgerError::InvalidTransition {
                goal_id: id,
                from: status.state,
                to: GoalState::Resolved,
            });
        }
        status.outcome = Some(outcome);
        status.dust = dust;
        status.resolved_at = Some(now);
        self.store.save_goal_status(id, status)
    }

    pub(crate) fn record_payment(&mut self, id: GoalId, amount: Amount) -> Result<()> {
        let mut status = self.store.load_goal_status(id)?.clone();
        status.claimed_total += amount;
        self.store.save_goal_status(id, status)
    }

    /// Move unclaimed value into the goal's dust bucket.
    pub(crate) fn add_dust(&mut self, id: GoalId, amount: Amount) -> Result<Amount> {
        let mut status = self.store.load_goal_status(id)?.clone();
        status.dust += amount;
        let dust = status.dust;
        self.store.save_goal_status(id, status)?;
        Ok(dust)
    }
}
