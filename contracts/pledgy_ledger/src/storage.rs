//! # Storage
//!
//! Typed helpers over the goal arena owned by the registry.
//!
//! | Table          | Key      | Value        | Written                         |
//! |----------------|----------|--------------|---------------------------------|
//! | `goal_count`   | —        | `u64`        | on every goal creation          |
//! | `configs`      | `GoalId` | `GoalConfig` | once, at creation               |
//! | `statuses`     | `GoalId` | `GoalStatus` | deposits, resolution, claims    |
//!
//! Deposits are the high-frequency write, so they touch only the small
//! `GoalStatus` record while the public API still returns a whole [`Goal`].

use std::collections::BTreeMap;

use crate::error::{LedgerError, Result};
use crate::types::{Goal, GoalConfig, GoalId, GoalStatus};

#[derive(Debug, Default)]
pub struct GoalStore {
    goal_count: u64,
    configs: BTreeMap<GoalId, GoalConfig>,
    statuses: BTreeMap<GoalId, GoalStatus>,
}

impl GoalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and increments the goal counter.
    /// Returns the ID to use for the *current* goal (pre-increment value).
    pub fn next_goal_id(&mut self) -> GoalId {
        let current = self.goal_count;
        self.goal_count += 1;
        GoalId(current)
    }

    /// Save both the immutable config and initial status for a new goal.
    pub fn save_goal(&mut self, config: GoalConfig, status: GoalStatus) {
        let id = config.id;
        self.configs.insert(id, config);
        self.statuses.insert(id, status);
    }

    /// Load the full `Goal` by combining config and status.
    pub fn load_goal(&self, id: GoalId) -> Result<Goal> {
        let config = self.load_goal_config(id)?;
        let status = self.load_goal_status(id)?;
        Ok(Goal::from_parts(config.clone(), status.clone()))
    }

    pub fn load_goal_config(&self, id: GoalId) -> Result<&GoalConfig> {
        self.configs.get(&id).ok_or(LedgerError::NotFound(id))
    }

    pub fn load_goal_status(&self, id: GoalId) -> Result<&GoalStatus> {
        self.statuses.get(&id).ok_or(LedgerError::NotFound(id))
    }

    /// Save only the mutable status.
    pub fn save_goal_status(&mut self, id: GoalId, status: GoalStatus) -> Result<()> {
        match self.statuses.get_mut(&id) {
            Some(slot) => {
                *slot = status;
                Ok(())
            }
            None => Err(LedgerError::NotFound(id)),
        }
    }

    pub fn goals(&self) -> Vec<Goal> {
        self.configs
            .values()
            .filter_map(|config| {
                let status = self.statuses.get(&config.id)?;
                Some(Goal::from_parts(config.clone(), status.clone()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }
}
