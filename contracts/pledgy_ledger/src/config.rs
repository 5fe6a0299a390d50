//! Tunable ledger limits.

use serde::{Deserialize, Serialize};

use crate::types::Amount;

const DAY_IN_SECS: u64 = 86_400;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Smallest accepted single deposit.
    pub min_stake: Amount,
    /// Upper bound on a goal's pool; `None` means unbounded.
    pub pool_cap: Option<Amount>,
    /// Seconds after resolution during which claims stay open.
    pub claim_grace_period: u64,
    /// Furthest a deadline may lie ahead of creation, in seconds.
    pub max_goal_duration: u64,
    pub max_title_len: usize,
    pub max_description_len: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            min_stake: 1,
            pool_cap: None,
            claim_grace_period: 30 * DAY_IN_SECS,
            max_goal_duration: 30 * DAY_IN_SECS,
            max_title_len: 100,
            max_description_len: 1_000,
        }
    }
}
