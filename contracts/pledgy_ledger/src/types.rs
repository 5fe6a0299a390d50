//! # Types
//!
//! Shared data structures used across all modules of the Pledgy ledger.
//!
//! ## Design decisions
//!
//! ### Config / Status split
//!
//! A `Goal` is internally stored as two separate records:
//!
//! - [`GoalConfig`]: written once at creation; never mutated.
//! - [`GoalStatus`]: written on every deposit, at resolution and on claims.
//!
//! The public API exposes the reconstructed [`Goal`] struct for convenience.
//!
//! ### State as a Finite-State Machine
//!
//! [`GoalState`] enforces a strict forward-only lifecycle:
//!
//! ```text
//! Open ──► Locked ──► Resolved ──► Closed
//! ```
//!
//! No state is skipped and no transition leaves `Closed`.
//!
//! ### Amounts
//!
//! Amounts are `u64` in the smallest unit the deployment settles in. Every
//! product of two amounts is computed in `u128`, so pro-rata arithmetic can
//! never overflow.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Value in the smallest settlement unit.
pub type Amount = u64;

/// Arena key of a goal. Assigned sequentially from zero.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GoalId(pub u64);

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Arena key of a stake row. Stable across repeat deposits.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StakeId(pub u64);

impl fmt::Display for StakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identity handed to the ledger by the authentication layer.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a goal.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalState {
    /// Accepting stakes.
    Open,
    /// Deadline passed and resolution started; the stake set is frozen.
    Locked,
    /// Outcome known, entitlements fixed; accepting claims.
    Resolved,
    /// Every entitled staker claimed or the grace period elapsed.
    Closed,
}

impl GoalState {
    /// The only state this one may move to, if any.
    pub fn successor(self) -> Option<GoalState> {
        match self {
            GoalState::Open => Some(GoalState::Locked),
            GoalState::Locked => Some(GoalState::Resolved),
            GoalState::Resolved => Some(GoalState::Closed),
            GoalState::Closed => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GoalState::Open => "open",
            GoalState::Locked => "locked",
            GoalState::Resolved => "resolved",
            GoalState::Closed => "closed",
        }
    }
}

impl fmt::Display for GoalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the creator met the declared goal.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn from_condition(met: bool) -> Self {
        if met {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => f.write_str("success"),
            Outcome::Failure => f.write_str("failure"),
        }
    }
}

/// How the outcome oracle judges a goal. Opaque to the ledger itself.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationRule {
    /// Evidence read from chain state.
    #[default]
    OnChain,
    /// Evidence read from a GitHub account.
    Github,
}

/// Parameters supplied by the creator of a goal.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NewGoal {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub rule: VerificationRule,
    pub deadline: Timestamp,
}

/// Immutable goal configuration, written once at creation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GoalConfig {
    pub id: GoalId,
    pub creator: ParticipantId,
    pub title: String,
    pub description: String,
    pub rule: VerificationRule,
    pub deadline: Timestamp,
    pub created_at: Timestamp,
}

/// Mutable goal status, updated on deposits, resolution and claims.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GoalStatus {
    pub state: GoalState,
    pub pool: Amount,
    pub outcome: Option<Outcome>,
    pub dust: Amount,
    pub claimed_total: Amount,
    pub resolved_at: Option<Timestamp>,
}

impl GoalStatus {
    pub(crate) fn open() -> Self {
        Self {
            state: GoalState::Open,
            pool: 0,
            outcome: None,
            dust: 0,
            claimed_total: 0,
            resolved_at: None,
        }
    }
}

/// Full representation of a pledge campaign.
///
/// Reconstructed from the split `GoalConfig` + `GoalStatus` records.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// Unique identifier (auto-incremented).
    pub id: GoalId,
    /// Participant who declared the goal.
    pub creator: ParticipantId,
    pub title: String,
    pub description: String,
    pub rule: VerificationRule,
    /// Timestamp at or after which the goal may be resolved.
    pub deadline: Timestamp,
    pub created_at: Timestamp,
    /// Current lifecycle state.
    pub state: GoalState,
    /// Sum of every stake recorded against this goal.
    pub pool: Amount,
    /// Cached oracle answer, set once at resolution.
    pub outcome: Option<Outcome>,
    /// Pro-rata remainders plus, once closed, unclaimed entitlements.
    pub dust: Amount,
    /// Sum of every payout claimed so far.
    pub claimed_total: Amount,
    pub resolved_at: Option<Timestamp>,
}

impl Goal {
    pub(crate) fn from_parts(config: GoalConfig, status: GoalStatus) -> Self {
        Goal {
            id: config.id,
            creator: config.creator,
            title: config.title,
            description: config.description,
            rule: config.rule,
            deadline: config.deadline,
            created_at: config.created_at,
            state: status.state,
            pool: status.pool,
            outcome: status.outcome,
            dust: status.dust,
            claimed_total: status.claimed_total,
            resolved_at: status.resolved_at,
        }
    }
}

/// A participant's contribution to a goal's pool.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Stake {
    pub id: StakeId,
    pub goal_id: GoalId,
    pub participant: ParticipantId,
    /// Strictly positive once the row exists.
    pub amount: Amount,
    /// Time of the first deposit; orders stakes within a goal.
    pub deposited_at: Timestamp,
    /// Time of the latest deposit.
    pub updated_at: Timestamp,
}

/// Proof that a participant has been paid for a resolved goal.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub goal_id: GoalId,
    pub participant: ParticipantId,
    pub amount_paid: Amount,
    pub claimed_at: Timestamp,
}
