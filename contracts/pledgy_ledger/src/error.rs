//! Ledger error types.
//!
//! A failing operation never leaves a partial mutation behind: goals, stakes,
//! claims and the consumed-nonce set are exactly as they were before the call.

use thiserror::Error;

use crate::types::{GoalId, GoalState};

/// Why a permit was rejected.
///
/// Never retried by the ledger: a retry without a fresh nonce is itself a
/// replay.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum AuthorizationError {
    #[error("permit expired")]
    Expired,

    #[error("permit nonce already consumed")]
    ReplayedNonce,

    #[error("permit signature does not authenticate its contents")]
    InvalidSignature,

    #[error("permit was issued to a different participant")]
    ParticipantMismatch,

    #[error("permit amount does not match the deposit")]
    AmountMismatch,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum LedgerError {
    /// Malformed goal parameters; safe to show to the user verbatim.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("deadline must be in the future")]
    InvalidDeadline,

    #[error("goal not found: {0}")]
    NotFound(GoalId),

    #[error("goal {0} is not accepting stakes")]
    GoalNotOpen(GoalId),

    #[error("stake amount is below the minimum or zero")]
    InvalidAmount,

    #[error("deposit would exceed the pool cap of goal {0}")]
    PoolCapExceeded(GoalId),

    /// Ordering defect in the caller; correct callers never see this.
    #[error("invalid transition from {from} to {to} for goal {goal_id}")]
    InvalidTransition {
        goal_id: GoalId,
        from: GoalState,
        to: GoalState,
    },

    #[error("authorization rejected: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("goal {0} cannot be resolved before its deadline")]
    TooEarly(GoalId),

    #[error("goal {0} has already been resolved")]
    AlreadyResolved(GoalId),

    #[error("goal {0} has not been resolved yet")]
    NotResolved(GoalId),

    #[error("no claimable stake on goal {0}")]
    NoStake(GoalId),

    #[error("stake on goal {0} has already been claimed")]
    AlreadyClaimed(GoalId),

    #[error("claim window of goal {0} is still open")]
    ClaimWindowOpen(GoalId),

    #[error("claim window of goal {0} has closed")]
    ClaimWindowClosed(GoalId),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Failure reported by an event or settlement sink. Logged, never fatal.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink closed")]
    Closed,

    #[error("sink error: {0}")]
    Other(String),
}
