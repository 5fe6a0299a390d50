#![allow(dead_code)]

use crate::types::{ClaimRecord, Goal, GoalState, Stake};

/// INV-1: the pool equals the sum of the goal's stakes.
pub fn assert_pool_matches_stakes(goal: &Goal, stakes: &[Stake]) {
    let total: u64 = stakes.iter().map(|stake| stake.amount).sum();
    assert_eq!(
        goal.pool, total,
        "INV-1 violated: goal {} pool {} != sum of stakes {}",
        goal.id, goal.pool, total
    );
}

/// INV-2: every stake row is strictly positive and belongs to its goal.
pub fn assert_stakes_positive(goal: &Goal, stakes: &[Stake]) {
    for stake in stakes {
        assert!(
            stake.amount > 0,
            "INV-2 violated: stake {} of goal {} is zero",
            stake.id,
            goal.id
        );
        assert_eq!(
            stake.goal_id, goal.id,
            "INV-2 violated: stake {} listed under the wrong goal",
            stake.id
        );
    }
}

/// INV-3: stakes are listed by first deposit, ties broken by stake id.
pub fn assert_stakes_ordered(stakes: &[Stake]) {
    for pair in stakes.windows(2) {
        assert!(
            (pair[0].deposited_at, pair[0].id) < (pair[1].deposited_at, pair[1].id),
            "INV-3 violated: stake {} listed before stake {}",
            pair[0].id,
            pair[1].id
        );
    }
}

/// INV-4: payouts never exceed the pool, and once closed
/// `Σ paid + dust == pool` exactly.
pub fn assert_conservation(goal: &Goal, claims: &[ClaimRecord]) {
    let paid: u64 = claims.iter().map(|claim| claim.amount_paid).sum();
    assert_eq!(
        paid, goal.claimed_total,
        "INV-4 violated: goal {} claimed_total {} != sum of claims {}",
        goal.id, goal.claimed_total, paid
    );
    assert!(
        paid + goal.dust <= goal.pool,
        "INV-4 violated: goal {} pays {} + dust {} out of pool {}",
        goal.id,
        paid,
        goal.dust,
        goal.pool
    );
    if goal.state == GoalState::Closed {
        assert_eq!(
            paid + goal.dust,
            goal.pool,
            "INV-4 violated: closed goal {} leaks value",
            goal.id
        );
    }
}

/// INV-5: at most one claim per participant.
pub fn assert_claims_unique(claims: &[ClaimRecord]) {
    for (i, claim) in claims.iter().enumerate() {
        assert!(
            claims[i + 1..]
                .iter()
                .all(|other| other.participant != claim.participant),
            "INV-5 violated: {} claimed goal {} twice",
            claim.participant,
            claim.goal_id
        );
    }
}

/// INV-6: state only moves forward one step at a time.
pub fn assert_valid_state_transition(from: GoalState, to: GoalState) {
    assert!(
        from == to || from.successor() == Some(to),
        "INV-6 violated: invalid state transition from {:?} to {:?}",
        from,
        to
    );
}

/// INV-7: fields fixed at creation never change.
pub fn assert_goal_immutable_fields(original: &Goal, current: &Goal) {
    assert_eq!(original.id, current.id, "INV-7 violated: goal id changed");
    assert_eq!(
        original.creator, current.creator,
        "INV-7 violated: goal creator changed"
    );
    assert_eq!(
        original.title, current.title,
        "INV-7 violated: goal title changed"
    );
    assert_eq!(
        original.description, current.description,
        "INV-7 violated: goal description changed"
    );
    assert_eq!(
        original.deadline, current.deadline,
        "INV-7 violated: goal deadline changed"
    );
    assert_eq!(
        original.created_at, current.created_at,
        "INV-7 violated: goal created_at changed"
    );
}

/// INV-8: an outcome is cached exactly when the goal left `Open`/`Locked`.
pub fn assert_outcome_cached(goal: &Goal) {
    let resolved = matches!(goal.state, GoalState::Resolved | GoalState::Closed);
    assert_eq!(
        goal.outcome.is_some(),
        resolved,
        "INV-8 violated: goal {} in state {} has outcome {:?}",
        goal.id,
        goal.state,
        goal.outcome
    );
}

/// Run all invariants that need only a goal and its records.
pub fn assert_all_goal_invariants(goal: &Goal, stakes: &[Stake], claims: &[ClaimRecord]) {
    assert_pool_matches_stakes(goal, stakes);
    assert_stakes_positive(goal, stakes);
    assert_stakes_ordered(stakes);
    assert_conservation(goal, claims);
    assert_claims_unique(claims);
    assert_outcome_cached(goal);
}
