use crate::invariants::{assert_all_goal_invariants, assert_valid_state_transition};
use crate::testutils::*;
use crate::{GoalId, GoalState, Ledger, LedgerConfig, LedgerError, Outcome};

fn assert_goal_invariants(ledger: &Ledger, id: GoalId) {
    let goal = ledger.get_goal(id).unwrap();
    let stakes = ledger.stakes_for(id).unwrap();
    let claims = ledger.claims_for(id).unwrap();
    assert_all_goal_invariants(&goal, &stakes, &claims);
}

#[test]
fn test_success_refunds_every_staker() {
    let (mut ledger, oracle) = setup();
    let creator = participant("carol");
    let (a, b) = (participant("a"), participant("b"));
    let id = open_goal(&mut ledger, &creator);

    stake(&mut ledger, id, &a, 100, 1);
    stake(&mut ledger, id, &b, 50, 1);
    oracle.set(id, true);

    assert_eq!(ledger.resolve(id, DEADLINE), Ok(Outcome::Success));
    assert_eq!(ledger.get_goal(id).unwrap().state, GoalState::Resolved);

    assert_eq!(ledger.claim(id, &a, DEADLINE + 1), Ok(100));
    assert_eq!(ledger.claim(id, &b, DEADLINE + 2), Ok(50));
    assert_eq!(
        ledger.claim(id, &a, DEADLINE + 3),
        Err(LedgerError::AlreadyClaimed(id))
    );

    let goal = ledger.get_goal(id).unwrap();
    assert_eq!(goal.state, GoalState::Closed);
    assert_eq!(goal.claimed_total, 150);
    assert_eq!(goal.dust, 0);
    assert_goal_invariants(&ledger, id);
}

#[test]
fn test_failure_forfeits_creator_stake() {
    let (mut ledger, oracle) = setup();
    let creator = participant("c");
    let d = participant("d");
    let id = open_goal(&mut ledger, &creator);

    stake(&mut ledger, id, &creator, 40, 1);
    stake(&mut ledger, id, &d, 60, 1);
    oracle.set(id, false);

    assert_eq!(ledger.resolve(id, DEADLINE), Ok(Outcome::Failure));
    assert_eq!(ledger.get_goal(id).unwrap().pool, 100);
    assert_eq!(ledger.entitlement(id, &creator), Ok(0));
    assert_eq!(ledger.entitlement(id, &d), Ok(100));

    assert_eq!(
        ledger.claim(id, &creator, DEADLINE + 1),
        Err(LedgerError::NoStake(id))
    );
    assert_eq!(ledger.claim(id, &d, DEADLINE + 1), Ok(100));
    // Still NoStake once the goal has closed.
    assert_eq!(
        ledger.claim(id, &creator, DEADLINE + 2),
        Err(LedgerError::NoStake(id))
    );
    assert_eq!(ledger.get_goal(id).unwrap().state, GoalState::Closed);
    assert_goal_invariants(&ledger, id);
}

#[test]
fn test_failure_dust_is_kept_by_goal() {
    let (mut ledger, oracle) = setup();
    let creator = participant("c");
    let (x, y, z) = (participant("x"), participant("y"), participant("z"));
    let id = open_goal(&mut ledger, &creator);

    stake(&mut ledger, id, &creator, 10, 1);
    stake(&mut ledger, id, &x, 1, 1);
    stake(&mut ledger, id, &y, 1, 1);
    stake(&mut ledger, id, &z, 1, 1);
    oracle.set(id, false);
    ledger.resolve(id, DEADLINE).unwrap();

    assert_eq!(ledger.get_goal(id).unwrap().dust, 1);
    for who in [&x, &y, &z] {
        assert_eq!(ledger.claim(id, who, DEADLINE + 1), Ok(4));
    }
    let goal = ledger.get_goal(id).unwrap();
    assert_eq!(goal.state, GoalState::Closed);
    assert_eq!(goal.claimed_total + goal.dust, goal.pool);
    assert_goal_invariants(&ledger, id);
}

#[test]
fn test_resolve_before_deadline_is_too_early() {
    let (mut ledger, oracle) = setup();
    let creator = participant("carol");
    let id = open_goal(&mut ledger, &creator);

    for now in [NOW, DEADLINE - 1] {
        assert_eq!(ledger.resolve(id, now), Err(LedgerError::TooEarly(id)));
    }
    assert_eq!(oracle.calls(), 0);
    assert_eq!(ledger.get_goal(id).unwrap().state, GoalState::Open);
}

#[test]
fn test_resolve_is_idempotent() {
    let (mut ledger, oracle) = setup();
    let creator = participant("carol");
    let a = participant("a");
    let id = open_goal(&mut ledger, &creator);
    stake(&mut ledger, id, &a, 30, 1);
    oracle.set(id, true);

    ledger.resolve(id, DEADLINE).unwrap();
    let after_first = ledger.get_goal(id).unwrap();

    assert_eq!(
        ledger.resolve(id, DEADLINE + 1),
        Err(LedgerError::AlreadyResolved(id))
    );
    assert_eq!(ledger.get_goal(id).unwrap(), after_first);
    assert_eq!(oracle.calls(), 1);
    assert_eq!(after_first.outcome, Some(Outcome::Success));
    assert_eq!(after_first.resolved_at, Some(DEADLINE));
}

#[test]
fn test_resolve_walks_every_state() {
    let (mut ledger, oracle) = setup();
    let creator = participant("carol");
    let a = participant("a");
    let id = open_goal(&mut ledger, &creator);
    stake(&mut ledger, id, &a, 30, 1);
    oracle.set(id, true);

    let mut seen = vec![ledger.get_goal(id).unwrap().state];
    ledger.resolve(id, DEADLINE).unwrap();
    seen.push(ledger.get_goal(id).unwrap().state);
    ledger.claim(id, &a, DEADLINE).unwrap();
    seen.push(ledger.get_goal(id).unwrap().state);

    assert_eq!(
        seen,
        vec![GoalState::Open, GoalState::Resolved, GoalState::Closed]
    );
    for pair in [
        (GoalState::Open, GoalState::Locked),
        (GoalState::Locked, GoalState::Resolved),
        (GoalState::Resolved, GoalState::Closed),
    ] {
        assert_valid_state_transition(pair.0, pair.1);
    }
}

#[test]
fn test_empty_goal_closes_at_resolution() {
    let (mut ledger, oracle) = setup();
    let creator = participant("carol");
    let id = open_goal(&mut ledger, &creator);
    oracle.set(id, true);

    assert_eq!(ledger.resolve(id, DEADLINE), Ok(Outcome::Success));
    let goal = ledger.get_goal(id).unwrap();
    assert_eq!(goal.state, GoalState::Closed);
    assert_eq!(goal.outcome, Some(Outcome::Success));
    assert_eq!(
        ledger.claim(id, &creator, DEADLINE),
        Err(LedgerError::NoStake(id))
    );
}

#[test]
fn test_failed_solo_goal_keeps_pool_as_dust() {
    let (mut ledger, _) = setup();
    let creator = participant("carol");
    let id = open_goal(&mut ledger, &creator);
    stake(&mut ledger, id, &creator, 40, 1);

    // Unset answers count as "not met".
    assert_eq!(ledger.resolve(id, DEADLINE), Ok(Outcome::Failure));
    let goal = ledger.get_goal(id).unwrap();
    assert_eq!(goal.state, GoalState::Closed);
    assert_eq!(goal.dust, 40);
    assert_goal_invariants(&ledger, id);
}

#[test]
fn test_claim_requires_resolution() {
    let (mut ledger, _) = setup();
    let creator = participant("carol");
    let a = participant("a");
    let id = open_goal(&mut ledger, &creator);
    stake(&mut ledger, id, &a, 30, 1);

    assert_eq!(ledger.claim(id, &a, NOW), Err(LedgerError::NotResolved(id)));
    assert_eq!(ledger.entitlement(id, &a), Ok(0));
    assert_eq!(
        ledger.claim(GoalId(77), &a, NOW),
        Err(LedgerError::NotFound(GoalId(77)))
    );
}

#[test]
fn test_claim_without_stake_is_rejected() {
    let (mut ledger, oracle) = setup();
    let creator = participant("carol");
    let (a, stranger) = (participant("a"), participant("stranger"));
    let id = open_goal(&mut ledger, &creator);
    stake(&mut ledger, id, &a, 30, 1);
    oracle.set(id, true);
    ledger.resolve(id, DEADLINE).unwrap();

    assert_eq!(
        ledger.claim(id, &stranger, DEADLINE),
        Err(LedgerError::NoStake(id))
    );
    assert!(ledger.claims_for(id).unwrap().is_empty());
}

#[test]
fn test_grace_period_closes_unclaimed_goal() {
    let grace = 500;
    let (mut ledger, oracle) = setup_with(LedgerConfig {
        claim_grace_period: grace,
        ..LedgerConfig::default()
    });
    let creator = participant("carol");
    let (a, b) = (participant("a"), participant("b"));
    let id = open_goal(&mut ledger, &creator);
    stake(&mut ledger, id, &a, 30, 1);
    stake(&mut ledger, id, &b, 20, 1);
    oracle.set(id, true);
    ledger.resolve(id, DEADLINE).unwrap();
    ledger.claim(id, &a, DEADLINE + 1).unwrap();

    assert_eq!(
        ledger.close_expired(id, DEADLINE + grace - 1),
        Err(LedgerError::ClaimWindowOpen(id))
    );
    assert_eq!(ledger.close_expired(id, DEADLINE + grace), Ok(20));

    let goal = ledger.get_goal(id).unwrap();
    assert_eq!(goal.state, GoalState::Closed);
    assert_eq!(goal.dust, 20);
    assert_eq!(
        ledger.claim(id, &b, DEADLINE + grace + 1),
        Err(LedgerError::ClaimWindowClosed(id))
    );
    assert_eq!(
        ledger.claim(id, &a, DEADLINE + grace + 1),
        Err(LedgerError::AlreadyClaimed(id))
    );
    assert_eq!(
        ledger.close_expired(id, DEADLINE + grace + 1),
        Err(LedgerError::ClaimWindowClosed(id))
    );
    assert_goal_invariants(&ledger, id);
}

#[test]
fn test_close_expired_requires_resolution() {
    let (mut ledger, _) = setup();
    let creator = participant("carol");
    let id = open_goal(&mut ledger, &creator);

    assert_eq!(
        ledger.close_expired(id, DEADLINE + 1_000_000),
        Err(LedgerError::NotResolved(id))
    );
}

#[test]
fn test_entitlement_drops_to_zero_after_claim() {
    let (mut ledger, oracle) = setup();
    let creator = participant("carol");
    let (a, b) = (participant("a"), participant("b"));
    let id = open_goal(&mut ledger, &creator);
    stake(&mut ledger, id, &a, 30, 1);
    stake(&mut ledger, id, &b, 20, 1);
    oracle.set(id, true);
    ledger.resolve(id, DEADLINE).unwrap();

    assert_eq!(ledger.entitlement(id, &a), Ok(30));
    ledger.claim(id, &a, DEADLINE).unwrap();
    assert_eq!(ledger.entitlement(id, &a), Ok(0));
    assert_eq!(ledger.entitlement(id, &b), Ok(20));

    let record = &ledger.claims_for(id).unwrap()[0];
    assert_eq!(record.participant, a);
    assert_eq!(record.amount_paid, 30);
    assert_eq!(record.claimed_at, DEADLINE);
}

#[test]
fn test_goals_resolve_independently() {
    let (mut ledger, oracle) = setup();
    let creator = participant("carol");
    let a = participant("a");
    let won = open_goal(&mut ledger, &creator);
    let lost = open_goal(&mut ledger, &creator);
    stake(&mut ledger, won, &a, 10, 1);
    stake(&mut ledger, lost, &a, 10, 2);
    stake(&mut ledger, lost, &creator, 30, 3);
    oracle.set(won, true);
    oracle.set(lost, false);

    ledger.resolve(won, DEADLINE).unwrap();
    assert_eq!(ledger.get_goal(lost).unwrap().state, GoalState::Open);
    ledger.resolve(lost, DEADLINE).unwrap();

    assert_eq!(ledger.claim(won, &a, DEADLINE), Ok(10));
    assert_eq!(ledger.claim(lost, &a, DEADLINE), Ok(40));
    assert_goal_invariants(&ledger, won);
    assert_goal_invariants(&ledger, lost);
}
