use std::sync::Arc;

use crate::invariants::{assert_all_goal_invariants, assert_goal_immutable_fields};
use crate::permit::verify_permit;
use crate::testutils::*;
use crate::{
    AuthorizationError, GoalId, GoalState, LedgerConfig, LedgerError, NewGoal, PermitAuthorization,
    PermitVerifier, StakeId, VerificationRule,
};

#[test]
fn test_create_goal_starts_open_and_empty() {
    let (mut ledger, _) = setup();
    let creator = participant("carol");

    let id = open_goal(&mut ledger, &creator);
    let goal = ledger.get_goal(id).unwrap();

    assert_eq!(id, GoalId(0));
    assert_eq!(goal.state, GoalState::Open);
    assert_eq!(goal.pool, 0);
    assert_eq!(goal.creator, creator);
    assert_eq!(goal.created_at, NOW);
    assert_eq!(goal.deadline, DEADLINE);
    assert_eq!(goal.outcome, None);
    assert!(ledger.stakes_for(id).unwrap().is_empty());
}

#[test]
fn test_goal_ids_are_sequential() {
    let (mut ledger, _) = setup();
    let creator = participant("carol");

    let ids: Vec<GoalId> = (0..3).map(|_| open_goal(&mut ledger, &creator)).collect();
    assert_eq!(ids, vec![GoalId(0), GoalId(1), GoalId(2)]);
    assert_eq!(ledger.goal_count(), 3);
    assert_eq!(
        ledger.goals().iter().map(|g| g.id).collect::<Vec<_>>(),
        ids
    );
}

#[test]
fn test_create_goal_rejects_past_or_present_deadline() {
    let (mut ledger, _) = setup();
    let creator = participant("carol");

    assert_eq!(
        ledger.create_goal(creator.clone(), new_goal(NOW), NOW),
        Err(LedgerError::InvalidDeadline)
    );
    assert_eq!(
        ledger.create_goal(creator, new_goal(NOW - 1), NOW),
        Err(LedgerError::InvalidDeadline)
    );
    assert_eq!(ledger.goal_count(), 0);
}

#[test]
fn test_create_goal_rejects_blank_text() {
    let (mut ledger, _) = setup();
    let creator = participant("carol");

    let blank_title = NewGoal {
        title: "   ".into(),
        ..new_goal(DEADLINE)
    };
    let blank_description = NewGoal {
        description: String::new(),
        ..new_goal(DEADLINE)
    };

    assert!(matches!(
        ledger.create_goal(creator.clone(), blank_title, NOW),
        Err(LedgerError::InvalidInput(_))
    ));
    assert!(matches!(
        ledger.create_goal(creator, blank_description, NOW),
        Err(LedgerError::InvalidInput(_))
    ));
    assert!(ledger.take_outbox().is_empty());
}

#[test]
fn test_create_goal_enforces_configured_limits() {
    let (mut ledger, _) = setup_with(LedgerConfig {
        max_title_len: 5,
        max_goal_duration: 100,
        ..LedgerConfig::default()
    });
    let creator = participant("carol");

    let long_title = NewGoal {
        title: "marathon".into(),
        ..new_goal(NOW + 50)
    };
    assert!(matches!(
        ledger.create_goal(creator.clone(), long_title, NOW),
        Err(LedgerError::InvalidInput(_))
    ));

    let too_far = NewGoal {
        title: "run".into(),
        ..new_goal(NOW + 101)
    };
    assert!(matches!(
        ledger.create_goal(creator.clone(), too_far, NOW),
        Err(LedgerError::InvalidInput(_))
    ));

    let ok = NewGoal {
        title: "  run ".into(),
        rule: VerificationRule::Github,
        ..new_goal(NOW + 100)
    };
    let id = ledger.create_goal(creator, ok, NOW).unwrap();
    let goal = ledger.get_goal(id).unwrap();
    assert_eq!(goal.title, "run");
    assert_eq!(goal.rule, VerificationRule::Github);
}

#[test]
fn test_get_unknown_goal_is_not_found() {
    let (ledger, _) = setup();
    assert_eq!(ledger.get_goal(GoalId(9)), Err(LedgerError::NotFound(GoalId(9))));
    assert_eq!(ledger.stakes_for(GoalId(9)), Err(LedgerError::NotFound(GoalId(9))));
}

#[test]
fn test_repeat_deposits_grow_one_stake() {
    let (mut ledger, _) = setup();
    let creator = participant("carol");
    let alice = participant("alice");
    let id = open_goal(&mut ledger, &creator);

    let first = ledger
        .deposit(id, &alice, 100, permit(&alice, 100, 1), NOW + 1)
        .unwrap();
    let second = ledger
        .deposit(id, &alice, 50, permit(&alice, 50, 2), NOW + 2)
        .unwrap();

    assert_eq!(first, second);
    let stakes = ledger.stakes_for(id).unwrap();
    assert_eq!(stakes.len(), 1);
    assert_eq!(stakes[0].amount, 150);
    assert_eq!(stakes[0].deposited_at, NOW + 1);
    assert_eq!(stakes[0].updated_at, NOW + 2);

    let goal = ledger.get_goal(id).unwrap();
    assert_eq!(goal.pool, 150);
    assert_all_goal_invariants(&goal, &stakes, &[]);
}

#[test]
fn test_stakes_ordered_by_first_deposit() {
    let (mut ledger, _) = setup();
    let creator = participant("carol");
    let (a, b, c) = (participant("a"), participant("b"), participant("c"));
    let id = open_goal(&mut ledger, &creator);

    ledger.deposit(id, &b, 10, permit(&b, 10, 1), NOW + 5).unwrap();
    ledger.deposit(id, &a, 10, permit(&a, 10, 1), NOW + 5).unwrap();
    ledger.deposit(id, &c, 10, permit(&c, 10, 1), NOW + 3).unwrap();
    // A later top-up does not move b.
    ledger.deposit(id, &b, 10, permit(&b, 10, 2), NOW + 9).unwrap();

    let order: Vec<_> = ledger
        .stakes_for(id)
        .unwrap()
        .into_iter()
        .map(|s| (s.participant, s.id))
        .collect();
    assert_eq!(
        order,
        vec![(c, StakeId(2)), (b, StakeId(0)), (a, StakeId(1))]
    );
}

#[test]
fn test_deposit_rejects_zero_and_below_minimum() {
    let (mut ledger, _) = setup_with(LedgerConfig {
        min_stake: 10,
        ..LedgerConfig::default()
    });
    let creator = participant("carol");
    let alice = participant("alice");
    let id = open_goal(&mut ledger, &creator);

    assert_eq!(
        ledger.deposit(id, &alice, 0, permit(&alice, 0, 1), NOW),
        Err(LedgerError::InvalidAmount)
    );
    assert_eq!(
        ledger.deposit(id, &alice, 9, permit(&alice, 9, 1), NOW),
        Err(LedgerError::InvalidAmount)
    );
    // Rejected deposits leave the nonce unspent.
    assert!(!ledger.is_nonce_consumed(&alice, 1));
    ledger
        .deposit(id, &alice, 10, permit(&alice, 10, 1), NOW)
        .unwrap();
}

#[test]
fn test_deposit_respects_pool_cap() {
    let (mut ledger, _) = setup_with(LedgerConfig {
        pool_cap: Some(100),
        ..LedgerConfig::default()
    });
    let creator = participant("carol");
    let alice = participant("alice");
    let id = open_goal(&mut ledger, &creator);

    stake(&mut ledger, id, &alice, 80, 1);
    assert_eq!(
        ledger.deposit(id, &alice, 21, permit(&alice, 21, 2), NOW),
        Err(LedgerError::PoolCapExceeded(id))
    );
    assert!(!ledger.is_nonce_consumed(&alice, 2));
    stake(&mut ledger, id, &alice, 20, 2);
    assert_eq!(ledger.get_goal(id).unwrap().pool, 100);
}

#[test]
fn test_deposit_into_unknown_goal_is_not_found() {
    let (mut ledger, _) = setup();
    let alice = participant("alice");
    assert_eq!(
        ledger.deposit(GoalId(4), &alice, 5, permit(&alice, 5, 1), NOW),
        Err(LedgerError::NotFound(GoalId(4)))
    );
    assert!(!ledger.is_nonce_consumed(&alice, 1));
}

#[test]
fn test_permit_must_match_caller_and_amount() {
    let (mut ledger, _) = setup();
    let creator = participant("carol");
    let alice = participant("alice");
    let mallory = participant("mallory");
    let id = open_goal(&mut ledger, &creator);

    assert_eq!(
        ledger.deposit(id, &mallory, 100, permit(&alice, 100, 1), NOW),
        Err(AuthorizationError::ParticipantMismatch.into())
    );
    assert_eq!(
        ledger.deposit(id, &alice, 90, permit(&alice, 100, 1), NOW),
        Err(AuthorizationError::AmountMismatch.into())
    );
    assert!(!ledger.is_nonce_consumed(&alice, 1));
}

#[test]
fn test_replayed_permit_is_rejected() {
    let (mut ledger, _) = setup();
    let creator = participant("carol");
    let alice = participant("alice");
    let first = open_goal(&mut ledger, &creator);
    let second = open_goal(&mut ledger, &creator);
    let grant = permit(&alice, 100, 7);

    ledger.deposit(first, &alice, 100, grant.clone(), NOW).unwrap();
    assert_eq!(
        ledger.deposit(first, &alice, 100, grant.clone(), NOW),
        Err(AuthorizationError::ReplayedNonce.into())
    );
    // The nonce is spent ledger-wide, not per goal.
    assert_eq!(
        ledger.deposit(second, &alice, 100, grant, NOW),
        Err(AuthorizationError::ReplayedNonce.into())
    );
    assert_eq!(ledger.get_goal(first).unwrap().pool, 100);
    assert_eq!(ledger.get_goal(second).unwrap().pool, 0);
}

#[test]
fn test_expired_permit_is_rejected() {
    let (mut ledger, _) = setup();
    let creator = participant("carol");
    let alice = participant("alice");
    let id = open_goal(&mut ledger, &creator);
    let grant = PermitAuthorization::sign(&issuer(), alice.clone(), 100, 1, NOW + 5);

    assert_eq!(
        ledger.deposit(id, &alice, 100, grant, NOW + 6),
        Err(AuthorizationError::Expired.into())
    );
    assert_eq!(ledger.get_goal(id).unwrap().pool, 0);
}

#[test]
fn test_forged_permit_is_rejected() {
    let (mut ledger, _) = setup();
    let creator = participant("carol");
    let alice = participant("alice");
    let id = open_goal(&mut ledger, &creator);
    let forger = ed25519_dalek::SigningKey::from_bytes(&[1u8; 32]);
    let grant = PermitAuthorization::sign(&forger, alice.clone(), 100, 1, DEADLINE);

    assert_eq!(
        ledger.deposit(id, &alice, 100, grant, NOW),
        Err(AuthorizationError::InvalidSignature.into())
    );
    assert!(!ledger.is_nonce_consumed(&alice, 1));
}

struct AcceptAll;

impl PermitVerifier for AcceptAll {
    fn verify(&self, _permit: &PermitAuthorization) -> bool {
        true
    }
}

#[test]
fn test_permit_verified_by_foreign_verifier_cannot_deposit() {
    let (mut ledger, _) = setup();
    let creator = participant("carol");
    let mallory = participant("mallory");
    let id = open_goal(&mut ledger, &creator);
    let forged = PermitAuthorization {
        participant: mallory.clone(),
        amount: 500,
        nonce: 1,
        expires_at: DEADLINE,
        signature: vec![0u8; 64],
    };
    let lenient: Arc<dyn PermitVerifier> = Arc::new(AcceptAll);
    let verified = verify_permit(&lenient, forged, NOW + 1).unwrap();

    assert_eq!(
        ledger.deposit_verified(id, &mallory, 500, verified, NOW + 1),
        Err(AuthorizationError::InvalidSignature.into())
    );
    assert_eq!(ledger.get_goal(id).unwrap().pool, 0);
    assert!(!ledger.is_nonce_consumed(&mallory, 1));
}

#[test]
fn test_deposit_closes_at_deadline() {
    let (mut ledger, _) = setup();
    let creator = participant("carol");
    let alice = participant("alice");
    let id = open_goal(&mut ledger, &creator);

    assert_eq!(
        ledger.deposit(id, &alice, 10, permit(&alice, 10, 1), DEADLINE),
        Err(LedgerError::GoalNotOpen(id))
    );
    ledger
        .deposit(id, &alice, 10, permit(&alice, 10, 1), DEADLINE - 1)
        .unwrap();
}

#[test]
fn test_deposit_after_resolve_is_rejected() {
    let (mut ledger, oracle) = setup();
    let creator = participant("carol");
    let alice = participant("alice");
    let id = open_goal(&mut ledger, &creator);
    stake(&mut ledger, id, &alice, 10, 1);
    oracle.set(id, true);
    let before = ledger.get_goal(id).unwrap();

    ledger.resolve(id, DEADLINE).unwrap();

    for now in [NOW, DEADLINE - 1, DEADLINE, DEADLINE + 1_000] {
        assert_eq!(
            ledger.deposit(id, &alice, 10, permit(&alice, 10, 2), now),
            Err(LedgerError::GoalNotOpen(id))
        );
    }
    assert!(!ledger.is_nonce_consumed(&alice, 2));
    assert_goal_immutable_fields(&before, &ledger.get_goal(id).unwrap());
}

#[test]
fn test_failed_operations_leave_no_trace() {
    let (mut ledger, _) = setup();
    let creator = participant("carol");
    let alice = participant("alice");
    let id = open_goal(&mut ledger, &creator);
    stake(&mut ledger, id, &alice, 10, 1);
    ledger.take_outbox();

    let goal = ledger.get_goal(id).unwrap();
    let stakes = ledger.stakes_for(id).unwrap();

    let _ = ledger.deposit(id, &alice, 10, permit(&alice, 10, 1), NOW);
    let _ = ledger.deposit(id, &alice, 0, permit(&alice, 0, 2), NOW);
    let _ = ledger.resolve(id, NOW);
    let _ = ledger.claim(id, &alice, NOW);

    assert_eq!(ledger.get_goal(id).unwrap(), goal);
    assert_eq!(ledger.stakes_for(id).unwrap(), stakes);
    assert!(!ledger.is_nonce_consumed(&alice, 2));
    assert!(ledger.take_outbox().is_empty());
}
