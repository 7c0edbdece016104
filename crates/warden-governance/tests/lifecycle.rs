//! Proposal lifecycle tests against the composed engine.

mod common;

use common::*;
use proptest::prelude::*;
use warden_governance::{
    Call, GovernanceError, GovernanceEvent, GovernorCall, ProposalState, TimelockCall, TokenAmount, VoteSupport,
};
use warden_types::{Address, Amount, Hash, RoleId};

#[test_log::test]
fn test_state_walks_the_voting_window() {
    let mut dao = dao();
    let calls = vec![Call::transfer(voter("payee"), 1)];
    let id = dao.propose(admin(), calls, vec![], "window").unwrap();
    let p = dao.proposal(&id).unwrap().clone();
    assert_eq!(p.vote_start, p.created_block + 1);
    assert_eq!(p.vote_end, p.vote_start + 5);

    assert_eq!(dao.state(&id).unwrap(), ProposalState::Pending);
    let err = dao.cast_vote(voter("early"), &id, VoteSupport::For).unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidState(_)));

    dao.advance_blocks(1);
    assert_eq!(dao.state(&id).unwrap(), ProposalState::Active);
    dao.advance_blocks(5);
    assert_eq!(dao.block_number(), p.vote_end);
    assert_eq!(dao.state(&id).unwrap(), ProposalState::Active);

    dao.advance_blocks(1);
    // Nobody voted for it
    assert_eq!(dao.state(&id).unwrap(), ProposalState::Defeated);
    let err = dao.cast_vote(voter("late"), &id, VoteSupport::For).unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidState(_)));
}

#[test_log::test]
fn test_double_vote_rejected() {
    let mut dao = dao();
    let id = dao
        .propose(admin(), vec![Call::transfer(voter("payee"), 1)], vec![], "twice")
        .unwrap();
    dao.advance_blocks(1);

    let weight = dao.cast_vote(voter("v"), &id, VoteSupport::For).unwrap();
    assert_eq!(weight, BASE_POWER);
    let err = dao.cast_vote(voter("v"), &id, VoteSupport::Against).unwrap_err();
    assert!(matches!(err, GovernanceError::AlreadyDone(_)));

    let p = dao.proposal(&id).unwrap();
    assert_eq!(p.for_votes, BASE_POWER);
    assert_eq!(p.against_votes, 0);
    assert_eq!(dao.get_receipt(&id, &voter("v")).unwrap().support, VoteSupport::For);
}

#[test_log::test]
fn test_quorum_boundary() {
    let mut config = config();
    config.governor.default_quorum = TokenAmount(10);
    let mut dao = dao_with(&config);
    dao.oracle_mut().set_base_power(voter("ten"), 10);
    dao.oracle_mut().set_base_power(voter("nine"), 9);
    dao.oracle_mut().set_base_power(voter("nine-against"), 9);

    let at_quorum = dao
        .propose(admin(), vec![Call::transfer(voter("a"), 1)], vec![], "at quorum")
        .unwrap();
    let below = dao
        .propose(admin(), vec![Call::transfer(voter("b"), 1)], vec![], "below quorum")
        .unwrap();
    dao.advance_blocks(1);

    dao.cast_vote(voter("ten"), &at_quorum, VoteSupport::For).unwrap();
    dao.cast_vote(voter("nine-against"), &at_quorum, VoteSupport::Against).unwrap();
    dao.cast_vote(voter("nine"), &below, VoteSupport::For).unwrap();
    close_voting(&mut dao, &at_quorum);

    assert_eq!(dao.state(&at_quorum).unwrap(), ProposalState::Succeeded);
    assert_eq!(dao.state(&below).unwrap(), ProposalState::Defeated);
}

#[test_log::test]
fn test_abstain_counts_toward_nothing() {
    let mut dao = dao();
    let id = dao
        .propose(admin(), vec![Call::transfer(voter("payee"), 1)], vec![], "abstain")
        .unwrap();
    dao.advance_blocks(1);
    dao.cast_vote(voter("a"), &id, VoteSupport::Abstain).unwrap();
    close_voting(&mut dao, &id);

    assert_eq!(dao.proposal(&id).unwrap().abstain_votes, BASE_POWER);
    assert_eq!(dao.state(&id).unwrap(), ProposalState::Defeated);
}

#[test_log::test]
fn test_duplicate_proposal_rejected() {
    let mut dao = dao();
    let calls = vec![Call::transfer(voter("payee"), 1)];
    let id = dao.propose(admin(), calls.clone(), vec![], "same").unwrap();
    assert_eq!(dao.hash_proposal(&calls, "same").unwrap(), id);

    let err = dao.propose(voter("other"), calls, vec![], "same").unwrap_err();
    assert!(matches!(err, GovernanceError::AlreadyDone(_)));
}

#[test_log::test]
fn test_execute_twice_applies_once() {
    let mut dao = dao();
    let timelock = dao.addresses().timelock;
    fund(&mut dao, timelock, 1_000);
    let calls = vec![Call::transfer(voter("payee"), 400)];
    pass_and_execute(&mut dao, &calls, "pay once");

    let err = dao.execute(admin(), &calls, "pay once").unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidState(_)));
    assert_eq!(balance(&dao, &voter("payee")), 400);
    assert_eq!(balance(&dao, &timelock), 600);
}

#[test_log::test]
fn test_failed_execute_stays_queued_until_expiry() {
    let mut dao = dao();
    let timelock = dao.addresses().timelock;
    let calls = vec![Call::transfer(voter("payee"), 500)];
    let id = pass_and_queue(&mut dao, &calls, "unfunded");

    let err = dao.execute(admin(), &calls, "unfunded").unwrap_err();
    assert!(matches!(err, GovernanceError::InsufficientFunds(_)));
    assert_eq!(dao.state(&id).unwrap(), ProposalState::Queued);

    fund(&mut dao, timelock, 500);
    dao.execute(admin(), &calls, "unfunded").unwrap();
    assert_eq!(dao.state(&id).unwrap(), ProposalState::Executed);
    assert_eq!(balance(&dao, &voter("payee")), 500);
}

#[test_log::test]
fn test_queued_proposal_expires() {
    let mut dao = dao();
    let calls = vec![Call::transfer(voter("payee"), 1)];
    let id = pass_and_queue(&mut dao, &calls, "too late");

    dao.advance_time(dao.timelock().grace_period() + 1);
    assert_eq!(dao.state(&id).unwrap(), ProposalState::Expired);
    assert!(dao.execute(admin(), &calls, "too late").is_err());
}

#[test_log::test]
fn test_cancelled_batch_cannot_be_rescheduled() {
    let mut config = config();
    config.timelock.proposers = vec![voter("keeper")];
    let mut dao = dao_with(&config);
    let calls = vec![Call::transfer(voter("payee"), 1)];
    let id = pass_and_queue(&mut dao, &calls, "retired");
    let op_id = dao.proposal(&id).unwrap().operations[0];
    let op = dao.timelock().operation(&op_id).unwrap().clone();

    dao.timelock_cancel(voter("keeper"), &op_id).unwrap();
    assert_eq!(dao.state(&id).unwrap(), ProposalState::Canceled);

    // Same call and salt gives the same id, which stays retired
    let delay = dao.timelock().min_delay();
    let err = dao.timelock_schedule(voter("keeper"), op.call, op.salt, delay).unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidState(_)));
    assert_eq!(dao.state(&id).unwrap(), ProposalState::Canceled);
    assert!(dao.execute(admin(), &calls, "retired").is_err());
}

#[test_log::test]
fn test_batch_operations_run_only_through_the_proposal() {
    let mut config = config();
    config.timelock.open_executor = true;
    config.timelock.proposers = vec![voter("keeper")];
    let mut dao = dao_with(&config);
    let timelock = dao.addresses().timelock;
    fund(&mut dao, timelock, 11);
    let calls = vec![Call::transfer(voter("a"), 5), Call::transfer(voter("b"), 5)];
    let id = pass_and_queue(&mut dao, &calls, "pair");
    let ops = dao.proposal(&id).unwrap().operations.clone();

    let err = dao.timelock_execute(voter("anyone"), &ops[0]).unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidState(_)));
    assert_eq!(balance(&dao, &voter("a")), 0);
    assert_eq!(dao.state(&id).unwrap(), ProposalState::Queued);

    dao.execute(voter("anyone"), &calls, "pair").unwrap();
    assert_eq!(dao.state(&id).unwrap(), ProposalState::Executed);
    assert_eq!(balance(&dao, &voter("a")), 5);
    assert_eq!(balance(&dao, &voter("b")), 5);

    // Operations scheduled outside a proposal still run directly
    let delay = dao.timelock().min_delay();
    let single = dao
        .timelock_schedule(voter("keeper"), Call::transfer(voter("c"), 1), Hash::compute(b"single"), delay)
        .unwrap();
    dao.advance_time(delay);
    dao.timelock_execute(voter("anyone"), &single).unwrap();
    assert_eq!(balance(&dao, &voter("c")), 1);
}

#[test_log::test]
fn test_execute_before_ready_rejected() {
    let mut config = config();
    config.timelock.min_delay = 3_600;
    let mut dao = dao_with(&config);
    let calls = vec![Call::transfer(voter("payee"), 0)];
    let id = dao.propose(admin(), calls.clone(), vec![], "wait").unwrap();
    dao.advance_blocks(1);
    dao.cast_vote(voter("yes"), &id, VoteSupport::For).unwrap();
    close_voting(&mut dao, &id);
    dao.queue(&calls, "wait").unwrap();

    let err = dao.execute(admin(), &calls, "wait").unwrap_err();
    assert!(matches!(err, GovernanceError::NotReady(_)));
    dao.advance_time(3_600);
    dao.execute(admin(), &calls, "wait").unwrap();
}

#[test_log::test]
fn test_cancel_rules() {
    let mut config = config();
    config.governor.guardian = Some(voter("guardian"));
    let mut dao = dao_with(&config);

    let pending = dao
        .propose(admin(), vec![Call::transfer(voter("a"), 1)], vec![], "pending")
        .unwrap();
    let err = dao.cancel(voter("stranger"), &pending).unwrap_err();
    assert!(matches!(err, GovernanceError::Unauthorized(_)));
    dao.cancel(admin(), &pending).unwrap();
    assert_eq!(dao.state(&pending).unwrap(), ProposalState::Canceled);

    let active = dao
        .propose(admin(), vec![Call::transfer(voter("b"), 1)], vec![], "active")
        .unwrap();
    dao.advance_blocks(1);
    dao.cancel(voter("guardian"), &active).unwrap();
    assert_eq!(dao.state(&active).unwrap(), ProposalState::Canceled);

    let calls = vec![Call::transfer(voter("c"), 0)];
    let done = pass_and_queue(&mut dao, &calls, "queued");
    let err = dao.cancel(admin(), &done).unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidState(_)));
}

#[test_log::test]
fn test_role_context_weights() {
    let mut dao = dao();
    let role = developer_role();
    let calls = vec![Call::transfer(voter("a"), 0), Call::transfer(voter("b"), 0)];
    let id = dao
        .propose(admin(), calls, vec![role, RoleId::EMPTY], "mixed")
        .unwrap();
    dao.advance_blocks(1);

    // Member: role power plus base power for the base-context call
    let dev = dao.cast_vote(developer(), &id, VoteSupport::For).unwrap();
    assert_eq!(dev, ROLE_POWER + BASE_POWER);
    // Non-member qualifies for the base context only
    let other = dao.cast_vote(voter("other"), &id, VoteSupport::For).unwrap();
    assert_eq!(other, BASE_POWER);

    assert_eq!(dao.get_votes(&developer()), BASE_POWER);
    assert_eq!(dao.get_votes_for_role(&developer(), &role).unwrap(), ROLE_POWER);
    assert_eq!(dao.get_votes_for_role(&voter("other"), &role).unwrap(), 0);
}

#[test_log::test]
fn test_non_member_vote_is_recorded_with_zero_weight() {
    let mut dao = dao();
    let id = dao
        .propose(admin(), vec![Call::transfer(voter("a"), 0)], vec![developer_role()], "devs only")
        .unwrap();
    dao.advance_blocks(1);

    let weight = dao.cast_vote(voter("outsider"), &id, VoteSupport::For).unwrap();
    assert_eq!(weight, 0);
    assert!(dao.get_receipt(&id, &voter("outsider")).is_some());
    assert_eq!(dao.proposal(&id).unwrap().for_votes, 0);
}

#[test_log::test]
fn test_live_oracle_changes_only_later_votes() {
    let mut dao = dao();
    let id = dao
        .propose(admin(), vec![Call::transfer(voter("a"), 0)], vec![], "live")
        .unwrap();
    dao.advance_blocks(1);

    dao.cast_vote(voter("first"), &id, VoteSupport::For).unwrap();
    dao.oracle_mut().set_base_power(voter("first"), 1);
    dao.oracle_mut().set_default_base_power(7);
    let second = dao.cast_vote(voter("second"), &id, VoteSupport::For).unwrap();

    assert_eq!(second, 7);
    assert_eq!(dao.get_receipt(&id, &voter("first")).unwrap().weight, BASE_POWER);
    assert_eq!(dao.proposal(&id).unwrap().for_votes, BASE_POWER + 7);
}

#[test_log::test]
fn test_new_role_through_governance() {
    let mut dao = dao();
    let governor = dao.addresses().governor;
    let audit = RoleId::from_name("AUDIT_ROLE");
    let calls = vec![
        Call::action(governor, &GovernorCall::RegisterRole { role: audit, name: "AUDIT_ROLE".to_string() }).unwrap(),
        Call::action(governor, &GovernorCall::GrantRole { role: audit, account: voter("auditor") }).unwrap(),
        Call::action(governor, &GovernorCall::SetQuorum { role: audit, quorum: 3 }).unwrap(),
    ];
    pass_and_execute(&mut dao, &calls, "add auditors");

    assert_eq!(dao.roles_list(3), Some(audit));
    assert!(dao.has_role(&audit, &voter("auditor")));
    assert_eq!(dao.governor().quorum_for(&[audit]), 3);
    assert!(dao
        .events()
        .events()
        .contains(&GovernanceEvent::RoleGranted { role: audit, account: voter("auditor") }));
}

#[test_log::test]
fn test_privileged_actions_need_the_timelock() {
    let mut dao = dao();
    let timelock = dao.addresses().timelock;
    let call = Call::action(timelock, &TimelockCall::UpdateDelay { min_delay: 0 }).unwrap();

    // Direct scheduling is reserved for proposers
    let err = dao
        .timelock_schedule(admin(), call.clone(), Hash::ZERO, 1)
        .unwrap_err();
    assert!(matches!(err, GovernanceError::Unauthorized(_)));

    pass_and_execute(&mut dao, &[call], "no delay");
    assert_eq!(dao.timelock().min_delay(), 0);
}

#[test_log::test]
fn test_proposal_threshold() {
    let mut config = config();
    config.governor.proposal_threshold = TokenAmount(BASE_POWER + 1);
    let mut dao = dao_with(&config);

    let err = dao
        .propose(admin(), vec![Call::transfer(voter("a"), 0)], vec![], "small")
        .unwrap_err();
    assert!(matches!(err, GovernanceError::Unauthorized(_)));

    dao.oracle_mut().set_base_power(admin(), BASE_POWER + 1);
    dao.propose(admin(), vec![Call::transfer(voter("a"), 0)], vec![], "small").unwrap();
}

#[test_log::test]
fn test_vote_reason_is_logged() {
    let mut dao = dao();
    let id = dao
        .propose(admin(), vec![Call::transfer(voter("a"), 0)], vec![], "why")
        .unwrap();
    dao.advance_blocks(1);
    dao.cast_vote_with_reason(voter("v"), &id, VoteSupport::Against, "too expensive")
        .unwrap();

    match dao.events().events().last() {
        Some(GovernanceEvent::VoteCast { reason, support, .. }) => {
            assert_eq!(reason, "too expensive");
            assert_eq!(*support, VoteSupport::Against);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

fn rank(state: ProposalState) -> u8 {
    match state {
        ProposalState::Pending => 0,
        ProposalState::Active => 1,
        _ => 2,
    }
}

proptest! {
    #[test]
    fn prop_state_never_oscillates(
        steps in proptest::collection::vec((0u64..4, proptest::option::of(0u8..3)), 1..20),
    ) {
        let mut dao = dao();
        let id = dao
            .propose(admin(), vec![Call::transfer(Address::from_label("p"), 0)], vec![], "prop")
            .unwrap();
        let mut last = dao.state(&id).unwrap();

        for (i, (blocks, vote)) in steps.into_iter().enumerate() {
            dao.advance_blocks(blocks);
            if let Some(support) = vote {
                let support = warden_governance::VoteSupport::try_from(support).unwrap();
                let _ = dao.cast_vote(Address::from_label(&format!("voter-{}", i)), &id, support);
            }
            let now = dao.state(&id).unwrap();
            prop_assert!(rank(now) >= rank(last));
            if rank(last) == 2 {
                prop_assert_eq!(now, last);
            }
            last = now;
        }

        let p = dao.proposal(&id).unwrap();
        let total: Amount = p.receipts.values().map(|r| r.weight).sum();
        prop_assert_eq!(total, p.for_votes + p.against_votes + p.abstain_votes);
    }
}
