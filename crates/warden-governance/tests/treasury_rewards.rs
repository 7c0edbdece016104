//! Treasury, insurance and rewards flows driven through governance.

mod common;

use common::*;
use warden_governance::{
    Call, GovernanceError, GovernanceEvent, ProposalState, RewardsCall, TokenAmount, TokenLedger, TreasuryCall,
    VoteSupport,
};
use warden_types::{Address, Amount};

const COST: Amount = 1_000_000_000;
const LIMIT: Amount = 10 * E18;
const UNITS: u64 = 300;

fn beneficiary() -> Address {
    voter("beneficiary")
}

fn insure_call(dao: &TestDao, to: Address, limit: Amount) -> Call {
    let token = dao.addresses().token;
    Call::action(
        dao.addresses().treasury,
        &TreasuryCall::Insure {
            to,
            asset: token,
            cost: COST,
            compensation_limit: limit,
            condition: "smart contract failure".to_string(),
        },
    )
    .unwrap()
}

fn compensate_call(dao: &TestDao, policy: u64) -> Call {
    Call::action(dao.addresses().treasury, &TreasuryCall::Compensate { policy }).unwrap()
}

/// Engine whose treasury holds funds and with one paid-up policy.
fn insured_dao() -> TestDao {
    let mut dao = dao();
    let treasury = dao.addresses().treasury;
    fund(&mut dao, treasury, 1_000 * E18);
    fund(&mut dao, beneficiary(), E18);

    let call = insure_call(&dao, beneficiary(), LIMIT);
    pass_and_execute(&mut dao, &[call], "insure beneficiary");
    assert_eq!(dao.minted(), 1);

    dao.token_mut()
        .unwrap()
        .approve(beneficiary(), treasury, COST * Amount::from(UNITS))
        .unwrap();
    let paid = dao.pay_insurance(beneficiary(), 1, UNITS).unwrap();
    assert_eq!(paid, COST * Amount::from(UNITS));
    dao
}

#[test_log::test]
fn test_insurance_end_to_end() {
    let mut dao = insured_dao();
    let treasury = dao.addresses().treasury;
    let before = balance(&dao, &beneficiary());
    assert_eq!(before, E18 - COST * Amount::from(UNITS));
    assert_eq!(dao.policy(1).unwrap().paid, COST * Amount::from(UNITS));

    let requested = 5 * E18;
    dao.request_insurance(beneficiary(), 1, requested, "exploit").unwrap();
    let treasury_before = balance(&dao, &treasury);

    let call = compensate_call(&dao, 1);
    pass_and_execute(&mut dao, &[call.clone()], "compensate policy 1");

    assert_eq!(balance(&dao, &beneficiary()), before + requested);
    assert_eq!(balance(&dao, &treasury), treasury_before - requested);
    let policy = dao.policy(1).unwrap();
    assert_eq!(policy.compensation_limit, 0);
    assert!(policy.claim.is_none());
    assert!(dao.owner_of(1).is_err());
    assert_eq!(dao.treasury().outstanding(), 0);
    assert!(dao.events().events().contains(&GovernanceEvent::Compensated {
        policy: 1,
        beneficiary: beneficiary(),
        amount: requested,
    }));

    // Single use
    let id = pass_and_queue(&mut dao, &[call.clone()], "compensate policy 1 again");
    let err = dao.execute(admin(), &[call], "compensate policy 1 again").unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidState(_)));
    assert_eq!(dao.state(&id).unwrap(), ProposalState::Queued);
    assert_eq!(balance(&dao, &beneficiary()), before + requested);
}

#[test_log::test]
fn test_compensate_is_timelock_only() {
    let mut dao = insured_dao();
    dao.request_insurance(beneficiary(), 1, E18, "exploit").unwrap();
    let call = compensate_call(&dao, 1);

    let err = dao
        .timelock_schedule(beneficiary(), call.clone(), warden_types::Hash::ZERO, 1)
        .unwrap_err();
    assert!(matches!(err, GovernanceError::Unauthorized(_)));

    let id = pass_and_queue(&mut dao, &[call.clone()], "compensate");
    let op = dao.proposal(&id).unwrap().operations[0];
    let err = dao.timelock_execute(beneficiary(), &op).unwrap_err();
    assert!(matches!(err, GovernanceError::Unauthorized(_)));
    assert!(dao.policy(1).unwrap().claim.is_some());

    dao.execute(beneficiary(), &[call], "compensate").unwrap();
    assert_eq!(dao.policy(1).unwrap().compensation_limit, 0);
}

#[test_log::test]
fn test_claim_rules() {
    let mut dao = insured_dao();

    let err = dao.request_insurance(voter("stranger"), 1, E18, "mine").unwrap_err();
    assert!(matches!(err, GovernanceError::Unauthorized(_)));

    let err = dao.request_insurance(beneficiary(), 1, LIMIT + 1, "too much").unwrap_err();
    assert!(matches!(err, GovernanceError::LimitExceeded(_)));

    dao.request_insurance(beneficiary(), 1, E18, "first").unwrap();
    let err = dao.request_insurance(beneficiary(), 1, E18, "second").unwrap_err();
    assert!(matches!(err, GovernanceError::AlreadyDone(_)));

    let err = dao.request_insurance(beneficiary(), 99, E18, "unknown").unwrap_err();
    assert!(matches!(err, GovernanceError::NotFound(_)));
}

#[test_log::test]
fn test_premium_needs_allowance() {
    let mut dao = dao();
    let treasury = dao.addresses().treasury;
    fund(&mut dao, treasury, 100 * E18);
    fund(&mut dao, beneficiary(), E18);
    let call = insure_call(&dao, beneficiary(), LIMIT);
    pass_and_execute(&mut dao, &[call], "insure");

    let err = dao.pay_insurance(beneficiary(), 1, 1).unwrap_err();
    assert!(matches!(err, GovernanceError::InsufficientFunds(_)));
    assert_eq!(dao.policy(1).unwrap().paid, 0);

    let err = dao.pay_insurance(voter("stranger"), 1, 1).unwrap_err();
    assert!(matches!(err, GovernanceError::Unauthorized(_)));

    // No premium yet, so no claim either
    let err = dao.request_insurance(beneficiary(), 1, 1, "early").unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidState(_)));
}

#[test_log::test]
fn test_policy_transfer() {
    let mut dao = insured_dao();
    let heir = voter("heir");
    assert_eq!(dao.policy_balance_of(&beneficiary()), 1);

    let err = dao.transfer_policy(heir, 1, heir).unwrap_err();
    assert!(matches!(err, GovernanceError::Unauthorized(_)));

    dao.transfer_policy(beneficiary(), 1, heir).unwrap();
    assert_eq!(dao.owner_of(1).unwrap(), heir);
    assert_eq!(dao.policy_balance_of(&beneficiary()), 0);
    assert_eq!(dao.policy_balance_of(&heir), 1);

    dao.request_insurance(heir, 1, E18, "heir claim").unwrap();
    let err = dao.transfer_policy(heir, 1, beneficiary()).unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidState(_)));
}

#[test_log::test]
fn test_max_debt_threshold() {
    let mut config = config();
    config.treasury.max_debt_threshold = TokenAmount(LIMIT);
    let mut dao = dao_with(&config);

    let first = insure_call(&dao, beneficiary(), LIMIT);
    pass_and_execute(&mut dao, &[first], "first policy");

    let second = insure_call(&dao, voter("other"), 1);
    pass_and_queue(&mut dao, &[second.clone()], "second policy");
    let err = dao.execute(admin(), &[second], "second policy").unwrap_err();
    assert!(matches!(err, GovernanceError::LimitExceeded(_)));
    assert_eq!(dao.minted(), 1);
}

#[test_log::test]
fn test_treasury_transfer() {
    let mut dao = dao();
    let treasury = dao.addresses().treasury;
    let token = dao.addresses().token;
    fund(&mut dao, treasury, 10 * E18);

    let call = Call::action(
        treasury,
        &TreasuryCall::Transfer {
            to: voter("grantee"),
            asset: token,
            amount: 3 * E18,
        },
    )
    .unwrap();
    pass_and_execute(&mut dao, &[call], "grant");
    assert_eq!(balance(&dao, &voter("grantee")), 3 * E18);
    assert_eq!(balance(&dao, &treasury), 7 * E18);
}

fn rewards_dao(pool: Amount) -> TestDao {
    let mut config = config();
    for role in &mut config.roles {
        if role.name == warden_types::DEVELOPER_ROLE {
            role.members.push(voter("developer-2"));
        }
    }
    let mut dao = dao_with(&config);
    let treasury = dao.addresses().treasury;
    fund(&mut dao, treasury, 1_000 * E18);

    let rewards = dao.addresses().rewards;
    let call = Call::action(
        treasury,
        &TreasuryCall::AllocateRewards {
            rewards,
            amount: pool,
            start_block: 0,
        },
    )
    .unwrap();
    pass_and_execute(&mut dao, &[call], "fund rewards");
    assert_eq!(balance(&dao, &rewards), pool);
    dao
}

/// A developer-context proposal both developers vote for.
fn developer_vote(dao: &mut TestDao) -> warden_types::Hash {
    let id = dao
        .propose(admin(), vec![Call::transfer(voter("a"), 0)], vec![developer_role()], "dev vote")
        .unwrap();
    dao.advance_blocks(1);
    dao.cast_vote(developer(), &id, VoteSupport::For).unwrap();
    dao.cast_vote(voter("developer-2"), &id, VoteSupport::For).unwrap();
    id
}

#[test_log::test]
fn test_rewards_claim_once() {
    let pool = 100 * E18;
    let mut dao = rewards_dao(pool);
    let rewards = dao.addresses().rewards;
    let id = developer_vote(&mut dao);

    let err = dao.claim_voting_reward(developer(), &id).unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidState(_)));

    close_voting(&mut dao, &id);
    let paid = dao.claim_voting_reward(developer(), &id).unwrap();
    assert_eq!(paid, ROLE_POWER * 10);
    assert_eq!(balance(&dao, &developer()), ROLE_POWER * 10);

    let err = dao.claim_voting_reward(developer(), &id).unwrap_err();
    assert!(matches!(err, GovernanceError::AlreadyDone(_)));

    let second = dao.claim_voting_reward(voter("developer-2"), &id).unwrap();
    assert_eq!(balance(&dao, &rewards), pool - paid - second);
    assert_eq!(dao.rewards().remaining(), pool - paid - second);

    let err = dao.claim_voting_reward(voter("absent"), &id).unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidState(_)));
}

#[test_log::test]
fn test_rewards_capped_at_pool() {
    let pool = 15 * E18;
    let mut dao = rewards_dao(pool);
    let id = developer_vote(&mut dao);
    close_voting(&mut dao, &id);

    assert_eq!(dao.claim_voting_reward(developer(), &id).unwrap(), 10 * E18);
    assert_eq!(dao.claim_voting_reward(voter("developer-2"), &id).unwrap(), 5 * E18);
    assert_eq!(dao.rewards().remaining(), 0);
    assert_eq!(balance(&dao, &dao.addresses().rewards), 0);
}

#[test_log::test]
fn test_rewards_keep_the_rate_of_their_grant() {
    let pool = 100 * E18;
    let mut dao = rewards_dao(pool);
    let rewards = dao.addresses().rewards;
    let call = Call::action(rewards, &RewardsCall::SetRewardPerVote { rate: 1 }).unwrap();
    pass_and_execute(&mut dao, &[call], "cheaper votes");
    assert_eq!(dao.rewards().reward_per_vote(), 1);

    let id = developer_vote(&mut dao);
    close_voting(&mut dao, &id);
    assert_eq!(dao.claim_voting_reward(developer(), &id).unwrap(), ROLE_POWER * 10);
}

#[test_log::test]
fn test_canceled_proposal_pays_no_reward() {
    let mut dao = rewards_dao(100 * E18);
    let id = developer_vote(&mut dao);
    dao.cancel(admin(), &id).unwrap();
    close_voting(&mut dao, &id);
    assert_eq!(dao.state(&id).unwrap(), ProposalState::Canceled);

    let err = dao.claim_voting_reward(developer(), &id).unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidState(_)));
    assert_eq!(balance(&dao, &developer()), 0);
    assert!(!dao.rewards().has_claimed(&id, &developer()));
}

#[test_log::test]
fn test_rewards_rejects_other_ledger() {
    let mut dao = dao();
    let treasury = dao.addresses().treasury;
    fund(&mut dao, treasury, E18);
    let call = Call::action(
        treasury,
        &TreasuryCall::AllocateRewards {
            rewards: voter("impostor"),
            amount: E18,
            start_block: 0,
        },
    )
    .unwrap();
    pass_and_queue(&mut dao, &[call.clone()], "misdirected");
    let err = dao.execute(admin(), &[call], "misdirected").unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidArgument(_)));
    assert_eq!(balance(&dao, &treasury), E18);
}
