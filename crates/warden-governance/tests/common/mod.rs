//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use warden_governance::{
    Call, Dao, Erc20Ledger, GovernanceConfig, ProposalState, TokenLedger, VoteSupport, VotesOracle,
};
use warden_types::{Address, Amount, Hash, RoleId, DEVELOPER_ROLE};

pub type TestDao = Dao<VotesOracle, Erc20Ledger>;

pub const E18: Amount = 1_000_000_000_000_000_000;
pub const SUPPLY: Amount = 1_000_000_000 * E18;
pub const BASE_POWER: Amount = 5 * E18;
pub const ROLE_POWER: Amount = E18;

pub fn admin() -> Address {
    Address::from_label("admin")
}

pub fn voter(name: &str) -> Address {
    Address::from_label(name)
}

pub fn developer() -> Address {
    Address::from_label("developer")
}

pub fn config() -> GovernanceConfig {
    let mut config = GovernanceConfig::with_genesis_roles();
    for role in &mut config.roles {
        if role.name == DEVELOPER_ROLE {
            role.members.push(developer());
        }
    }
    config
}

/// Engine with the whole supply minted to the admin.
pub fn dao_with(config: &GovernanceConfig) -> TestDao {
    let token = Erc20Ledger::with_initial_supply("Warden", "WRD", admin(), SUPPLY).unwrap();
    Dao::new(config, VotesOracle::new(BASE_POWER, ROLE_POWER), token).unwrap()
}

pub fn dao() -> TestDao {
    dao_with(&config())
}

pub fn fund(dao: &mut TestDao, to: Address, amount: Amount) {
    dao.token_mut().unwrap().transfer(admin(), to, amount).unwrap();
}

pub fn balance(dao: &TestDao, account: &Address) -> Amount {
    dao.token().unwrap().balance_of(account)
}

pub fn developer_role() -> RoleId {
    RoleId::from_name(DEVELOPER_ROLE)
}

/// Move past the end of the voting window of `id`.
pub fn close_voting(dao: &mut TestDao, id: &Hash) {
    let end = dao.proposal(id).unwrap().vote_end;
    let now = dao.block_number();
    if now <= end {
        dao.advance_blocks(end + 1 - now);
    }
}

/// Propose in the base context, vote it through and queue it.
pub fn pass_and_queue(dao: &mut TestDao, calls: &[Call], description: &str) -> Hash {
    let id = dao.propose(admin(), calls.to_vec(), vec![], description).unwrap();
    dao.advance_blocks(1);
    dao.cast_vote(voter("yes"), &id, VoteSupport::For).unwrap();
    close_voting(dao, &id);
    assert_eq!(dao.state(&id).unwrap(), ProposalState::Succeeded);
    dao.queue(calls, description).unwrap();
    dao.advance_time(dao.timelock().min_delay());
    id
}

/// Full lifecycle ending in execution.
pub fn pass_and_execute(dao: &mut TestDao, calls: &[Call], description: &str) -> Hash {
    let id = pass_and_queue(dao, calls, description);
    dao.execute(admin(), calls, description).unwrap();
    assert_eq!(dao.state(&id).unwrap(), ProposalState::Executed);
    id
}
