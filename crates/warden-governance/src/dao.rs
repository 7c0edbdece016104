//! The composed governance engine.
//!
//! [`Dao`] wires the governor, timelock, treasury and rewards ledger to one
//! clock, one voting oracle and a set of asset ledgers. Every entry point is
//! staged on a copy of the state and committed only if it succeeds, so a
//! failing batch leaves nothing behind.

use borsh::{BorshDeserialize, BorshSerialize};
use std::collections::BTreeMap;
use warden_storage::{Column, Database, WriteBatch};
use warden_types::{Address, Amount, Hash, RoleId};

use crate::call::{Call, TreasuryCall};
use crate::chain::Chain;
use crate::config::{AddressConfig, GovernanceConfig};
use crate::error::GovernanceError;
use crate::events::{EventLog, GovernanceEvent};
use crate::governor::{Governor, GovernorParams};
use crate::power::{VotingOracle, VotingPowerResolver};
use crate::proposal::{Proposal, ProposalState, Receipt, VoteSupport};
use crate::reentrancy::ReentrancyGuard;
use crate::rewards::Rewards;
use crate::roles::RoleRegistry;
use crate::timelock::{Capability, Timelock};
use crate::token::TokenLedger;
use crate::treasury::{Policy, Treasury};

const CHAIN_KEY: &[u8] = b"chain";
const ADDRESSES_KEY: &[u8] = b"addresses";
const EVENTS_KEY: &[u8] = b"events";

/// Accounts the engine's components live at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SystemAddresses {
    pub governor: Address,
    pub timelock: Address,
    pub treasury: Address,
    pub rewards: Address,
    /// Governance token: plain value calls and rewards move it
    pub token: Address,
}

impl SystemAddresses {
    pub fn is_component(&self, target: &Address) -> bool {
        [self.governor, self.timelock, self.treasury, self.rewards].contains(target)
    }
}

impl From<&AddressConfig> for SystemAddresses {
    fn from(config: &AddressConfig) -> Self {
        Self {
            governor: config.governor,
            timelock: config.timelock,
            treasury: config.treasury,
            rewards: config.rewards,
            token: config.token,
        }
    }
}

/// Everything an entry point may touch.
#[derive(Debug, Clone)]
struct DaoState<T> {
    chain: Chain,
    addresses: SystemAddresses,
    governor: Governor,
    timelock: Timelock,
    treasury: Treasury,
    rewards: Rewards,
    assets: BTreeMap<Address, T>,
    events: EventLog,
    guard: ReentrancyGuard,
}

fn ledger_mut<'a, T>(assets: &'a mut BTreeMap<Address, T>, asset: &Address) -> Result<&'a mut T, GovernanceError> {
    assets
        .get_mut(asset)
        .ok_or_else(|| GovernanceError::NotFound(format!("asset {}", asset)))
}

impl<T: TokenLedger> DaoState<T> {
    /// Run timelock operation `id` on behalf of `executor`.
    fn run_operation(&mut self, executor: &Address, id: &Hash) -> Result<(), GovernanceError> {
        let call = self.timelock.ready_call(executor, id, self.chain.timestamp)?;
        let events = self.dispatch(self.addresses.timelock, &call)?;
        self.timelock.mark_done(id)?;

        tracing::debug!(op = %id.short(), target = %call.target, value = call.value, "Executed call");
        self.events.extend(events);
        self.events.push(GovernanceEvent::CallExecuted {
            id: *id,
            target: call.target,
            value: call.value,
        });
        Ok(())
    }

    /// Apply one call as `caller`.
    fn dispatch(&mut self, caller: Address, call: &Call) -> Result<Vec<GovernanceEvent>, GovernanceError> {
        let a = self.addresses;
        if !a.is_component(&call.target) {
            if !call.data.is_empty() {
                return Err(GovernanceError::InvalidArgument(format!(
                    "{} is not a governance component and takes no call data",
                    call.target
                )));
            }
            if call.value > 0 {
                ledger_mut(&mut self.assets, &a.token)?.transfer(caller, call.target, call.value)?;
            }
            return Ok(Vec::new());
        }

        if caller != a.timelock {
            return Err(GovernanceError::Unauthorized(format!("{} cannot call {}", caller, call.target)));
        }
        if call.value != 0 {
            return Err(GovernanceError::InvalidArgument(format!("{} does not accept value", call.target)));
        }

        if call.target == a.governor {
            Ok(vec![self.governor.apply(call.decode()?)?])
        } else if call.target == a.timelock {
            Ok(vec![self.timelock.apply(call.decode()?)?])
        } else if call.target == a.treasury {
            self.apply_treasury(call.decode()?)
        } else {
            Ok(vec![self.rewards.apply(call.decode()?)?])
        }
    }

    fn apply_treasury(&mut self, action: TreasuryCall) -> Result<Vec<GovernanceEvent>, GovernanceError> {
        match action {
            TreasuryCall::Transfer { to, asset, amount } => {
                let ledger = ledger_mut(&mut self.assets, &asset)?;
                self.treasury.transfer(ledger, to, amount)?;
                Ok(vec![GovernanceEvent::TreasuryTransfer { asset, to, amount }])
            }
            TreasuryCall::Insure {
                to,
                asset,
                cost,
                compensation_limit,
                condition,
            } => {
                if !self.assets.contains_key(&asset) {
                    return Err(GovernanceError::NotFound(format!("asset {}", asset)));
                }
                let policy = self.treasury.insure(to, asset, cost, compensation_limit, condition)?;
                Ok(vec![GovernanceEvent::PolicyIssued {
                    policy,
                    owner: to,
                    asset,
                    cost,
                    compensation_limit,
                }])
            }
            TreasuryCall::Compensate { policy } => {
                self.guard.enter(self.treasury.address, self.addresses.timelock)?;
                let paid = self.compensate(policy);
                self.guard.exit()?;
                let (beneficiary, amount) = paid?;
                Ok(vec![GovernanceEvent::Compensated {
                    policy,
                    beneficiary,
                    amount,
                }])
            }
            TreasuryCall::AllocateRewards {
                rewards,
                amount,
                start_block,
            } => {
                if rewards != self.rewards.address {
                    return Err(GovernanceError::InvalidArgument(format!(
                        "{} is not the rewards ledger",
                        rewards
                    )));
                }
                let token = self.addresses.token;
                let ledger = ledger_mut(&mut self.assets, &token)?;
                self.treasury.transfer(ledger, rewards, amount)?;
                self.rewards.allocate(amount, start_block)?;
                Ok(vec![
                    GovernanceEvent::TreasuryTransfer {
                        asset: token,
                        to: rewards,
                        amount,
                    },
                    GovernanceEvent::RewardsAllocated { amount, start_block },
                ])
            }
            TreasuryCall::SetMaxDebtThreshold { amount } => {
                let old = self.treasury.set_max_debt_threshold(amount);
                Ok(vec![GovernanceEvent::ParameterChanged {
                    name: "max_debt_threshold".to_string(),
                    old,
                    new: amount,
                }])
            }
        }
    }

    fn compensate(&mut self, policy: u64) -> Result<(Address, Amount), GovernanceError> {
        let asset = self.policy_asset(policy)?;
        let ledger = ledger_mut(&mut self.assets, &asset)?;
        self.treasury.compensate(ledger, policy)
    }

    fn policy_asset(&self, policy: u64) -> Result<Address, GovernanceError> {
        self.treasury
            .policy(policy)
            .map(|p| p.asset)
            .ok_or_else(|| GovernanceError::NotFound(format!("policy {}", policy)))
    }
}

/// Governance engine over a voting oracle `O` and asset ledgers of type `T`.
#[derive(Debug)]
pub struct Dao<O, T> {
    oracle: O,
    state: DaoState<T>,
}

impl<O: VotingOracle, T: TokenLedger + Clone> Dao<O, T> {
    /// Build the engine at genesis. `token` is the governance token ledger.
    pub fn new(config: &GovernanceConfig, oracle: O, token: T) -> Result<Self, GovernanceError> {
        config
            .validate()
            .map_err(|e| GovernanceError::InvalidArgument(e.to_string()))?;
        let addresses = SystemAddresses::from(&config.addresses);

        let mut roles = RoleRegistry::new();
        let mut role_quorums = BTreeMap::new();
        for role_config in &config.roles {
            let role = roles.register(&role_config.name)?;
            roles.set_weight(&role, role_config.weight_bps)?;
            for member in &role_config.members {
                roles.grant(&role, *member)?;
            }
            if let Some(quorum) = role_config.quorum {
                role_quorums.insert(role, quorum.0);
            }
        }

        let params = GovernorParams {
            voting_delay: config.governor.voting_delay,
            voting_period: config.governor.voting_period,
            proposal_threshold: config.governor.proposal_threshold.0,
            default_quorum: config.governor.default_quorum.0,
            role_quorums,
            guardian: config.governor.guardian,
        };
        let governor = Governor::new(addresses.governor, params, roles);

        let tl = &config.timelock;
        let mut timelock = Timelock::new(addresses.timelock, tl.min_delay, tl.grace_period);
        for capability in [Capability::Proposer, Capability::Executor, Capability::Canceller] {
            timelock.grant_capability(capability, addresses.governor);
        }
        for account in &tl.proposers {
            timelock.grant_capability(Capability::Proposer, *account);
        }
        for account in &tl.executors {
            timelock.grant_capability(Capability::Executor, *account);
        }
        for account in tl.cancellers.iter().chain(config.governor.guardian.as_ref()) {
            timelock.grant_capability(Capability::Canceller, *account);
        }
        if tl.open_executor {
            timelock.grant_capability(Capability::Executor, Address::ZERO);
        }

        let mut assets = BTreeMap::new();
        assets.insert(addresses.token, token);

        tracing::info!(
            governor = %addresses.governor,
            timelock = %addresses.timelock,
            roles = governor.roles().len(),
            "Governance engine initialized"
        );

        Ok(Self {
            oracle,
            state: DaoState {
                chain: Chain::new(
                    config.chain.genesis_block,
                    config.chain.genesis_timestamp,
                    config.chain.block_time,
                ),
                addresses,
                governor,
                timelock,
                treasury: Treasury::new(addresses.treasury, config.treasury.max_debt_threshold.0),
                rewards: Rewards::new(addresses.rewards, config.rewards.reward_per_vote.0),
                assets,
                events: EventLog::new(),
                guard: ReentrancyGuard::new(),
            },
        })
    }

    /// Stage `f` on a copy of the state and commit it only on success.
    fn commit<R>(
        &mut self,
        f: impl FnOnce(&O, &mut DaoState<T>) -> Result<R, GovernanceError>,
    ) -> Result<R, GovernanceError> {
        let mut staged = self.state.clone();
        let out = f(&self.oracle, &mut staged)?;
        self.state = staged;
        Ok(out)
    }

    // Clock

    pub fn chain(&self) -> &Chain {
        &self.state.chain
    }

    pub fn block_number(&self) -> u64 {
        self.state.chain.number
    }

    pub fn timestamp(&self) -> u64 {
        self.state.chain.timestamp
    }

    pub fn advance_blocks(&mut self, blocks: u64) {
        self.state.chain.advance_blocks(blocks);
    }

    pub fn advance_time(&mut self, seconds: u64) {
        self.state.chain.advance_time(seconds);
    }

    // Components and collaborators

    pub fn addresses(&self) -> &SystemAddresses {
        &self.state.addresses
    }

    pub fn governor(&self) -> &Governor {
        &self.state.governor
    }

    pub fn timelock(&self) -> &Timelock {
        &self.state.timelock
    }

    pub fn treasury(&self) -> &Treasury {
        &self.state.treasury
    }

    pub fn rewards(&self) -> &Rewards {
        &self.state.rewards
    }

    pub fn events(&self) -> &EventLog {
        &self.state.events
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// The oracle is read live: changes apply to every later resolution.
    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    pub fn token(&self) -> Option<&T> {
        self.state.assets.get(&self.state.addresses.token)
    }

    pub fn token_mut(&mut self) -> Option<&mut T> {
        let token = self.state.addresses.token;
        self.state.assets.get_mut(&token)
    }

    pub fn asset(&self, asset: &Address) -> Option<&T> {
        self.state.assets.get(asset)
    }

    /// Direct access for holders acting on the ledger outside governance.
    pub fn asset_mut(&mut self, asset: &Address) -> Option<&mut T> {
        self.state.assets.get_mut(asset)
    }

    /// Register another asset ledger the treasury may hold and insure.
    pub fn add_asset(&mut self, asset: Address, ledger: T) -> Result<(), GovernanceError> {
        if self.state.assets.contains_key(&asset) {
            return Err(GovernanceError::AlreadyDone(format!("asset {} is registered", asset)));
        }
        self.state.assets.insert(asset, ledger);
        Ok(())
    }

    // Roles and voting power

    pub fn roles_list(&self, index: usize) -> Option<RoleId> {
        self.state.governor.roles().role_at(index)
    }

    pub fn has_role(&self, role: &RoleId, account: &Address) -> bool {
        self.state.governor.roles().has_role(role, account)
    }

    /// Base voting power of `account`.
    pub fn get_votes(&self, account: &Address) -> Amount {
        self.oracle.base_power(account)
    }

    /// Voting power of `account` in the context of `role`.
    pub fn get_votes_for_role(&self, account: &Address, role: &RoleId) -> Result<Amount, GovernanceError> {
        VotingPowerResolver::new(&self.oracle, self.state.governor.roles()).power_of(account, role)
    }

    // Proposal lifecycle

    pub fn hash_proposal(&self, calls: &[Call], description: &str) -> Result<Hash, GovernanceError> {
        Proposal::hash(calls, &Proposal::description_hash(description))
    }

    pub fn proposal(&self, id: &Hash) -> Option<&Proposal> {
        self.state.governor.proposal(id)
    }

    pub fn state(&self, id: &Hash) -> Result<ProposalState, GovernanceError> {
        let s = &self.state;
        s.governor.state(id, &s.timelock, &s.chain)
    }

    pub fn get_receipt(&self, id: &Hash, account: &Address) -> Option<Receipt> {
        self.proposal(id).and_then(|p| p.receipt(account).copied())
    }

    /// Create a proposal. `contexts` is empty or holds one role per call.
    pub fn propose(
        &mut self,
        proposer: Address,
        calls: Vec<Call>,
        contexts: Vec<RoleId>,
        description: &str,
    ) -> Result<Hash, GovernanceError> {
        let count = u32::try_from(calls.len()).map_err(|_| GovernanceError::Overflow("call count"))?;
        self.commit(|oracle, s| {
            let id = s
                .governor
                .propose(oracle, proposer, calls, contexts, description, s.chain.number)?;
            let (vote_start, vote_end) = s
                .governor
                .proposal(&id)
                .map(|p| (p.vote_start, p.vote_end))
                .ok_or_else(|| GovernanceError::NotFound(format!("proposal {}", id)))?;
            s.events.push(GovernanceEvent::ProposalCreated {
                id,
                proposer,
                calls: count,
                vote_start,
                vote_end,
                description: description.to_string(),
            });
            Ok(id)
        })
    }

    pub fn cast_vote(&mut self, voter: Address, id: &Hash, support: VoteSupport) -> Result<Amount, GovernanceError> {
        self.cast_vote_with_reason(voter, id, support, "")
    }

    pub fn cast_vote_with_reason(
        &mut self,
        voter: Address,
        id: &Hash,
        support: VoteSupport,
        reason: &str,
    ) -> Result<Amount, GovernanceError> {
        self.commit(|oracle, s| {
            let weight = s
                .governor
                .cast_vote(oracle, &s.timelock, &s.chain, voter, id, support)?;
            s.events.push(GovernanceEvent::VoteCast {
                voter,
                id: *id,
                support,
                weight,
                reason: reason.to_string(),
            });
            Ok(weight)
        })
    }

    /// Cancel a Pending or Active proposal (proposer or guardian).
    pub fn cancel(&mut self, caller: Address, id: &Hash) -> Result<(), GovernanceError> {
        self.commit(|_, s| {
            s.governor.cancel(&caller, id, &s.timelock, &s.chain)?;
            s.events.push(GovernanceEvent::ProposalCanceled { id: *id });
            Ok(())
        })
    }

    /// Schedule a succeeded proposal in the timelock.
    pub fn queue(&mut self, calls: &[Call], description: &str) -> Result<Hash, GovernanceError> {
        let description_hash = Proposal::description_hash(description);
        self.commit(|_, s| {
            let queued = s.governor.queue(&mut s.timelock, &s.chain, calls, &description_hash)?;
            for op in &queued.operations {
                s.events.push(GovernanceEvent::CallScheduled {
                    id: op.id,
                    target: op.call.target,
                    value: op.call.value,
                    ready_at: op.ready_at,
                });
            }
            s.events.push(GovernanceEvent::ProposalQueued {
                id: queued.id,
                eta: queued.eta,
            });
            Ok(queued.id)
        })
    }

    /// Execute every call of a queued proposal, all or nothing.
    ///
    /// A failed batch leaves the proposal Queued; it may be retried until
    /// it expires.
    pub fn execute(&mut self, caller: Address, calls: &[Call], description: &str) -> Result<Hash, GovernanceError> {
        let description_hash = Proposal::description_hash(description);
        let result = self.commit(|_, s| {
            let (id, operations) = s.governor.executable(&s.timelock, &s.chain, calls, &description_hash)?;
            s.guard.enter(s.addresses.timelock, caller)?;
            let executor = s.governor.address;
            let ran = operations.iter().try_for_each(|op| s.run_operation(&executor, op));
            s.guard.exit()?;
            ran?;
            s.events.push(GovernanceEvent::ProposalExecuted { id });
            Ok(id)
        });

        match &result {
            Ok(id) => tracing::info!(id = %id.short(), by = %caller, "Proposal executed"),
            Err(e) => tracing::warn!(by = %caller, error = %e, "Proposal execution rejected"),
        }
        result
    }

    // Timelock entry points for capability holders

    /// Schedule a call directly; returns the operation id.
    pub fn timelock_schedule(
        &mut self,
        caller: Address,
        call: Call,
        salt: Hash,
        delay: u64,
    ) -> Result<Hash, GovernanceError> {
        self.commit(|_, s| {
            let op = s.timelock.schedule(&caller, call, salt, delay, s.chain.timestamp)?;
            s.events.push(GovernanceEvent::CallScheduled {
                id: op.id,
                target: op.call.target,
                value: op.call.value,
                ready_at: op.ready_at,
            });
            Ok(op.id)
        })
    }

    pub fn timelock_execute(&mut self, caller: Address, id: &Hash) -> Result<(), GovernanceError> {
        let result = self.commit(|_, s| {
            if let Some(proposal) = s.governor.proposal_of_operation(id) {
                return Err(GovernanceError::InvalidState(format!(
                    "operation {} belongs to proposal {}, execute the proposal",
                    id, proposal
                )));
            }
            s.guard.enter(s.addresses.timelock, caller)?;
            let ran = s.run_operation(&caller, id);
            s.guard.exit()?;
            ran
        });
        if let Err(e) = &result {
            tracing::warn!(op = %id.short(), by = %caller, error = %e, "Timelock execution rejected");
        }
        result
    }

    pub fn timelock_cancel(&mut self, caller: Address, id: &Hash) -> Result<(), GovernanceError> {
        self.commit(|_, s| {
            s.timelock.cancel(&caller, id)?;
            tracing::info!(op = %id.short(), by = %caller, "Timelock operation cancelled");
            s.events.push(GovernanceEvent::CallCancelled { id: *id });
            Ok(())
        })
    }

    // Insurance

    pub fn policy(&self, id: u64) -> Option<&Policy> {
        self.state.treasury.policy(id)
    }

    pub fn owner_of(&self, id: u64) -> Result<Address, GovernanceError> {
        self.state.treasury.owner_of(id)
    }

    /// Live policies held by `account`.
    pub fn policy_balance_of(&self, account: &Address) -> u64 {
        self.state.treasury.balance_of(account)
    }

    /// Id of the last policy issued.
    pub fn minted(&self) -> u64 {
        self.state.treasury.minted()
    }

    /// Pay `units` premiums on a policy. The owner must have approved the
    /// treasury on the policy's asset.
    pub fn pay_insurance(&mut self, caller: Address, policy: u64, units: u64) -> Result<Amount, GovernanceError> {
        self.commit(|_, s| {
            s.guard.enter(s.treasury.address, caller)?;
            let paid = s.policy_asset(policy).and_then(|asset| {
                let ledger = ledger_mut(&mut s.assets, &asset)?;
                s.treasury.pay_insurance(ledger, caller, policy, units, s.chain.timestamp)
            });
            s.guard.exit()?;
            let amount = paid?;
            s.events.push(GovernanceEvent::PremiumPaid {
                policy,
                payer: caller,
                amount,
            });
            Ok(amount)
        })
    }

    pub fn request_insurance(
        &mut self,
        caller: Address,
        policy: u64,
        amount: Amount,
        case: &str,
    ) -> Result<(), GovernanceError> {
        self.commit(|_, s| {
            s.treasury.request_insurance(&caller, policy, amount, case.to_string())?;
            s.events.push(GovernanceEvent::ClaimRequested {
                policy,
                amount,
                case: case.to_string(),
            });
            Ok(())
        })
    }

    pub fn transfer_policy(&mut self, caller: Address, policy: u64, to: Address) -> Result<(), GovernanceError> {
        self.commit(|_, s| {
            s.treasury.transfer_policy(&caller, policy, to)?;
            s.events.push(GovernanceEvent::PolicyTransferred {
                policy,
                from: caller,
                to,
            });
            Ok(())
        })
    }

    // Rewards

    /// Pay `caller` for their vote on a finished proposal.
    pub fn claim_voting_reward(&mut self, caller: Address, id: &Hash) -> Result<Amount, GovernanceError> {
        self.commit(|_, s| {
            match s.governor.state(id, &s.timelock, &s.chain)? {
                ProposalState::Pending | ProposalState::Active => {
                    return Err(GovernanceError::InvalidState(format!("voting on {} is not over", id)))
                }
                ProposalState::Canceled => {
                    return Err(GovernanceError::InvalidState(format!("proposal {} was canceled", id)))
                }
                _ => {}
            }
            let (created_block, weight) = {
                let p = s
                    .governor
                    .proposal(id)
                    .ok_or_else(|| GovernanceError::NotFound(format!("proposal {}", id)))?;
                let receipt = p
                    .receipt(&caller)
                    .ok_or_else(|| GovernanceError::InvalidState(format!("{} did not vote on {}", caller, id)))?;
                (p.created_block, receipt.weight)
            };

            let payout = s.rewards.quote(id, &caller, created_block, weight)?;
            let token = s.addresses.token;
            ledger_mut(&mut s.assets, &token)?.transfer(s.rewards.address, caller, payout.amount)?;
            s.rewards.settle(*id, caller, payout)?;

            tracing::info!(id = %id.short(), account = %caller, amount = payout.amount, "Voting reward claimed");
            s.events.push(GovernanceEvent::RewardClaimed {
                id: *id,
                account: caller,
                amount: payout.amount,
            });
            Ok(payout.amount)
        })
    }

    // Persistence

    /// Write every table in one batch. Asset ledgers are not persisted.
    pub fn save(&self, db: &Database) -> Result<(), GovernanceError> {
        let s = &self.state;
        let mut batch = WriteBatch::new();
        batch.put_borsh(Column::Meta, CHAIN_KEY, &s.chain)?;
        batch.put_borsh(Column::Meta, ADDRESSES_KEY, &s.addresses)?;
        batch.put_borsh(Column::Meta, EVENTS_KEY, &s.events)?;
        s.governor.save(&mut batch)?;
        s.timelock.save(&mut batch)?;
        s.treasury.save(&mut batch)?;
        s.rewards.save(&mut batch)?;

        tracing::debug!(entries = batch.len(), path = %db.path().display(), "Saving governance state");
        db.write(batch)?;
        Ok(())
    }

    /// Restore an engine saved with [`Dao::save`].
    pub fn load(db: &Database, oracle: O, assets: BTreeMap<Address, T>) -> Result<Self, GovernanceError> {
        let chain: Chain = db
            .get_borsh(Column::Meta, CHAIN_KEY)?
            .ok_or_else(|| GovernanceError::Storage("missing chain head".to_string()))?;
        let addresses: SystemAddresses = db
            .get_borsh(Column::Meta, ADDRESSES_KEY)?
            .ok_or_else(|| GovernanceError::Storage("missing system addresses".to_string()))?;
        let events: EventLog = db.get_borsh(Column::Meta, EVENTS_KEY)?.unwrap_or_default();

        if !assets.contains_key(&addresses.token) {
            return Err(GovernanceError::NotFound(format!("governance token ledger {}", addresses.token)));
        }

        let state = DaoState {
            chain,
            addresses,
            governor: Governor::load(db, addresses.governor)?,
            timelock: Timelock::load(db, addresses.timelock)?,
            treasury: Treasury::load(db, addresses.treasury)?,
            rewards: Rewards::load(db, addresses.rewards)?,
            assets,
            events,
            guard: ReentrancyGuard::new(),
        };
        tracing::info!(block = state.chain.number, proposals = state.governor.proposals().count(), "Governance state loaded");
        Ok(Self { oracle, state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{GovernorCall, TimelockCall};
    use crate::power::VotesOracle;
    use crate::token::Erc20Ledger;
    use warden_types::DEVELOPER_ROLE;

    type TestDao = Dao<VotesOracle, Erc20Ledger>;

    fn alice() -> Address {
        Address::from_label("alice")
    }

    fn dao() -> TestDao {
        let config = GovernanceConfig::with_genesis_roles();
        let token = Erc20Ledger::with_initial_supply("Warden", "WRD", config.addresses.timelock, 1_000).unwrap();
        Dao::new(&config, VotesOracle::new(10, 20), token).unwrap()
    }

    fn pass(dao: &mut TestDao, calls: &[Call], description: &str) -> Hash {
        let id = dao.propose(alice(), calls.to_vec(), vec![], description).unwrap();
        dao.advance_blocks(1);
        dao.cast_vote(alice(), &id, VoteSupport::For).unwrap();
        dao.advance_blocks(6);
        assert_eq!(dao.state(&id).unwrap(), ProposalState::Succeeded);
        dao.queue(calls, description).unwrap();
        dao.advance_time(1);
        id
    }

    #[test]
    fn test_genesis_roles() {
        let dao = dao();
        assert_eq!(dao.roles_list(1), Some(RoleId::from_name(DEVELOPER_ROLE)));
        assert_eq!(dao.roles_list(3), None);
        assert!(dao.timelock().has_capability(Capability::Proposer, &dao.addresses().governor));
    }

    #[test]
    fn test_plain_transfer_executes() {
        let mut dao = dao();
        let payee = Address::from_label("payee");
        let calls = vec![Call::transfer(payee, 300)];
        let id = pass(&mut dao, &calls, "pay");

        dao.execute(alice(), &calls, "pay").unwrap();
        assert_eq!(dao.state(&id).unwrap(), ProposalState::Executed);
        assert_eq!(dao.token().unwrap().balance_of(&payee), 300);
        assert!(matches!(
            dao.events().events().last(),
            Some(GovernanceEvent::ProposalExecuted { .. })
        ));
    }

    #[test]
    fn test_failed_batch_is_rolled_back() {
        let mut dao = dao();
        let payee = Address::from_label("payee");
        let calls = vec![Call::transfer(payee, 600), Call::transfer(payee, 500)];
        let id = pass(&mut dao, &calls, "overspend");
        let events = dao.events().len();

        let err = dao.execute(alice(), &calls, "overspend").unwrap_err();
        assert!(matches!(err, GovernanceError::InsufficientFunds(_)));
        assert_eq!(dao.state(&id).unwrap(), ProposalState::Queued);
        assert_eq!(dao.token().unwrap().balance_of(&payee), 0);
        assert_eq!(dao.events().len(), events);
        assert!(dao.timelock().operations().all(|op| !op.executed));
    }

    #[test]
    fn test_component_calls_require_timelock() {
        let mut dao = dao();
        let role = RoleId::from_name(DEVELOPER_ROLE);
        let call = Call::action(
            dao.addresses().governor,
            &GovernorCall::GrantRole { role, account: alice() },
        )
        .unwrap();

        let err = dao.state.dispatch(alice(), &call).unwrap_err();
        assert!(matches!(err, GovernanceError::Unauthorized(_)));

        let timelock = dao.addresses().timelock;
        dao.state.dispatch(timelock, &call).unwrap();
        assert!(dao.has_role(&role, &alice()));
    }

    #[test]
    fn test_component_rejects_value() {
        let mut dao = dao();
        let mut call = Call::action(dao.addresses().timelock, &TimelockCall::UpdateDelay { min_delay: 5 }).unwrap();
        call.value = 1;
        let timelock = dao.addresses().timelock;
        let err = dao.state.dispatch(timelock, &call).unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidArgument(_)));
    }

    #[test]
    fn test_guard_blocks_nested_entry() {
        let mut dao = dao();
        let treasury = dao.addresses().treasury;
        dao.state.guard.enter(treasury, alice()).unwrap();
        let action = TreasuryCall::Compensate { policy: 1 };
        let err = dao.state.apply_treasury(action).unwrap_err();
        assert!(matches!(err, GovernanceError::Reentrancy(_)));
    }

    #[test]
    fn test_timelock_direct_cancel_reads_canceled() {
        let mut dao = dao();
        let calls = vec![Call::transfer(Address::from_label("payee"), 1)];
        let id = pass(&mut dao, &calls, "cancel me");
        let op = dao.proposal(&id).unwrap().operations[0];

        let governor = dao.addresses().governor;
        dao.timelock_cancel(governor, &op).unwrap();
        assert_eq!(dao.state(&id).unwrap(), ProposalState::Canceled);
        assert!(dao.execute(alice(), &calls, "cancel me").is_err());
    }
}
