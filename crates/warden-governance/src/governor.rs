//! Proposal lifecycle.
//!
//! The governor owns the role registry and the proposals. It resolves vote
//! weights through the oracle, and its only way to make anything happen is
//! to schedule calls in the timelock.

use borsh::{BorshDeserialize, BorshSerialize};
use std::collections::{BTreeMap, BTreeSet};
use warden_storage::{Column, Database, WriteBatch};
use warden_types::{Address, Amount, Hash, RoleId};

use crate::call::{Call, GovernorCall};
use crate::chain::Chain;
use crate::error::GovernanceError;
use crate::events::GovernanceEvent;
use crate::power::{VotingOracle, VotingPowerResolver};
use crate::proposal::{Proposal, ProposalState, VoteSupport};
use crate::roles::RoleRegistry;
use crate::timelock::{Capability, Operation, Timelock};

const PARAMS_KEY: &[u8] = b"governor";
const PROPOSAL_ORDER_KEY: &[u8] = b"proposal_order";

/// Voting parameters.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct GovernorParams {
    /// Blocks between creation and the start of voting
    pub voting_delay: u64,
    /// Blocks voting stays open
    pub voting_period: u64,
    /// Base power a proposer needs
    pub proposal_threshold: Amount,
    /// Quorum for the base context and for roles without their own
    pub default_quorum: Amount,
    pub role_quorums: BTreeMap<RoleId, Amount>,
    /// May cancel any Pending or Active proposal
    pub guardian: Option<Address>,
}

impl Default for GovernorParams {
    fn default() -> Self {
        Self {
            voting_delay: 1,
            voting_period: 5,
            proposal_threshold: 0,
            default_quorum: 0,
            role_quorums: BTreeMap::new(),
            guardian: None,
        }
    }
}

/// Result of queueing a proposal.
#[derive(Debug, Clone)]
pub struct Queued {
    pub id: Hash,
    pub eta: u64,
    pub operations: Vec<Operation>,
}

/// The proposal lifecycle state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Governor {
    /// Account the governor acts as towards the timelock
    pub address: Address,
    params: GovernorParams,
    roles: RoleRegistry,
    proposals: BTreeMap<Hash, Proposal>,
    order: Vec<Hash>,
}

impl Governor {
    pub fn new(address: Address, params: GovernorParams, roles: RoleRegistry) -> Self {
        Self {
            address,
            params,
            roles,
            proposals: BTreeMap::new(),
            order: Vec::new(),
        }
    }

    pub fn params(&self) -> &GovernorParams {
        &self.params
    }

    pub fn roles(&self) -> &RoleRegistry {
        &self.roles
    }

    pub fn proposal(&self, id: &Hash) -> Option<&Proposal> {
        self.proposals.get(id)
    }

    /// Proposals in creation order.
    pub fn proposals(&self) -> impl Iterator<Item = &Proposal> {
        self.order.iter().filter_map(|id| self.proposals.get(id))
    }

    /// Proposal whose queued batch contains timelock operation `op`.
    pub fn proposal_of_operation(&self, op: &Hash) -> Option<Hash> {
        self.proposals
            .values()
            .find(|p| p.operations.contains(op))
            .map(|p| p.id)
    }

    fn get(&self, id: &Hash) -> Result<&Proposal, GovernanceError> {
        self.proposals
            .get(id)
            .ok_or_else(|| GovernanceError::NotFound(format!("proposal {}", id)))
    }

    fn get_mut(&mut self, id: &Hash) -> Result<&mut Proposal, GovernanceError> {
        self.proposals
            .get_mut(id)
            .ok_or_else(|| GovernanceError::NotFound(format!("proposal {}", id)))
    }

    /// Quorum for a proposal spanning `contexts`: the strictest one applies.
    pub fn quorum_for<'a>(&self, contexts: impl IntoIterator<Item = &'a RoleId>) -> Amount {
        contexts
            .into_iter()
            .map(|ctx| {
                if ctx.is_empty() {
                    self.params.default_quorum
                } else {
                    self.params
                        .role_quorums
                        .get(ctx)
                        .copied()
                        .unwrap_or(self.params.default_quorum)
                }
            })
            .max()
            .unwrap_or(self.params.default_quorum)
    }

    /// Salt shared by every timelock operation of a proposal.
    pub fn salt(&self, description_hash: &Hash) -> Hash {
        Hash::compute_multi(&[self.address.as_bytes(), description_hash.as_bytes()])
    }

    /// Create a proposal.
    ///
    /// `contexts` holds one role context per call, or is empty to vote every
    /// call in the base context.
    pub fn propose<O: VotingOracle + ?Sized>(
        &mut self,
        oracle: &O,
        proposer: Address,
        calls: Vec<Call>,
        contexts: Vec<RoleId>,
        description: &str,
        block: u64,
    ) -> Result<Hash, GovernanceError> {
        if calls.is_empty() {
            return Err(GovernanceError::InvalidArgument("empty proposal".to_string()));
        }
        let contexts = if contexts.is_empty() {
            vec![RoleId::EMPTY; calls.len()]
        } else if contexts.len() != calls.len() {
            return Err(GovernanceError::InvalidArgument(format!(
                "{} calls but {} role contexts",
                calls.len(),
                contexts.len()
            )));
        } else {
            contexts
        };
        if let Some(unknown) = contexts.iter().find(|c| !c.is_empty() && !self.roles.is_registered(c)) {
            return Err(GovernanceError::NotFound(format!("role {}", unknown)));
        }

        let power = oracle.base_power(&proposer);
        if power < self.params.proposal_threshold {
            return Err(GovernanceError::Unauthorized(format!(
                "proposer votes {} below threshold {}",
                power, self.params.proposal_threshold
            )));
        }

        let description_hash = Proposal::description_hash(description);
        let id = Proposal::hash(&calls, &description_hash)?;
        if self.proposals.contains_key(&id) {
            return Err(GovernanceError::AlreadyDone(format!("proposal {} exists", id)));
        }

        let vote_start = block
            .checked_add(self.params.voting_delay)
            .ok_or(GovernanceError::Overflow("vote start"))?;
        let vote_end = vote_start
            .checked_add(self.params.voting_period)
            .ok_or(GovernanceError::Overflow("vote end"))?;
        let quorum = self.quorum_for(&contexts);

        let proposal = Proposal {
            id,
            proposer,
            calls,
            contexts,
            description_hash,
            created_block: block,
            vote_start,
            vote_end,
            quorum,
            for_votes: 0,
            against_votes: 0,
            abstain_votes: 0,
            receipts: BTreeMap::new(),
            canceled: false,
            eta: None,
            operations: Vec::new(),
        };

        tracing::info!(id = %id.short(), proposer = %proposer, vote_start, vote_end, quorum, "Proposal created");
        self.proposals.insert(id, proposal);
        self.order.push(id);
        Ok(id)
    }

    /// Current state of a proposal.
    pub fn state(&self, id: &Hash, timelock: &Timelock, chain: &Chain) -> Result<ProposalState, GovernanceError> {
        let p = self.get(id)?;
        if p.canceled {
            return Ok(ProposalState::Canceled);
        }

        let voting = p.voting_state(chain.number);
        if voting != ProposalState::Succeeded {
            return Ok(voting);
        }
        let Some(eta) = p.eta else {
            return Ok(ProposalState::Succeeded);
        };

        if p.operations.iter().all(|op| timelock.is_done(op)) {
            Ok(ProposalState::Executed)
        } else if p.operations.iter().any(|op| !timelock.is_scheduled(op)) {
            Ok(ProposalState::Canceled)
        } else if chain.timestamp > eta.saturating_add(timelock.grace_period()) {
            Ok(ProposalState::Expired)
        } else {
            Ok(ProposalState::Queued)
        }
    }

    /// Cast a vote and return the weight recorded.
    pub fn cast_vote<O: VotingOracle + ?Sized>(
        &mut self,
        oracle: &O,
        timelock: &Timelock,
        chain: &Chain,
        voter: Address,
        id: &Hash,
        support: VoteSupport,
    ) -> Result<Amount, GovernanceError> {
        match self.state(id, timelock, chain)? {
            ProposalState::Active => {}
            ProposalState::Pending => {
                return Err(GovernanceError::InvalidState(format!("voting on {} has not started", id)))
            }
            other => {
                return Err(GovernanceError::InvalidState(format!("proposal {} is {:?}", id, other)))
            }
        }

        let weight = {
            let p = self.get(id)?;
            VotingPowerResolver::new(oracle, &self.roles).weight_for(&voter, &p.contexts)?
        };
        self.get_mut(id)?.record_vote(voter, support, weight)?;

        tracing::debug!(id = %id.short(), voter = %voter, ?support, weight, "Vote cast");
        Ok(weight)
    }

    /// Cancel a proposal that is still Pending or Active.
    pub fn cancel(
        &mut self,
        caller: &Address,
        id: &Hash,
        timelock: &Timelock,
        chain: &Chain,
    ) -> Result<(), GovernanceError> {
        let proposer = self.get(id)?.proposer;
        if *caller != proposer && Some(*caller) != self.params.guardian {
            return Err(GovernanceError::Unauthorized(format!("{} cannot cancel {}", caller, id)));
        }
        match self.state(id, timelock, chain)? {
            ProposalState::Pending | ProposalState::Active => {}
            other => {
                return Err(GovernanceError::InvalidState(format!("proposal {} is {:?}", id, other)))
            }
        }

        self.get_mut(id)?.canceled = true;
        tracing::info!(id = %id.short(), by = %caller, "Proposal canceled");
        Ok(())
    }

    /// Schedule every call of a succeeded proposal in the timelock.
    ///
    /// All ids are checked before anything is scheduled, so a collision
    /// leaves the timelock untouched.
    pub fn queue(
        &mut self,
        timelock: &mut Timelock,
        chain: &Chain,
        calls: &[Call],
        description_hash: &Hash,
    ) -> Result<Queued, GovernanceError> {
        let id = Proposal::hash(calls, description_hash)?;
        match self.state(&id, timelock, chain)? {
            ProposalState::Succeeded => {}
            other => {
                return Err(GovernanceError::InvalidState(format!("proposal {} is {:?}", id, other)))
            }
        }
        if !timelock.has_capability(Capability::Proposer, &self.address) {
            return Err(GovernanceError::Unauthorized("governor is not a timelock proposer".to_string()));
        }

        let salt = self.salt(description_hash);
        let mut seen = BTreeSet::new();
        for call in calls {
            let op_id = Timelock::hash_operation(call, &salt)?;
            if !seen.insert(op_id) || timelock.is_scheduled(&op_id) {
                return Err(GovernanceError::AlreadyDone(format!("operation {} is scheduled", op_id)));
            }
        }

        let delay = timelock.min_delay();
        let mut operations = Vec::with_capacity(calls.len());
        for call in calls {
            operations.push(timelock.schedule(&self.address, call.clone(), salt, delay, chain.timestamp)?);
        }
        let eta = chain
            .timestamp
            .checked_add(delay)
            .ok_or(GovernanceError::Overflow("proposal eta"))?;

        let p = self.get_mut(&id)?;
        p.eta = Some(eta);
        p.operations = operations.iter().map(|op| op.id).collect();

        tracing::info!(id = %id.short(), eta, operations = operations.len(), "Proposal queued");
        Ok(Queued { id, eta, operations })
    }

    /// Proposal id and its timelock operations, if it may execute now.
    pub fn executable(
        &self,
        timelock: &Timelock,
        chain: &Chain,
        calls: &[Call],
        description_hash: &Hash,
    ) -> Result<(Hash, Vec<Hash>), GovernanceError> {
        let id = Proposal::hash(calls, description_hash)?;
        match self.state(&id, timelock, chain)? {
            ProposalState::Queued => Ok((id, self.get(&id)?.operations.clone())),
            other => Err(GovernanceError::InvalidState(format!("proposal {} is {:?}", id, other))),
        }
    }

    /// Apply a privileged governor action.
    pub fn apply(&mut self, action: GovernorCall) -> Result<GovernanceEvent, GovernanceError> {
        match action {
            GovernorCall::RegisterRole { role, name } => {
                self.roles.register_with_id(role, &name)?;
                Ok(GovernanceEvent::RoleRegistered { role, name })
            }
            GovernorCall::GrantRole { role, account } => {
                self.roles.grant(&role, account)?;
                Ok(GovernanceEvent::RoleGranted { role, account })
            }
            GovernorCall::RevokeRole { role, account } => {
                self.roles.revoke(&role, &account)?;
                Ok(GovernanceEvent::RoleRevoked { role, account })
            }
            GovernorCall::SetRoleWeight { role, weight_bps } => {
                let old = self.roles.set_weight(&role, weight_bps)?;
                Ok(GovernanceEvent::ParameterChanged {
                    name: format!("role_weight:{}", role),
                    old: Amount::from(old),
                    new: Amount::from(weight_bps),
                })
            }
            GovernorCall::SetQuorum { role, quorum } => {
                if role.is_empty() {
                    let old = std::mem::replace(&mut self.params.default_quorum, quorum);
                    return Ok(GovernanceEvent::ParameterChanged {
                        name: "quorum".to_string(),
                        old,
                        new: quorum,
                    });
                }
                if !self.roles.is_registered(&role) {
                    return Err(GovernanceError::NotFound(format!("role {}", role)));
                }
                let old = self
                    .params
                    .role_quorums
                    .insert(role, quorum)
                    .unwrap_or(self.params.default_quorum);
                Ok(GovernanceEvent::ParameterChanged {
                    name: format!("quorum:{}", role),
                    old,
                    new: quorum,
                })
            }
            GovernorCall::SetVotingDelay { blocks } => {
                let old = std::mem::replace(&mut self.params.voting_delay, blocks);
                Ok(GovernanceEvent::ParameterChanged {
                    name: "voting_delay".to_string(),
                    old: Amount::from(old),
                    new: Amount::from(blocks),
                })
            }
            GovernorCall::SetVotingPeriod { blocks } => {
                if blocks == 0 {
                    return Err(GovernanceError::InvalidArgument("voting period must be positive".to_string()));
                }
                let old = std::mem::replace(&mut self.params.voting_period, blocks);
                Ok(GovernanceEvent::ParameterChanged {
                    name: "voting_period".to_string(),
                    old: Amount::from(old),
                    new: Amount::from(blocks),
                })
            }
            GovernorCall::SetProposalThreshold { amount } => {
                let old = std::mem::replace(&mut self.params.proposal_threshold, amount);
                Ok(GovernanceEvent::ParameterChanged {
                    name: "proposal_threshold".to_string(),
                    old,
                    new: amount,
                })
            }
        }
    }

    pub fn save(&self, batch: &mut WriteBatch) -> Result<(), GovernanceError> {
        batch.put_borsh(Column::Meta, PARAMS_KEY, &self.params)?;
        self.roles.save(batch)?;
        batch.clear(Column::Proposals);
        for (id, proposal) in &self.proposals {
            batch.put_borsh(Column::Proposals, id.as_bytes(), proposal)?;
        }
        batch.put_borsh(Column::Meta, PROPOSAL_ORDER_KEY, &self.order)?;
        Ok(())
    }

    pub fn load(db: &Database, address: Address) -> Result<Self, GovernanceError> {
        let params: GovernorParams = db
            .get_borsh(Column::Meta, PARAMS_KEY)?
            .ok_or_else(|| GovernanceError::Storage("missing governor params".to_string()))?;
        let roles = RoleRegistry::load(db)?;
        let order: Vec<Hash> = db.get_borsh(Column::Meta, PROPOSAL_ORDER_KEY)?.unwrap_or_default();
        let mut proposals = BTreeMap::new();
        for id in &order {
            let proposal: Proposal = db
                .get_borsh(Column::Proposals, id.as_bytes())?
                .ok_or_else(|| GovernanceError::Storage(format!("missing proposal {}", id)))?;
            proposals.insert(*id, proposal);
        }
        Ok(Self {
            address,
            params,
            roles,
            proposals,
            order,
        })
    }
}
