//! Proposal records and vote tallies.
//!
//! Proposals go through states:
//! Pending -> Active -> Succeeded/Defeated -> Queued -> Executed/Expired,
//! with Canceled reachable from Pending and Active. The voting half of the
//! state is computed here; the queue half depends on the timelock and is
//! resolved by the governor.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use warden_types::{Address, Amount, Hash, RoleId};

use crate::call::Call;
use crate::error::GovernanceError;

/// Proposal status in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalState {
    /// Created, voting not started
    Pending,
    /// Voting is open
    Active,
    /// Cancelled by the proposer, the guardian or the timelock
    Canceled,
    /// Voting ended without majority or quorum
    Defeated,
    /// Voting ended with majority and quorum
    Succeeded,
    /// Scheduled in the timelock
    Queued,
    /// Not executed within the grace period
    Expired,
    /// Executed
    Executed,
}

impl ProposalState {
    /// States a proposal can never leave.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalState::Canceled
                | ProposalState::Defeated
                | ProposalState::Expired
                | ProposalState::Executed
        )
    }

    /// Check if voting is still possible.
    pub fn can_vote(&self) -> bool {
        matches!(self, ProposalState::Active)
    }
}

/// Vote support options.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum VoteSupport {
    Against = 0,
    For = 1,
    /// Counts toward nothing but the record
    Abstain = 2,
}

impl TryFrom<u8> for VoteSupport {
    type Error = GovernanceError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(VoteSupport::Against),
            1 => Ok(VoteSupport::For),
            2 => Ok(VoteSupport::Abstain),
            other => Err(GovernanceError::InvalidArgument(format!("invalid vote type {}", other))),
        }
    }
}

/// A cast vote. The weight is frozen when the vote is cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Receipt {
    pub support: VoteSupport,
    pub weight: Amount,
}

/// On-chain proposal.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Proposal {
    pub id: Hash,
    pub proposer: Address,
    pub calls: Vec<Call>,
    /// Role context per call; `RoleId::EMPTY` is the base context
    pub contexts: Vec<RoleId>,
    pub description_hash: Hash,
    pub created_block: u64,
    /// First block votes are accepted
    pub vote_start: u64,
    /// Last block votes are accepted
    pub vote_end: u64,
    /// Quorum frozen at creation
    pub quorum: Amount,
    pub for_votes: Amount,
    pub against_votes: Amount,
    pub abstain_votes: Amount,
    pub receipts: BTreeMap<Address, Receipt>,
    pub canceled: bool,
    /// Timestamp the timelock operations become ready, once queued
    pub eta: Option<u64>,
    /// Timelock operation ids, once queued
    pub operations: Vec<Hash>,
}

impl Proposal {
    /// Content-derived proposal id.
    pub fn hash(calls: &[Call], description_hash: &Hash) -> Result<Hash, GovernanceError> {
        let targets: Vec<Address> = calls.iter().map(|c| c.target).collect();
        let values: Vec<Amount> = calls.iter().map(|c| c.value).collect();
        let calldatas: Vec<Vec<u8>> = calls.iter().map(|c| c.data.clone()).collect();
        Ok(Hash::of(&(targets, values, calldatas, *description_hash))?)
    }

    pub fn description_hash(description: &str) -> Hash {
        Hash::compute(description.as_bytes())
    }

    pub fn distinct_contexts(&self) -> BTreeSet<RoleId> {
        self.contexts.iter().copied().collect()
    }

    /// State from the vote window and tallies alone.
    pub fn voting_state(&self, block: u64) -> ProposalState {
        if block < self.vote_start {
            ProposalState::Pending
        } else if block <= self.vote_end {
            ProposalState::Active
        } else if self.vote_succeeded() && self.quorum_reached() {
            ProposalState::Succeeded
        } else {
            ProposalState::Defeated
        }
    }

    pub fn quorum_reached(&self) -> bool {
        self.for_votes >= self.quorum
    }

    pub fn vote_succeeded(&self) -> bool {
        self.for_votes > self.against_votes
    }

    pub fn has_voted(&self, voter: &Address) -> bool {
        self.receipts.contains_key(voter)
    }

    pub fn receipt(&self, voter: &Address) -> Option<&Receipt> {
        self.receipts.get(voter)
    }

    /// Record a vote. The tally is left untouched on any error.
    pub fn record_vote(
        &mut self,
        voter: Address,
        support: VoteSupport,
        weight: Amount,
    ) -> Result<(), GovernanceError> {
        if self.has_voted(&voter) {
            return Err(GovernanceError::AlreadyDone(format!("{} already voted on {}", voter, self.id)));
        }

        let tally = match support {
            VoteSupport::For => &mut self.for_votes,
            VoteSupport::Against => &mut self.against_votes,
            VoteSupport::Abstain => &mut self.abstain_votes,
        };
        *tally = tally
            .checked_add(weight)
            .ok_or(GovernanceError::Overflow("vote tally"))?;

        self.receipts.insert(voter, Receipt { support, weight });
        Ok(())
    }
}
