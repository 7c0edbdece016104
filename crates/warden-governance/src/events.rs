//! Governance event log.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use warden_types::{Address, Amount, Hash, RoleId};

use crate::proposal::VoteSupport;
use crate::timelock::Capability;

/// Every state change the engine commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernanceEvent {
    ProposalCreated {
        id: Hash,
        proposer: Address,
        calls: u32,
        vote_start: u64,
        vote_end: u64,
        description: String,
    },
    ProposalCanceled {
        id: Hash,
    },
    ProposalQueued {
        id: Hash,
        eta: u64,
    },
    ProposalExecuted {
        id: Hash,
    },
    VoteCast {
        voter: Address,
        id: Hash,
        support: VoteSupport,
        weight: Amount,
        reason: String,
    },
    CallScheduled {
        id: Hash,
        target: Address,
        value: Amount,
        ready_at: u64,
    },
    CallExecuted {
        id: Hash,
        target: Address,
        value: Amount,
    },
    CallCancelled {
        id: Hash,
    },
    MinDelayChanged {
        old: u64,
        new: u64,
    },
    CapabilityGranted {
        capability: Capability,
        account: Address,
    },
    CapabilityRevoked {
        capability: Capability,
        account: Address,
    },
    RoleRegistered {
        role: RoleId,
        name: String,
    },
    RoleGranted {
        role: RoleId,
        account: Address,
    },
    RoleRevoked {
        role: RoleId,
        account: Address,
    },
    ParameterChanged {
        name: String,
        old: Amount,
        new: Amount,
    },
    PolicyIssued {
        policy: u64,
        owner: Address,
        asset: Address,
        cost: Amount,
        compensation_limit: Amount,
    },
    PolicyTransferred {
        policy: u64,
        from: Address,
        to: Address,
    },
    PremiumPaid {
        policy: u64,
        payer: Address,
        amount: Amount,
    },
    ClaimRequested {
        policy: u64,
        amount: Amount,
        case: String,
    },
    Compensated {
        policy: u64,
        beneficiary: Address,
        amount: Amount,
    },
    TreasuryTransfer {
        asset: Address,
        to: Address,
        amount: Amount,
    },
    RewardsAllocated {
        amount: Amount,
        start_block: u64,
    },
    RewardClaimed {
        id: Hash,
        account: Address,
        amount: Amount,
    },
}

/// Append-only list of committed events.
#[derive(Debug, Clone, Default, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct EventLog {
    events: Vec<GovernanceEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: GovernanceEvent) {
        self.events.push(event);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = GovernanceEvent>) {
        self.events.extend(events);
    }

    pub fn events(&self) -> &[GovernanceEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events appended at or after position `index`.
    pub fn since(&self, index: usize) -> &[GovernanceEvent] {
        self.events.get(index..).unwrap_or(&[])
    }

    /// The log as JSON lines, one event per line.
    pub fn to_json_lines(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for event in &self.events {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        Ok(out)
    }
}
