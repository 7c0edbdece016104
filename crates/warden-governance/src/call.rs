//! Calls and the typed actions they carry.
//!
//! A [`Call`] addressed to a governance component carries the borsh
//! encoding of that component's action enum. A call to any other address
//! is a plain transfer of governance tokens and must carry no data.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use warden_types::{Address, Amount, RoleId};

use crate::error::GovernanceError;
use crate::timelock::Capability;

/// One target call of a proposal or timelock operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Call {
    pub target: Address,
    pub value: Amount,
    pub data: Vec<u8>,
}

impl Call {
    pub fn new(target: Address, value: Amount, data: Vec<u8>) -> Self {
        Self { target, value, data }
    }

    /// Plain token transfer from the timelock account.
    pub fn transfer(target: Address, value: Amount) -> Self {
        Self::new(target, value, Vec::new())
    }

    /// Call carrying an encoded component action.
    pub fn action<A: BorshSerialize>(target: Address, action: &A) -> Result<Self, GovernanceError> {
        let data = borsh::to_vec(action)
            .map_err(|e| GovernanceError::InvalidArgument(format!("cannot encode action: {}", e)))?;
        Ok(Self::new(target, 0, data))
    }

    /// Decode the action carried in `data`.
    pub fn decode<A: BorshDeserialize>(&self) -> Result<A, GovernanceError> {
        A::try_from_slice(&self.data).map_err(|e| {
            GovernanceError::InvalidArgument(format!("malformed call data for {}: {}", self.target, e))
        })
    }
}

/// Privileged governor actions.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum GovernorCall {
    RegisterRole { role: RoleId, name: String },
    GrantRole { role: RoleId, account: Address },
    RevokeRole { role: RoleId, account: Address },
    SetRoleWeight { role: RoleId, weight_bps: u32 },
    /// `RoleId::EMPTY` sets the default quorum
    SetQuorum { role: RoleId, quorum: Amount },
    SetVotingDelay { blocks: u64 },
    SetVotingPeriod { blocks: u64 },
    SetProposalThreshold { amount: Amount },
}

/// Timelock self-administration.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum TimelockCall {
    UpdateDelay { min_delay: u64 },
    GrantCapability { capability: Capability, account: Address },
    RevokeCapability { capability: Capability, account: Address },
}

/// Treasury operations gated behind the timelock.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum TreasuryCall {
    Transfer {
        to: Address,
        asset: Address,
        amount: Amount,
    },
    Insure {
        to: Address,
        asset: Address,
        cost: Amount,
        compensation_limit: Amount,
        condition: String,
    },
    Compensate {
        policy: u64,
    },
    AllocateRewards {
        rewards: Address,
        amount: Amount,
        start_block: u64,
    },
    SetMaxDebtThreshold {
        amount: Amount,
    },
}

/// Rewards module parameters.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum RewardsCall {
    SetRewardPerVote { rate: Amount },
}
