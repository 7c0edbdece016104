//! Voting rewards.
//!
//! Each funding creates a grant whose eligible range runs from its start
//! block up to the start of the next grant. A voter claims once per
//! proposal, from the grant covering the proposal's creation block, at the
//! rate that grant was allocated with.

use borsh::{BorshDeserialize, BorshSerialize};
use std::collections::BTreeSet;
use warden_storage::{Column, Database, WriteBatch};
use warden_types::{Address, Amount, Hash};

use crate::call::RewardsCall;
use crate::error::GovernanceError;
use crate::events::GovernanceEvent;

const SETTINGS_KEY: &[u8] = b"rewards";
const GRANTS_KEY: &[u8] = b"grants";
const CLAIM_MARKER: &[u8] = &[1];

/// A funded reward pool.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Grant {
    /// First eligible creation block
    pub start_block: u64,
    /// Reward per unit of vote weight, fixed at allocation
    pub rate: Amount,
    pub funded: Amount,
    pub remaining: Amount,
}

/// A payout the caller is entitled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payout {
    pub grant: usize,
    pub amount: Amount,
}

/// Rewards ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewards {
    /// Account holding reward funds
    pub address: Address,
    reward_per_vote: Amount,
    grants: Vec<Grant>,
    claimed: BTreeSet<(Hash, Address)>,
}

impl Rewards {
    pub fn new(address: Address, reward_per_vote: Amount) -> Self {
        Self {
            address,
            reward_per_vote,
            grants: Vec::new(),
            claimed: BTreeSet::new(),
        }
    }

    pub fn reward_per_vote(&self) -> Amount {
        self.reward_per_vote
    }

    pub fn grants(&self) -> &[Grant] {
        &self.grants
    }

    /// Unclaimed funds across all grants.
    pub fn remaining(&self) -> Amount {
        self.grants.iter().map(|g| g.remaining).fold(0, Amount::saturating_add)
    }

    pub fn has_claimed(&self, id: &Hash, account: &Address) -> bool {
        self.claimed.contains(&(*id, *account))
    }

    /// Record a new grant. The funds must already sit at the rewards account.
    pub fn allocate(&mut self, amount: Amount, start_block: u64) -> Result<(), GovernanceError> {
        if amount == 0 {
            return Err(GovernanceError::InvalidArgument("reward allocation must be positive".to_string()));
        }
        if let Some(last) = self.grants.last() {
            if start_block < last.start_block {
                return Err(GovernanceError::InvalidArgument(format!(
                    "grant start {} precedes previous start {}",
                    start_block, last.start_block
                )));
            }
        }
        self.grants.push(Grant {
            start_block,
            rate: self.reward_per_vote,
            funded: amount,
            remaining: amount,
        });
        tracing::info!(amount, start_block, rate = self.reward_per_vote, "Rewards allocated");
        Ok(())
    }

    /// Index of the grant whose range contains `block`.
    pub fn grant_for(&self, block: u64) -> Option<usize> {
        self.grants.iter().rposition(|g| g.start_block <= block)
    }

    /// What `account` may claim for a vote of `weight` on proposal `id`.
    pub fn quote(
        &self,
        id: &Hash,
        account: &Address,
        created_block: u64,
        weight: Amount,
    ) -> Result<Payout, GovernanceError> {
        if self.has_claimed(id, account) {
            return Err(GovernanceError::AlreadyDone(format!("{} already claimed for {}", account, id)));
        }
        let grant = self.grant_for(created_block).ok_or_else(|| {
            GovernanceError::InvalidState(format!("proposal {} predates every reward grant", id))
        })?;
        if weight == 0 {
            return Err(GovernanceError::InvalidState(format!("{} voted on {} with no weight", account, id)));
        }
        let Grant { rate, remaining, .. } = self.grants[grant];
        if remaining == 0 {
            return Err(GovernanceError::LimitExceeded("reward grant exhausted".to_string()));
        }
        let owed = weight
            .checked_mul(rate)
            .ok_or(GovernanceError::Overflow("reward"))?;
        Ok(Payout {
            grant,
            amount: owed.min(remaining),
        })
    }

    /// Mark a quoted payout as paid.
    pub fn settle(&mut self, id: Hash, account: Address, payout: Payout) -> Result<(), GovernanceError> {
        let grant = self
            .grants
            .get_mut(payout.grant)
            .ok_or_else(|| GovernanceError::NotFound(format!("grant {}", payout.grant)))?;
        grant.remaining = grant
            .remaining
            .checked_sub(payout.amount)
            .ok_or(GovernanceError::Overflow("grant balance"))?;
        if !self.claimed.insert((id, account)) {
            return Err(GovernanceError::AlreadyDone(format!("{} already claimed for {}", account, id)));
        }
        Ok(())
    }

    pub fn apply(&mut self, action: RewardsCall) -> Result<GovernanceEvent, GovernanceError> {
        match action {
            RewardsCall::SetRewardPerVote { rate } => {
                let old = std::mem::replace(&mut self.reward_per_vote, rate);
                Ok(GovernanceEvent::ParameterChanged {
                    name: "reward_per_vote".to_string(),
                    old,
                    new: rate,
                })
            }
        }
    }

    pub fn save(&self, batch: &mut WriteBatch) -> Result<(), GovernanceError> {
        batch.put_borsh(Column::Meta, SETTINGS_KEY, &self.reward_per_vote)?;
        batch.clear(Column::Rewards);
        batch.put_borsh(Column::Rewards, GRANTS_KEY, &self.grants)?;
        for (id, account) in &self.claimed {
            let mut key = id.as_bytes().to_vec();
            key.extend_from_slice(account.as_bytes());
            batch.put(Column::Rewards, &key, CLAIM_MARKER);
        }
        Ok(())
    }

    pub fn load(db: &Database, address: Address) -> Result<Self, GovernanceError> {
        let reward_per_vote: Amount = db
            .get_borsh(Column::Meta, SETTINGS_KEY)?
            .ok_or_else(|| GovernanceError::Storage("missing reward rate".to_string()))?;
        let grants: Vec<Grant> = db.get_borsh(Column::Rewards, GRANTS_KEY)?.unwrap_or_default();

        let mut claimed = BTreeSet::new();
        for (key, _) in db.entries(Column::Rewards)? {
            if key.len() != Hash::LEN + Address::LEN {
                continue;
            }
            let id = Hash::from_slice(&key[..Hash::LEN])?;
            let account = Address::from_slice(&key[Hash::LEN..])?;
            claimed.insert((id, account));
        }
        Ok(Self {
            address,
            reward_per_vote,
            grants,
            claimed,
        })
    }
}
