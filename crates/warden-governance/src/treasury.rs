//! Treasury custody and insurance policies.
//!
//! The treasury holds funds at its own address in each asset ledger.
//! Outbound transfers, new policies and compensation are only reachable
//! through the timelock; beneficiaries pay premiums and file claims
//! themselves.
//!
//! A policy is an exclusive slot: it has exactly one owner, can be moved
//! while no claim is pending, and is burned when compensated.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use warden_storage::{Column, Database, WriteBatch};
use warden_types::{Address, Amount};

use crate::error::GovernanceError;
use crate::token::TokenLedger;

const SETTINGS_KEY: &[u8] = b"treasury";

/// A pending insurance claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Claim {
    pub amount: Amount,
    pub case: String,
}

/// Insurance policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Policy {
    /// Policy id (starts at 1, never reused)
    pub id: u64,
    /// Current holder of the slot
    pub owner: Address,
    /// Asset premiums are paid in and compensation is paid out in
    pub asset: Address,
    /// Premium per unit
    pub cost: Amount,
    /// Maximum compensation; zero once compensated
    pub compensation_limit: Amount,
    pub condition: String,
    /// Premiums paid so far
    pub paid: Amount,
    /// Timestamp of the last premium payment
    pub last_paid_at: u64,
    pub claim: Option<Claim>,
    /// Set once compensated
    pub burned: bool,
}

impl Policy {
    pub fn is_live(&self) -> bool {
        !self.burned
    }
}

/// Treasury parameters and counters.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
struct TreasurySettings {
    max_debt_threshold: Amount,
    minted: u64,
    outstanding: Amount,
}

/// Insurance ledger and fund custody.
#[derive(Debug, Clone, PartialEq)]
pub struct Treasury {
    /// Account holding treasury funds
    pub address: Address,
    settings: TreasurySettings,
    policies: BTreeMap<u64, Policy>,
}

impl Treasury {
    pub fn new(address: Address, max_debt_threshold: Amount) -> Self {
        Self {
            address,
            settings: TreasurySettings {
                max_debt_threshold,
                minted: 0,
                outstanding: 0,
            },
            policies: BTreeMap::new(),
        }
    }

    pub fn max_debt_threshold(&self) -> Amount {
        self.settings.max_debt_threshold
    }

    /// Sum of compensation limits of live policies.
    pub fn outstanding(&self) -> Amount {
        self.settings.outstanding
    }

    /// Last policy id issued (0 if none).
    pub fn minted(&self) -> u64 {
        self.settings.minted
    }

    pub fn policy(&self, id: u64) -> Option<&Policy> {
        self.policies.get(&id)
    }

    pub fn owner_of(&self, id: u64) -> Result<Address, GovernanceError> {
        match self.policies.get(&id) {
            Some(p) if p.is_live() => Ok(p.owner),
            _ => Err(GovernanceError::NotFound(format!("policy {}", id))),
        }
    }

    /// Number of live policies held by `account`.
    pub fn balance_of(&self, account: &Address) -> u64 {
        self.policies
            .values()
            .filter(|p| p.is_live() && p.owner == *account)
            .count() as u64
    }

    fn live_policy(&self, id: u64) -> Result<&Policy, GovernanceError> {
        match self.policies.get(&id) {
            None => Err(GovernanceError::NotFound(format!("policy {}", id))),
            Some(p) if !p.is_live() => Err(GovernanceError::InvalidState(format!("policy {} is burned", id))),
            Some(p) => Ok(p),
        }
    }

    fn policy_mut(&mut self, id: u64) -> Result<&mut Policy, GovernanceError> {
        self.policies
            .get_mut(&id)
            .ok_or_else(|| GovernanceError::NotFound(format!("policy {}", id)))
    }

    /// Move treasury funds.
    pub fn transfer<T: TokenLedger + ?Sized>(
        &self,
        ledger: &mut T,
        to: Address,
        amount: Amount,
    ) -> Result<(), GovernanceError> {
        ledger.transfer(self.address, to, amount)?;
        tracing::debug!(to = %to, amount, "Treasury transfer");
        Ok(())
    }

    /// Issue a new policy and return its id.
    pub fn insure(
        &mut self,
        to: Address,
        asset: Address,
        cost: Amount,
        compensation_limit: Amount,
        condition: String,
    ) -> Result<u64, GovernanceError> {
        if to.is_zero() {
            return Err(GovernanceError::InvalidArgument("policy owner is the zero address".to_string()));
        }
        if cost == 0 || compensation_limit == 0 {
            return Err(GovernanceError::InvalidArgument("cost and compensation limit must be positive".to_string()));
        }
        let outstanding = self
            .settings
            .outstanding
            .checked_add(compensation_limit)
            .ok_or(GovernanceError::Overflow("treasury debt"))?;
        if outstanding > self.settings.max_debt_threshold {
            return Err(GovernanceError::LimitExceeded(format!(
                "outstanding cover {} would exceed max debt {}",
                outstanding, self.settings.max_debt_threshold
            )));
        }
        let id = self
            .settings
            .minted
            .checked_add(1)
            .ok_or(GovernanceError::Overflow("policy id"))?;

        self.settings.minted = id;
        self.settings.outstanding = outstanding;
        self.policies.insert(
            id,
            Policy {
                id,
                owner: to,
                asset,
                cost,
                compensation_limit,
                condition,
                paid: 0,
                last_paid_at: 0,
                claim: None,
                burned: false,
            },
        );
        tracing::info!(policy = id, owner = %to, cost, compensation_limit, "Policy issued");
        Ok(id)
    }

    /// Premium owed for `units`, after checking `caller` may pay it.
    pub fn premium_due(&self, caller: &Address, id: u64, units: u64) -> Result<Amount, GovernanceError> {
        let policy = self.live_policy(id)?;
        if policy.owner != *caller {
            return Err(GovernanceError::Unauthorized(format!("{} does not own policy {}", caller, id)));
        }
        if units == 0 {
            return Err(GovernanceError::InvalidArgument("premium units must be positive".to_string()));
        }
        policy
            .cost
            .checked_mul(Amount::from(units))
            .ok_or(GovernanceError::Overflow("premium"))
    }

    /// Pull the premium for `units` from the owner and record it.
    pub fn pay_insurance<T: TokenLedger + ?Sized>(
        &mut self,
        ledger: &mut T,
        caller: Address,
        id: u64,
        units: u64,
        now: u64,
    ) -> Result<Amount, GovernanceError> {
        let amount = self.premium_due(&caller, id, units)?;
        let paid = self
            .live_policy(id)?
            .paid
            .checked_add(amount)
            .ok_or(GovernanceError::Overflow("premium total"))?;

        ledger.transfer_from(self.address, caller, self.address, amount)?;

        let policy = self.policy_mut(id)?;
        policy.paid = paid;
        policy.last_paid_at = now;
        tracing::debug!(policy = id, payer = %caller, amount, "Premium paid");
        Ok(amount)
    }

    /// File the single pending claim of a policy.
    pub fn request_insurance(
        &mut self,
        caller: &Address,
        id: u64,
        amount: Amount,
        case: String,
    ) -> Result<(), GovernanceError> {
        let policy = self.live_policy(id)?;
        if policy.owner != *caller {
            return Err(GovernanceError::Unauthorized(format!("{} does not own policy {}", caller, id)));
        }
        if policy.paid == 0 {
            return Err(GovernanceError::InvalidState(format!("no premium paid on policy {}", id)));
        }
        if policy.claim.is_some() {
            return Err(GovernanceError::AlreadyDone(format!("policy {} has a pending claim", id)));
        }
        if amount == 0 {
            return Err(GovernanceError::InvalidArgument("claim amount must be positive".to_string()));
        }
        if amount > policy.compensation_limit {
            return Err(GovernanceError::LimitExceeded(format!(
                "claim {} above limit {}",
                amount, policy.compensation_limit
            )));
        }

        self.policy_mut(id)?.claim = Some(Claim { amount, case });
        tracing::info!(policy = id, amount, "Insurance claim requested");
        Ok(())
    }

    /// Pay the pending claim of a policy and burn it.
    ///
    /// Returns the beneficiary and the amount paid.
    pub fn compensate<T: TokenLedger + ?Sized>(
        &mut self,
        ledger: &mut T,
        id: u64,
    ) -> Result<(Address, Amount), GovernanceError> {
        let policy = self.live_policy(id)?;
        let claim = policy
            .claim
            .as_ref()
            .ok_or_else(|| GovernanceError::InvalidState(format!("policy {} has no pending claim", id)))?;
        let amount = claim.amount.min(policy.compensation_limit);
        let limit = policy.compensation_limit;
        let owner = policy.owner;

        ledger.transfer(self.address, owner, amount)?;

        self.settings.outstanding = self.settings.outstanding.saturating_sub(limit);
        let policy = self.policy_mut(id)?;
        policy.compensation_limit = 0;
        policy.claim = None;
        policy.burned = true;
        tracing::info!(policy = id, beneficiary = %owner, amount, "Policy compensated");
        Ok((owner, amount))
    }

    /// Hand a policy to another account.
    pub fn transfer_policy(&mut self, caller: &Address, id: u64, to: Address) -> Result<(), GovernanceError> {
        let policy = self.live_policy(id)?;
        if policy.owner != *caller {
            return Err(GovernanceError::Unauthorized(format!("{} does not own policy {}", caller, id)));
        }
        if to.is_zero() {
            return Err(GovernanceError::InvalidArgument("cannot transfer a policy to the zero address".to_string()));
        }
        if policy.claim.is_some() {
            return Err(GovernanceError::InvalidState(format!("policy {} has a pending claim", id)));
        }
        self.policy_mut(id)?.owner = to;
        Ok(())
    }

    pub fn set_max_debt_threshold(&mut self, amount: Amount) -> Amount {
        std::mem::replace(&mut self.settings.max_debt_threshold, amount)
    }

    pub fn save(&self, batch: &mut WriteBatch) -> Result<(), GovernanceError> {
        batch.put_borsh(Column::Meta, SETTINGS_KEY, &self.settings)?;
        batch.clear(Column::Policies);
        for (id, policy) in &self.policies {
            batch.put_borsh(Column::Policies, &id.to_be_bytes(), policy)?;
        }
        Ok(())
    }

    pub fn load(db: &Database, address: Address) -> Result<Self, GovernanceError> {
        let settings: TreasurySettings = db
            .get_borsh(Column::Meta, SETTINGS_KEY)?
            .ok_or_else(|| GovernanceError::Storage("missing treasury settings".to_string()))?;
        let mut policies = BTreeMap::new();
        for (_, bytes) in db.entries(Column::Policies)? {
            let policy = Policy::try_from_slice(&bytes)
                .map_err(|e| GovernanceError::Storage(e.to_string()))?;
            policies.insert(policy.id, policy);
        }
        Ok(Self {
            address,
            settings,
            policies,
        })
    }
}
