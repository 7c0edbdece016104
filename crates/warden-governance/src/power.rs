//! Voting power resolution.
//!
//! Power is read live from a [`VotingOracle`] every time it is resolved;
//! nothing is snapshotted. A vote's weight is frozen in its receipt at cast
//! time, so later oracle changes only affect votes not yet cast.

use std::collections::{BTreeMap, BTreeSet};
use warden_types::{Address, Amount, RoleId};

use crate::error::GovernanceError;
use crate::roles::{RoleRegistry, FULL_WEIGHT_BPS};

/// Source of raw voting power numbers.
pub trait VotingOracle {
    /// Power an account votes with in the base context.
    fn base_power(&self, account: &Address) -> Amount;

    /// Power an account votes with in the context of `role`.
    fn role_power(&self, account: &Address, role: &RoleId) -> Amount;
}

/// Administratively settable oracle.
///
/// Every account gets the default powers unless an override is set for it.
#[derive(Debug, Clone, Default)]
pub struct VotesOracle {
    default_base: Amount,
    default_role: Amount,
    base: BTreeMap<Address, Amount>,
    roles: BTreeMap<(Address, RoleId), Amount>,
}

impl VotesOracle {
    pub fn new(default_base: Amount, default_role: Amount) -> Self {
        Self {
            default_base,
            default_role,
            ..Default::default()
        }
    }

    pub fn set_default_base_power(&mut self, amount: Amount) {
        self.default_base = amount;
    }

    pub fn set_default_role_power(&mut self, amount: Amount) {
        self.default_role = amount;
    }

    pub fn set_base_power(&mut self, account: Address, amount: Amount) {
        self.base.insert(account, amount);
    }

    pub fn set_role_power(&mut self, account: Address, role: RoleId, amount: Amount) {
        self.roles.insert((account, role), amount);
    }
}

impl VotingOracle for VotesOracle {
    fn base_power(&self, account: &Address) -> Amount {
        self.base.get(account).copied().unwrap_or(self.default_base)
    }

    fn role_power(&self, account: &Address, role: &RoleId) -> Amount {
        self.roles
            .get(&(*account, *role))
            .copied()
            .unwrap_or(self.default_role)
    }
}

/// Combines oracle power with role membership and role weights.
pub struct VotingPowerResolver<'a, O: VotingOracle + ?Sized> {
    oracle: &'a O,
    roles: &'a RoleRegistry,
}

impl<'a, O: VotingOracle + ?Sized> VotingPowerResolver<'a, O> {
    pub fn new(oracle: &'a O, roles: &'a RoleRegistry) -> Self {
        Self { oracle, roles }
    }

    /// Power of `account` in one context.
    ///
    /// The base context yields base power. A role context yields the
    /// weighted role power if the account holds the role, zero otherwise.
    pub fn power_of(&self, account: &Address, context: &RoleId) -> Result<Amount, GovernanceError> {
        if context.is_empty() {
            return Ok(self.oracle.base_power(account));
        }
        if !self.roles.has_role(context, account) {
            return Ok(0);
        }

        let raw = self.oracle.role_power(account, context);
        let weight = self.roles.weight(context);
        if weight == FULL_WEIGHT_BPS {
            return Ok(raw);
        }
        raw.checked_mul(Amount::from(weight))
            .map(|scaled| scaled / Amount::from(FULL_WEIGHT_BPS))
            .ok_or(GovernanceError::Overflow("role power"))
    }

    /// Vote weight of `account` on a proposal with the given per-target contexts.
    ///
    /// Each distinct context is counted once.
    pub fn weight_for(&self, account: &Address, contexts: &[RoleId]) -> Result<Amount, GovernanceError> {
        let distinct: BTreeSet<&RoleId> = contexts.iter().collect();
        distinct.into_iter().try_fold(0 as Amount, |total, context| {
            total
                .checked_add(self.power_of(account, context)?)
                .ok_or(GovernanceError::Overflow("vote weight"))
        })
    }
}
