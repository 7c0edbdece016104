//! Role registry.
//!
//! Roles are append-only: once registered a role keeps its position in the
//! role list forever. Membership and voting weight are mutable, but only
//! through governance actions.

use borsh::{BorshDeserialize, BorshSerialize};
use std::collections::{BTreeMap, BTreeSet};
use warden_storage::{Column, Database, WriteBatch};
use warden_types::{Address, RoleId};

use crate::error::GovernanceError;

/// Role weight that leaves the oracle's role power unscaled.
pub const FULL_WEIGHT_BPS: u32 = 10_000;

const ROLE_ORDER_KEY: &[u8] = b"role_order";

/// A registered role.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RoleEntry {
    /// Human-readable name the id was derived from
    pub name: String,
    /// Multiplier applied to role power (basis points)
    pub weight_bps: u32,
    /// Accounts holding the role
    pub members: BTreeSet<Address>,
}

/// Registry of roles and their members.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoleRegistry {
    order: Vec<RoleId>,
    entries: BTreeMap<RoleId, RoleEntry>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a role by name and return its id.
    pub fn register(&mut self, name: &str) -> Result<RoleId, GovernanceError> {
        let role = RoleId::from_name(name);
        self.register_with_id(role, name)?;
        Ok(role)
    }

    /// Register a role whose id the caller already computed.
    ///
    /// The id must be the digest of `name`; the base context can never be
    /// registered.
    pub fn register_with_id(&mut self, role: RoleId, name: &str) -> Result<(), GovernanceError> {
        if name.is_empty() || role.is_empty() {
            return Err(GovernanceError::InvalidArgument("role name is empty".to_string()));
        }
        if RoleId::from_name(name) != role {
            return Err(GovernanceError::InvalidArgument(format!(
                "role id {} does not match name {}",
                role, name
            )));
        }
        if self.entries.contains_key(&role) {
            return Err(GovernanceError::AlreadyDone(format!("role {} is registered", name)));
        }

        self.order.push(role);
        self.entries.insert(
            role,
            RoleEntry {
                name: name.to_string(),
                weight_bps: FULL_WEIGHT_BPS,
                members: BTreeSet::new(),
            },
        );
        tracing::debug!(role = %name, index = self.order.len() - 1, "Registered role");
        Ok(())
    }

    /// Grant `role` to `account`. Returns `false` if it was already held.
    pub fn grant(&mut self, role: &RoleId, account: Address) -> Result<bool, GovernanceError> {
        if account.is_zero() {
            return Err(GovernanceError::InvalidArgument("cannot grant a role to the zero address".to_string()));
        }
        let entry = self.entry_mut(role)?;
        Ok(entry.members.insert(account))
    }

    /// Revoke `role` from `account`. Returns `false` if it was not held.
    pub fn revoke(&mut self, role: &RoleId, account: &Address) -> Result<bool, GovernanceError> {
        let entry = self.entry_mut(role)?;
        Ok(entry.members.remove(account))
    }

    /// Set the weight of a role; returns the previous weight.
    pub fn set_weight(&mut self, role: &RoleId, weight_bps: u32) -> Result<u32, GovernanceError> {
        let entry = self.entry_mut(role)?;
        Ok(std::mem::replace(&mut entry.weight_bps, weight_bps))
    }

    pub fn has_role(&self, role: &RoleId, account: &Address) -> bool {
        self.entries
            .get(role)
            .map(|e| e.members.contains(account))
            .unwrap_or(false)
    }

    pub fn is_registered(&self, role: &RoleId) -> bool {
        self.entries.contains_key(role)
    }

    /// Role at position `index` of the registration order.
    pub fn role_at(&self, index: usize) -> Option<RoleId> {
        self.order.get(index).copied()
    }

    pub fn roles(&self) -> &[RoleId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn entry(&self, role: &RoleId) -> Option<&RoleEntry> {
        self.entries.get(role)
    }

    pub fn weight(&self, role: &RoleId) -> u32 {
        self.entries.get(role).map(|e| e.weight_bps).unwrap_or(0)
    }

    fn entry_mut(&mut self, role: &RoleId) -> Result<&mut RoleEntry, GovernanceError> {
        self.entries
            .get_mut(role)
            .ok_or_else(|| GovernanceError::NotFound(format!("role {}", role)))
    }

    pub fn save(&self, batch: &mut WriteBatch) -> Result<(), GovernanceError> {
        batch.clear(Column::Roles);
        for (role, entry) in &self.entries {
            batch.put_borsh(Column::Roles, role.as_bytes(), entry)?;
        }
        batch.put_borsh(Column::Meta, ROLE_ORDER_KEY, &self.order)?;
        Ok(())
    }

    pub fn load(db: &Database) -> Result<Self, GovernanceError> {
        let order: Vec<RoleId> = db.get_borsh(Column::Meta, ROLE_ORDER_KEY)?.unwrap_or_default();
        let mut entries = BTreeMap::new();
        for role in &order {
            let entry: RoleEntry = db
                .get_borsh(Column::Roles, role.as_bytes())?
                .ok_or_else(|| GovernanceError::Storage(format!("missing entry for role {}", role)))?;
            entries.insert(*role, entry);
        }
        Ok(Self { order, entries })
    }
}
