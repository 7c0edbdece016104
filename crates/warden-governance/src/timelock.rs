//! Timelock controller.
//!
//! A generic delayed-execution queue. Operations are keyed by the hash of
//! their call and a salt, become executable once their delay has passed,
//! run at most once, and expire after the grace period. A cancelled id is
//! retired and can never be scheduled again. The timelock knows nothing
//! about proposals.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use warden_storage::{Column, Database, WriteBatch};
use warden_types::{Address, Hash};

use crate::call::{Call, TimelockCall};
use crate::error::GovernanceError;
use crate::events::GovernanceEvent;

const SETTINGS_KEY: &[u8] = b"timelock";
const CANCELLED_KEY: &[u8] = b"timelock_cancelled";

/// Capabilities the timelock checks before acting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub enum Capability {
    /// May schedule and cancel operations
    Proposer,
    /// May execute ready operations (`Address::ZERO` opens execution to anyone)
    Executor,
    /// May cancel operations
    Canceller,
}

/// Lifecycle of a timelock operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    /// Never scheduled, or cancelled
    Unset,
    /// Scheduled, delay not yet elapsed
    Waiting,
    /// Executable now
    Ready,
    /// Grace period elapsed without execution
    Expired,
    /// Executed
    Done,
}

/// A scheduled call.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Operation {
    pub id: Hash,
    pub call: Call,
    pub salt: Hash,
    pub scheduled_at: u64,
    pub ready_at: u64,
    pub executed: bool,
}

/// Delay parameters and capability holders.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TimelockSettings {
    /// Minimum delay between scheduling and execution (seconds)
    pub min_delay: u64,
    /// Window after `ready_at` during which execution is allowed (seconds)
    pub grace_period: u64,
    pub proposers: BTreeSet<Address>,
    pub executors: BTreeSet<Address>,
    pub cancellers: BTreeSet<Address>,
}

/// The delayed-execution queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Timelock {
    /// Account the timelock executes calls as
    pub address: Address,
    settings: TimelockSettings,
    operations: BTreeMap<Hash, Operation>,
    cancelled: BTreeSet<Hash>,
}

impl Timelock {
    pub fn new(address: Address, min_delay: u64, grace_period: u64) -> Self {
        Self {
            address,
            settings: TimelockSettings {
                min_delay,
                grace_period,
                proposers: BTreeSet::new(),
                executors: BTreeSet::new(),
                cancellers: BTreeSet::new(),
            },
            operations: BTreeMap::new(),
            cancelled: BTreeSet::new(),
        }
    }

    /// Id of `call` scheduled with `salt`.
    pub fn hash_operation(call: &Call, salt: &Hash) -> Result<Hash, GovernanceError> {
        let encoded = borsh::to_vec(call)
            .map_err(|e| GovernanceError::InvalidArgument(format!("cannot encode call: {}", e)))?;
        Ok(Hash::compute_multi(&[&encoded, salt.as_bytes()]))
    }

    pub fn min_delay(&self) -> u64 {
        self.settings.min_delay
    }

    pub fn grace_period(&self) -> u64 {
        self.settings.grace_period
    }

    pub fn settings(&self) -> &TimelockSettings {
        &self.settings
    }

    fn holders_mut(&mut self, capability: Capability) -> &mut BTreeSet<Address> {
        match capability {
            Capability::Proposer => &mut self.settings.proposers,
            Capability::Executor => &mut self.settings.executors,
            Capability::Canceller => &mut self.settings.cancellers,
        }
    }

    pub fn has_capability(&self, capability: Capability, account: &Address) -> bool {
        match capability {
            Capability::Proposer => self.settings.proposers.contains(account),
            Capability::Executor => {
                self.settings.executors.contains(&Address::ZERO)
                    || self.settings.executors.contains(account)
            }
            Capability::Canceller => self.settings.cancellers.contains(account),
        }
    }

    /// Grant a capability. Returns `false` if it was already held.
    pub fn grant_capability(&mut self, capability: Capability, account: Address) -> bool {
        self.holders_mut(capability).insert(account)
    }

    /// Revoke a capability. Returns `false` if it was not held.
    pub fn revoke_capability(&mut self, capability: Capability, account: &Address) -> bool {
        self.holders_mut(capability).remove(account)
    }

    pub fn operation(&self, id: &Hash) -> Option<&Operation> {
        self.operations.get(id)
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.values()
    }

    pub fn operation_state(&self, id: &Hash, now: u64) -> OperationState {
        match self.operations.get(id) {
            None => OperationState::Unset,
            Some(op) if op.executed => OperationState::Done,
            Some(op) if now < op.ready_at => OperationState::Waiting,
            Some(op) if now > op.ready_at.saturating_add(self.settings.grace_period) => {
                OperationState::Expired
            }
            Some(_) => OperationState::Ready,
        }
    }

    pub fn is_scheduled(&self, id: &Hash) -> bool {
        self.operations.contains_key(id)
    }

    pub fn is_cancelled(&self, id: &Hash) -> bool {
        self.cancelled.contains(id)
    }

    pub fn is_done(&self, id: &Hash) -> bool {
        self.operations.get(id).map(|op| op.executed).unwrap_or(false)
    }

    /// Schedule `call` to become executable `delay` seconds from `now`.
    pub fn schedule(
        &mut self,
        caller: &Address,
        call: Call,
        salt: Hash,
        delay: u64,
        now: u64,
    ) -> Result<Operation, GovernanceError> {
        if !self.has_capability(Capability::Proposer, caller) {
            return Err(GovernanceError::Unauthorized(format!("{} cannot schedule", caller)));
        }
        if delay < self.settings.min_delay {
            return Err(GovernanceError::InvalidArgument(format!(
                "delay {} below minimum {}",
                delay, self.settings.min_delay
            )));
        }

        let id = Self::hash_operation(&call, &salt)?;
        if self.operations.contains_key(&id) {
            return Err(GovernanceError::AlreadyDone(format!("operation {} is scheduled", id)));
        }
        if self.cancelled.contains(&id) {
            return Err(GovernanceError::InvalidState(format!("operation {} was cancelled", id)));
        }
        let ready_at = now
            .checked_add(delay)
            .ok_or(GovernanceError::Overflow("timelock ready time"))?;

        let op = Operation {
            id,
            call,
            salt,
            scheduled_at: now,
            ready_at,
            executed: false,
        };
        tracing::debug!(op = %id.short(), target = %op.call.target, ready_at, "Scheduled call");
        self.operations.insert(id, op.clone());
        Ok(op)
    }

    /// Check that `caller` may execute `id` now and return the call to run.
    ///
    /// The operation is not marked; [`Timelock::mark_done`] does that once
    /// the call has been applied.
    pub fn ready_call(&self, caller: &Address, id: &Hash, now: u64) -> Result<Call, GovernanceError> {
        if !self.has_capability(Capability::Executor, caller) {
            return Err(GovernanceError::Unauthorized(format!("{} cannot execute", caller)));
        }
        match self.operation_state(id, now) {
            OperationState::Unset => Err(GovernanceError::NotFound(format!("operation {}", id))),
            OperationState::Waiting => Err(GovernanceError::NotReady(format!("operation {} is waiting", id))),
            OperationState::Expired => Err(GovernanceError::InvalidState(format!("operation {} expired", id))),
            OperationState::Done => Err(GovernanceError::InvalidState(format!("operation {} already executed", id))),
            OperationState::Ready => self
                .operations
                .get(id)
                .map(|op| op.call.clone())
                .ok_or_else(|| GovernanceError::NotFound(format!("operation {}", id))),
        }
    }

    pub fn mark_done(&mut self, id: &Hash) -> Result<(), GovernanceError> {
        let op = self
            .operations
            .get_mut(id)
            .ok_or_else(|| GovernanceError::NotFound(format!("operation {}", id)))?;
        if op.executed {
            return Err(GovernanceError::InvalidState(format!("operation {} already executed", id)));
        }
        op.executed = true;
        Ok(())
    }

    /// Remove a pending operation and retire its id.
    pub fn cancel(&mut self, caller: &Address, id: &Hash) -> Result<Operation, GovernanceError> {
        if !self.has_capability(Capability::Canceller, caller)
            && !self.has_capability(Capability::Proposer, caller)
        {
            return Err(GovernanceError::Unauthorized(format!("{} cannot cancel", caller)));
        }
        match self.operations.get(id) {
            None => return Err(GovernanceError::NotFound(format!("operation {}", id))),
            Some(op) if op.executed => {
                return Err(GovernanceError::InvalidState(format!("operation {} already executed", id)))
            }
            Some(_) => {}
        }
        let op = self
            .operations
            .remove(id)
            .ok_or_else(|| GovernanceError::NotFound(format!("operation {}", id)))?;
        self.cancelled.insert(op.id);
        Ok(op)
    }

    /// Apply a self-administration action.
    pub fn apply(&mut self, action: TimelockCall) -> Result<GovernanceEvent, GovernanceError> {
        match action {
            TimelockCall::UpdateDelay { min_delay } => {
                let old = std::mem::replace(&mut self.settings.min_delay, min_delay);
                Ok(GovernanceEvent::MinDelayChanged { old, new: min_delay })
            }
            TimelockCall::GrantCapability { capability, account } => {
                self.grant_capability(capability, account);
                Ok(GovernanceEvent::CapabilityGranted { capability, account })
            }
            TimelockCall::RevokeCapability { capability, account } => {
                self.revoke_capability(capability, &account);
                Ok(GovernanceEvent::CapabilityRevoked { capability, account })
            }
        }
    }

    pub fn save(&self, batch: &mut WriteBatch) -> Result<(), GovernanceError> {
        batch.put_borsh(Column::Meta, SETTINGS_KEY, &self.settings)?;
        batch.put_borsh(Column::Meta, CANCELLED_KEY, &self.cancelled)?;
        batch.clear(Column::Operations);
        for (id, op) in &self.operations {
            batch.put_borsh(Column::Operations, id.as_bytes(), op)?;
        }
        Ok(())
    }

    pub fn load(db: &Database, address: Address) -> Result<Self, GovernanceError> {
        let settings: TimelockSettings = db
            .get_borsh(Column::Meta, SETTINGS_KEY)?
            .ok_or_else(|| GovernanceError::Storage("missing timelock settings".to_string()))?;
        let cancelled: BTreeSet<Hash> = db.get_borsh(Column::Meta, CANCELLED_KEY)?.unwrap_or_default();
        let mut operations = BTreeMap::new();
        for (_, bytes) in db.entries(Column::Operations)? {
            let op = Operation::try_from_slice(&bytes)
                .map_err(|e| GovernanceError::Storage(e.to_string()))?;
            operations.insert(op.id, op);
        }
        Ok(Self {
            address,
            settings,
            operations,
            cancelled,
        })
    }
}
