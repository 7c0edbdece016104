//! Warden Governance - role-weighted on-chain governance engine.
//!
//! Provides:
//! - Role registry and role-weighted voting power
//! - Proposal lifecycle (propose, vote, queue, execute)
//! - Timelock controller, the only execution path for proposals
//! - Treasury custody and insurance policies
//! - Per-vote rewards ledger
//!
//! [`Dao`] composes the components over a voting oracle and token ledgers.

pub mod call;
pub mod chain;
pub mod config;
pub mod dao;
pub mod error;
pub mod events;
pub mod governor;
pub mod power;
pub mod proposal;
pub mod reentrancy;
pub mod rewards;
pub mod roles;
pub mod telemetry;
pub mod timelock;
pub mod token;
pub mod treasury;

pub use call::{Call, GovernorCall, RewardsCall, TimelockCall, TreasuryCall};
pub use chain::Chain;
pub use config::{GovernanceConfig, TokenAmount};
pub use dao::{Dao, SystemAddresses};
pub use error::GovernanceError;
pub use events::{EventLog, GovernanceEvent};
pub use governor::{Governor, GovernorParams};
pub use power::{VotesOracle, VotingOracle, VotingPowerResolver};
pub use proposal::{Proposal, ProposalState, Receipt, VoteSupport};
pub use rewards::Rewards;
pub use roles::RoleRegistry;
pub use timelock::{Capability, OperationState, Timelock};
pub use token::{Erc20Ledger, TokenError, TokenLedger};
pub use treasury::{Policy, Treasury};
