//! Warden Types - Core type definitions for the Warden governance engine.
//!
//! This crate provides the fundamental types shared by every Warden crate:
//! - Addresses (20-byte, Bech32m encoded)
//! - Hashes (32-byte, blake3 digests)
//! - Role identifiers (content-addressed capability tags)
//! - Token amounts

pub mod address;
pub mod hash;
pub mod role;
pub mod error;

#[cfg(feature = "serde")]
mod serialization;

pub use address::Address;
pub use hash::Hash;
pub use role::{RoleId, DEVELOPER_ROLE, LEGAL_ROLE, TREASURY_ROLE};
pub use error::TypesError;

/// Token amount. All arithmetic on amounts is checked.
pub type Amount = u128;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{Address, Amount, Hash, RoleId, TypesError};
}
