use crate::error::TypesError;
use std::fmt;
use std::str::FromStr;

/// Name of the genesis treasury role.
pub const TREASURY_ROLE: &str = "TREASURY_ROLE";
/// Name of the genesis developer role.
pub const DEVELOPER_ROLE: &str = "DEVELOPER_ROLE";
/// Name of the genesis legal role.
pub const LEGAL_ROLE: &str = "LEGAL_ROLE";

/// Role identifier: the blake3 digest of the role's name.
///
/// `RoleId::EMPTY` is the base context. Votes counted in the base context
/// use a voter's base power rather than any role power.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "borsh", derive(borsh::BorshSerialize, borsh::BorshDeserialize))]
pub struct RoleId([u8; 32]);

impl RoleId {
    pub const EMPTY: Self = Self([0u8; 32]);

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive the id of a named role.
    pub fn from_name(name: &str) -> Self {
        Self(*blake3::hash(name.as_bytes()).as_bytes())
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::EMPTY
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "RoleId(base)")
        } else {
            write!(f, "RoleId(0x{})", hex::encode(&self.0[..4]))
        }
    }
}

impl FromStr for RoleId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(TypesError::InvalidHashLength(bytes.len()));
        }
        let arr: [u8; 32] = bytes.as_slice().try_into()?;
        Ok(Self(arr))
    }
}

impl From<&str> for RoleId {
    fn from(name: &str) -> Self {
        Self::from_name(name)
    }
}
