//! Engine configuration.
//!
//! Handles loading and validation of the governance configuration from
//! TOML files.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use warden_types::{Address, Amount, DEVELOPER_ROLE, LEGAL_ROLE, TREASURY_ROLE};

/// Token amount that survives TOML's 64-bit integers.
///
/// Serialized as a decimal string; integers are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct TokenAmount(pub Amount);

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl<'de> serde::de::Visitor<'de> for AmountVisitor {
            type Value = TokenAmount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a non-negative integer or decimal string")
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(TokenAmount(Amount::from(v)))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Amount::try_from(v)
                    .map(TokenAmount)
                    .map_err(|_| E::custom(format!("negative amount {}", v)))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.replace('_', "")
                    .parse::<Amount>()
                    .map(TokenAmount)
                    .map_err(|e| E::custom(format!("invalid amount '{}': {}", v, e)))
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

impl From<Amount> for TokenAmount {
    fn from(v: Amount) -> Self {
        TokenAmount(v)
    }
}

/// Governance engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GovernanceConfig {
    pub governor: GovernorConfig,
    pub timelock: TimelockConfig,
    pub treasury: TreasuryConfig,
    pub rewards: RewardsConfig,
    pub chain: ChainConfig,
    pub addresses: AddressConfig,
    pub roles: Vec<RoleConfig>,
    pub logging: LoggingConfig,
}

impl GovernanceConfig {
    /// Configuration with the three genesis roles and no members.
    pub fn with_genesis_roles() -> Self {
        Self {
            roles: [TREASURY_ROLE, DEVELOPER_ROLE, LEGAL_ROLE]
                .iter()
                .map(|name| RoleConfig::named(name))
                .collect(),
            ..Default::default()
        }
    }

    /// Load configuration from file.
    /// Path is validated to prevent directory traversal attacks.
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let path_str = path.to_string_lossy();
        if path_str.contains("..") {
            anyhow::bail!("Invalid path: directory traversal detected");
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: GovernanceConfig = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file.
    /// Path is validated to prevent directory traversal attacks.
    pub fn to_file(&self, path: &PathBuf) -> anyhow::Result<()> {
        let path_str = path.to_string_lossy();
        if path_str.contains("..") {
            anyhow::bail!("Invalid path: directory traversal detected");
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .map_err(|e| anyhow::anyhow!("Failed to write config file '{}': {}", path.display(), e))?;
        Ok(())
    }

    /// Validate configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.governor.voting_period == 0 {
            anyhow::bail!("Voting period cannot be 0");
        }
        if self.chain.block_time == 0 {
            anyhow::bail!("Block time cannot be 0");
        }

        let a = &self.addresses;
        let components = [a.governor, a.timelock, a.treasury, a.rewards];
        for (i, addr) in components.iter().enumerate() {
            if addr.is_zero() {
                anyhow::bail!("Component addresses cannot be the zero address");
            }
            if components[i + 1..].contains(addr) || *addr == a.token {
                anyhow::bail!("Component address {} is used twice", addr);
            }
        }

        let mut names = std::collections::BTreeSet::new();
        for role in &self.roles {
            if role.name.is_empty() {
                anyhow::bail!("Role name cannot be empty");
            }
            if !names.insert(role.name.as_str()) {
                anyhow::bail!("Role {} is declared twice", role.name);
            }
        }

        Ok(())
    }
}

/// Voting parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Blocks between proposal creation and vote start
    pub voting_delay: u64,
    /// Blocks voting stays open
    pub voting_period: u64,
    /// Base power needed to propose
    pub proposal_threshold: TokenAmount,
    /// Quorum for the base context
    pub default_quorum: TokenAmount,
    /// Account allowed to cancel Pending/Active proposals
    pub guardian: Option<Address>,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            voting_delay: 1,
            voting_period: 5,
            proposal_threshold: TokenAmount(0),
            default_quorum: TokenAmount(0),
            guardian: None,
        }
    }
}

/// Timelock parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelockConfig {
    /// Minimum delay in seconds
    pub min_delay: u64,
    /// Seconds after readiness before an operation expires
    pub grace_period: u64,
    /// Let anyone execute ready operations
    pub open_executor: bool,
    /// Proposers besides the governor
    pub proposers: Vec<Address>,
    /// Executors besides the governor
    pub executors: Vec<Address>,
    /// Cancellers besides the guardian
    pub cancellers: Vec<Address>,
}

impl Default for TimelockConfig {
    fn default() -> Self {
        Self {
            min_delay: 1,
            grace_period: 14 * 24 * 60 * 60,
            open_executor: false,
            proposers: vec![],
            executors: vec![],
            cancellers: vec![],
        }
    }
}

/// Treasury parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreasuryConfig {
    /// Cap on the sum of live compensation limits
    pub max_debt_threshold: TokenAmount,
}

impl Default for TreasuryConfig {
    fn default() -> Self {
        Self {
            max_debt_threshold: TokenAmount(10_000_000_000_000_000_000_000),
        }
    }
}

/// Rewards parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardsConfig {
    /// Tokens paid per unit of vote weight
    pub reward_per_vote: TokenAmount,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            reward_per_vote: TokenAmount(10),
        }
    }
}

/// Genesis clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub genesis_block: u64,
    pub genesis_timestamp: u64,
    /// Block time in seconds
    pub block_time: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            genesis_block: 0,
            genesis_timestamp: 0,
            block_time: 15,
        }
    }
}

/// System accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressConfig {
    pub governor: Address,
    pub timelock: Address,
    pub treasury: Address,
    pub rewards: Address,
    /// Governance token: rewards and plain value calls use it
    pub token: Address,
}

impl Default for AddressConfig {
    fn default() -> Self {
        Self {
            governor: Address::system(1),
            timelock: Address::system(2),
            treasury: Address::system(3),
            rewards: Address::system(4),
            token: Address::system(0x100),
        }
    }
}

/// A genesis role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    pub name: String,
    #[serde(default)]
    pub members: Vec<Address>,
    /// Role power multiplier in basis points
    #[serde(default = "default_weight_bps")]
    pub weight_bps: u32,
    /// Quorum for proposals in this role's context
    #[serde(default)]
    pub quorum: Option<TokenAmount>,
}

impl RoleConfig {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: vec![],
            weight_bps: default_weight_bps(),
            quorum: None,
        }
    }
}

fn default_weight_bps() -> u32 {
    crate::roles::FULL_WEIGHT_BPS
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "warden_governance=debug"
    pub level: String,
    /// Emit JSON lines instead of pretty output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
