//! Block clock.
//!
//! Time only moves at block boundaries: every advance mines at least one
//! block and the timestamp never decreases.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Current head of the chain the engine runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Chain {
    /// Current block number
    pub number: u64,
    /// Timestamp of the current block (seconds)
    pub timestamp: u64,
    /// Seconds between consecutive blocks
    pub block_time: u64,
}

impl Chain {
    pub fn new(number: u64, timestamp: u64, block_time: u64) -> Self {
        Self {
            number,
            timestamp,
            block_time,
        }
    }

    /// Mine `blocks` blocks at the configured block time.
    pub fn advance_blocks(&mut self, blocks: u64) {
        self.number = self.number.saturating_add(blocks);
        self.timestamp = self
            .timestamp
            .saturating_add(blocks.saturating_mul(self.block_time));
    }

    /// Jump `seconds` forward and mine one block at the new time.
    pub fn advance_time(&mut self, seconds: u64) {
        self.number = self.number.saturating_add(1);
        self.timestamp = self.timestamp.saturating_add(seconds);
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new(0, 0, 15)
    }
}
