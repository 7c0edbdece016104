//! Fungible token collaborator.
//!
//! The engine never owns balances itself: every movement of funds goes
//! through a [`TokenLedger`]. [`Erc20Ledger`] is the in-memory ledger used
//! by tests and embedders that have no ledger of their own.

use std::collections::BTreeMap;
use thiserror::Error;
use warden_types::{Address, Amount};

/// Token ledger failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TokenError {
    #[error("Insufficient balance for {account}: need {needed}, have {available}")]
    InsufficientBalance {
        account: Address,
        needed: Amount,
        available: Amount,
    },

    #[error("Insufficient allowance from {owner}: need {needed}, have {available}")]
    InsufficientAllowance {
        owner: Address,
        needed: Amount,
        available: Amount,
    },

    #[error("Zero address not allowed")]
    ZeroAddress,

    #[error("Arithmetic overflow")]
    Overflow,
}

/// Balances, transfers and approvals of one fungible asset.
pub trait TokenLedger {
    fn balance_of(&self, account: &Address) -> Amount;

    fn allowance(&self, owner: &Address, spender: &Address) -> Amount;

    /// Move `amount` from `from` to `to`, authorised by `from` itself.
    fn transfer(&mut self, from: Address, to: Address, amount: Amount) -> Result<(), TokenError>;

    /// Move `amount` from `from` to `to` against the allowance `from` gave `spender`.
    fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), TokenError>;

    fn approve(&mut self, owner: Address, spender: Address, amount: Amount) -> Result<(), TokenError>;
}

/// In-memory ERC20-style ledger.
#[derive(Debug, Clone, Default)]
pub struct Erc20Ledger {
    /// Token name
    pub name: String,
    /// Token symbol
    pub symbol: String,
    /// Total supply
    pub total_supply: Amount,
    balances: BTreeMap<Address, Amount>,
    allowances: BTreeMap<(Address, Address), Amount>,
}

impl Erc20Ledger {
    pub fn new(name: &str, symbol: &str) -> Self {
        Self {
            name: name.to_string(),
            symbol: symbol.to_string(),
            ..Default::default()
        }
    }

    /// Initialize with initial supply (minted to owner)
    pub fn with_initial_supply(
        name: &str,
        symbol: &str,
        owner: Address,
        initial_supply: Amount,
    ) -> Result<Self, TokenError> {
        let mut token = Self::new(name, symbol);
        token.mint(owner, initial_supply)?;
        Ok(token)
    }

    pub fn mint(&mut self, to: Address, amount: Amount) -> Result<(), TokenError> {
        if to.is_zero() {
            return Err(TokenError::ZeroAddress);
        }
        let supply = self.total_supply.checked_add(amount).ok_or(TokenError::Overflow)?;
        let balance = self.balance_of(&to).checked_add(amount).ok_or(TokenError::Overflow)?;
        self.total_supply = supply;
        self.balances.insert(to, balance);
        Ok(())
    }

    fn move_balance(&mut self, from: Address, to: Address, amount: Amount) -> Result<(), TokenError> {
        if to.is_zero() {
            return Err(TokenError::ZeroAddress);
        }
        let from_balance = self.balance_of(&from);
        if from_balance < amount {
            return Err(TokenError::InsufficientBalance {
                account: from,
                needed: amount,
                available: from_balance,
            });
        }
        if from == to {
            return Ok(());
        }
        let to_balance = self.balance_of(&to).checked_add(amount).ok_or(TokenError::Overflow)?;
        self.balances.insert(from, from_balance - amount);
        self.balances.insert(to, to_balance);
        Ok(())
    }
}

impl TokenLedger for Erc20Ledger {
    fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or(0)
    }

    fn transfer(&mut self, from: Address, to: Address, amount: Amount) -> Result<(), TokenError> {
        self.move_balance(from, to, amount)
    }

    fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), TokenError> {
        let allowed = self.allowance(&from, &spender);
        if allowed < amount {
            return Err(TokenError::InsufficientAllowance {
                owner: from,
                needed: amount,
                available: allowed,
            });
        }
        self.move_balance(from, to, amount)?;
        self.allowances.insert((from, spender), allowed - amount);
        Ok(())
    }

    fn approve(&mut self, owner: Address, spender: Address, amount: Amount) -> Result<(), TokenError> {
        if spender.is_zero() {
            return Err(TokenError::ZeroAddress);
        }
        self.allowances.insert((owner, spender), amount);
        Ok(())
    }
}
