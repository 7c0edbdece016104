use thiserror::Error;

use crate::token::TokenError;

/// Errors that can occur in governance operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GovernanceError {
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Already done: {0}")]
    AlreadyDone(String),

    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Reentrant call into {0}")]
    Reentrancy(String),

    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("Token error: {0}")]
    Token(TokenError),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<TokenError> for GovernanceError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::InsufficientBalance { .. } | TokenError::InsufficientAllowance { .. } => {
                GovernanceError::InsufficientFunds(e.to_string())
            }
            other => GovernanceError::Token(other),
        }
    }
}

impl From<warden_storage::StorageError> for GovernanceError {
    fn from(e: warden_storage::StorageError) -> Self {
        GovernanceError::Storage(e.to_string())
    }
}

impl From<warden_types::TypesError> for GovernanceError {
    fn from(e: warden_types::TypesError) -> Self {
        GovernanceError::InvalidArgument(e.to_string())
    }
}
