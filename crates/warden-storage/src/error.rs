use thiserror::Error;

/// Errors that can occur in storage operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corrupt data file: {0}")]
    Corrupt(String),

    #[error("Key not found in column {0}")]
    KeyNotFound(&'static str),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}

impl From<hex::FromHexError> for StorageError {
    fn from(e: hex::FromHexError) -> Self {
        StorageError::Deserialization(e.to_string())
    }
}

impl From<warden_types::TypesError> for StorageError {
    fn from(e: warden_types::TypesError) -> Self {
        StorageError::Deserialization(e.to_string())
    }
}
