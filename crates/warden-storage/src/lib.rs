//! Warden Storage - JSON-file snapshot storage.
//!
//! State is kept as `column -> hex(key) -> hex(value)` inside a single
//! `data.json` file. Values are borsh-encoded by the callers. Every write
//! rewrites the file through a temporary file and a rename, so a reader
//! never observes a half-written snapshot.

pub mod error;

pub use error::StorageError;

use borsh::{BorshDeserialize, BorshSerialize};
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DATA_FILE: &str = "data.json";

/// Columns used by the governance engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    /// Role registry: role_id -> RoleEntry
    Roles,
    /// Proposals: proposal_id -> Proposal
    Proposals,
    /// Timelock operations: operation_id -> Operation
    Operations,
    /// Insurance policies: policy_id (big-endian) -> Policy
    Policies,
    /// Reward grants and claims
    Rewards,
    /// Singletons: parameters, clock, ordering lists
    Meta,
}

impl Column {
    pub fn name(&self) -> &'static str {
        match self {
            Column::Roles => "roles",
            Column::Proposals => "proposals",
            Column::Operations => "operations",
            Column::Policies => "policies",
            Column::Rewards => "rewards",
            Column::Meta => "meta",
        }
    }

    pub fn all() -> [Column; 6] {
        [
            Column::Roles,
            Column::Proposals,
            Column::Operations,
            Column::Policies,
            Column::Rewards,
            Column::Meta,
        ]
    }
}

enum BatchOp {
    Put(Column, Vec<u8>, Vec<u8>),
    Delete(Column, Vec<u8>),
    Clear(Column),
}

/// A group of writes applied with a single persist.
#[derive(Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, column: Column, key: &[u8], value: &[u8]) {
        self.ops.push(BatchOp::Put(column, key.to_vec(), value.to_vec()));
    }

    /// Borsh-encode `value` and queue it.
    pub fn put_borsh<T: BorshSerialize>(
        &mut self,
        column: Column,
        key: &[u8],
        value: &T,
    ) -> Result<(), StorageError> {
        let bytes = borsh::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.put(column, key, &bytes);
        Ok(())
    }

    pub fn delete(&mut self, column: Column, key: &[u8]) {
        self.ops.push(BatchOp::Delete(column, key.to_vec()));
    }

    /// Drop every entry of `column` before the following puts land.
    pub fn clear(&mut self, column: Column) {
        self.ops.push(BatchOp::Clear(column));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Database - Simple JSON file-based storage
#[derive(Clone)]
pub struct Database {
    path: PathBuf,
    data: Arc<RwLock<serde_json::Value>>,
}

impl Database {
    /// Open (or create) a database directory.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(path)?;

        let data_file = path.join(DATA_FILE);
        let data = if data_file.exists() {
            let content = fs::read_to_string(&data_file)?;
            serde_json::from_str(&content).map_err(|e| StorageError::Corrupt(e.to_string()))?
        } else {
            serde_json::json!({})
        };

        tracing::debug!(path = %path.display(), "Opened database");

        Ok(Self {
            path: path.to_path_buf(),
            data: Arc::new(RwLock::new(data)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let data = self.data.read();
        let key_hex = hex::encode(key);

        match data.get(column.name()).and_then(|c| c.get(&key_hex)) {
            Some(value) => {
                let str_val = value
                    .as_str()
                    .ok_or_else(|| StorageError::Corrupt(format!("non-string value in {}", column.name())))?;
                Ok(Some(hex::decode(str_val)?))
            }
            None => Ok(None),
        }
    }

    /// Fetch and borsh-decode a value.
    pub fn get_borsh<T: BorshDeserialize>(
        &self,
        column: Column,
        key: &[u8],
    ) -> Result<Option<T>, StorageError> {
        match self.get(column, key)? {
            Some(bytes) => T::try_from_slice(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// All entries of a column, ordered by key bytes.
    pub fn entries(&self, column: Column) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let data = self.data.read();
        let mut out = Vec::new();
        if let Some(obj) = data.get(column.name()).and_then(|c| c.as_object()) {
            for (k, v) in obj {
                let value = v
                    .as_str()
                    .ok_or_else(|| StorageError::Corrupt(format!("non-string value in {}", column.name())))?;
                out.push((hex::decode(k)?, hex::decode(value)?));
            }
        }
        out.sort();
        Ok(out)
    }

    pub fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let mut batch = WriteBatch::new();
        batch.put(column, key, value);
        self.write(batch)
    }

    pub fn delete(&self, column: Column, key: &[u8]) -> Result<(), StorageError> {
        let mut batch = WriteBatch::new();
        batch.delete(column, key);
        self.write(batch)
    }

    /// Apply a batch and persist once.
    pub fn write(&self, batch: WriteBatch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }
        let count = batch.len();

        // Clone data for persistence (to avoid holding lock during I/O)
        let data_to_persist = {
            let mut data = self.data.write();
            if !data.is_object() {
                *data = serde_json::json!({});
            }
            let root = match data.as_object_mut() {
                Some(root) => root,
                None => return Err(StorageError::Corrupt("root is not an object".to_string())),
            };

            for op in batch.ops {
                match op {
                    BatchOp::Put(column, key, value) => {
                        let col = root
                            .entry(column.name().to_string())
                            .or_insert_with(|| serde_json::json!({}));
                        if let Some(obj) = col.as_object_mut() {
                            obj.insert(hex::encode(key), serde_json::json!(hex::encode(value)));
                        }
                    }
                    BatchOp::Delete(column, key) => {
                        if let Some(obj) = root.get_mut(column.name()).and_then(|c| c.as_object_mut()) {
                            obj.remove(&hex::encode(key));
                        }
                    }
                    BatchOp::Clear(column) => {
                        root.insert(column.name().to_string(), serde_json::json!({}));
                    }
                }
            }

            data.clone()
        }; // Lock released here

        self.persist(&data_to_persist)?;
        tracing::trace!(ops = count, "Wrote batch");
        Ok(())
    }

    fn persist(&self, data: &serde_json::Value) -> Result<(), StorageError> {
        let data_file = self.path.join(DATA_FILE);
        let tmp_file = self.path.join(format!("{}.tmp", DATA_FILE));
        let content = serde_json::to_string_pretty(data)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        fs::write(&tmp_file, content)?;
        fs::rename(&tmp_file, &data_file)?;
        Ok(())
    }
}
