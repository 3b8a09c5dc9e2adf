//! Error taxonomy.
//!
//! Every variant that concerns a specific release or snapshot carries enough
//! context to name it. Nothing in the pipeline degrades to a partial result:
//! an error aborts the whole operation.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::release::ReleaseKey;

pub type Result<T> = std::result::Result<T, AuditError>;

#[derive(Debug, Error)]
pub enum AuditError {
    /// Inventory pass exceeded its deadline. Retryable by the caller.
    #[error("inventory pass timed out after {after:?}: {context}")]
    Timeout { after: Duration, context: String },

    /// Snapshot persistence or read failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Referenced snapshot id does not exist
    #[error("snapshot #{0} not found")]
    NotFound(i64),

    /// Invariant violation in snapshot data
    #[error("malformed snapshot: {defect} {key} in {context}")]
    MalformedSnapshot {
        key: ReleaseKey,
        context: String,
        defect: Defect,
    },

    /// Declared baseline file that doesn't parse as a snapshot
    #[error("invalid baseline {path}: {reason}")]
    InvalidBaseline { path: String, reason: String },

    /// Inventory client failure (one or more queries failed)
    #[error("inventory error: {0}")]
    Inventory(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What is wrong with a record that was refused by the snapshot builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Defect {
    DuplicateRelease,
    ZeroRevision,
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Defect::DuplicateRelease => f.write_str("duplicate release"),
            Defect::ZeroRevision => f.write_str("revision 0 for release"),
        }
    }
}

impl AuditError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuditError::Timeout { .. })
    }
}

impl From<rusqlite::Error> for AuditError {
    fn from(err: rusqlite::Error) -> Self {
        AuditError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for AuditError {
    fn from(err: std::io::Error) -> Self {
        AuditError::Storage(err.to_string())
    }
}
