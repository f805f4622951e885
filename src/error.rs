//! Error types for the revision ledger.

use crate::types::{EntityId, RevisionNumber};
use thiserror::Error;

/// Main error type for ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lineage not found: {0}")]
    LineageNotFound(EntityId),

    #[error("Revision not found: {0}")]
    RevisionNotFound(String),

    /// Another append claimed this number first. Retried internally; only
    /// surfaces once the retry budget is spent.
    #[error("Revision number conflict in lineage {lineage}: {number} already taken")]
    NumberConflict {
        lineage: EntityId,
        number: RevisionNumber,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid revision selector: {0}")]
    InvalidSelector(String),

    #[error("Lineage integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Restore rejected by hook: {0}")]
    HookRejected(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),
}

impl LedgerError {
    /// Whether the failed transaction may succeed if re-run.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::NumberConflict { .. })
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for LedgerError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for LedgerError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        LedgerError::Deserialization(e.to_string())
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
