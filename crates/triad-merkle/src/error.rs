//! Error types for the triad Merkle tree.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MerkleError {
    #[error("Tree capacity exceeded: capacity {capacity} leaves, attempted {attempted}")]
    CapacityExceeded { capacity: u64, attempted: u64 },

    #[error("Invalid batch size: expected {expected} leaves, got {got}")]
    InvalidBatchSize { expected: usize, got: usize },

    #[error("Invalid hash arity: expected 2 or 3 inputs, got {got}")]
    InvalidArity { got: usize },

    #[error("Index {index} out of range (tree has {len} leaves)")]
    IndexOutOfRange { index: u64, len: u64 },

    #[error("Invalid tree depth {depth}: must be between 1 and {max}")]
    InvalidDepth { depth: usize, max: usize },

    #[error("Value is not a field element: {0}")]
    NotInField(String),

    #[error("Value too large for 32 bytes: {bits} bits")]
    ValueTooLarge { bits: u64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Hash function failed: {0}")]
    Hash(String),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(PathBuf),

    #[error("Decompression failed: {0}")]
    Decompression(String),

    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("Unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Commitment event out of order: last block {last}, got block {got}")]
    OutOfOrderEvent { last: u64, got: u64 },

    #[error("Ingest task is no longer running")]
    IngestClosed,
}

pub type MerkleResult<T> = std::result::Result<T, MerkleError>;
