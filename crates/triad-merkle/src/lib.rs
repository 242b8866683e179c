//! # triad-merkle
//!
//! Append-only Merkle commitment tree whose leaves arrive in triads.
//!
//! Every on-chain event emits three output commitments at once, so the tree
//! hashes leaves three at a time at the bottom level and pairwise above it:
//!
//! ```text
//! level d        root                      H2
//! ...            ...                       H2
//! level 2        H2(n0, n1)                H2
//! level 1        n0 = H3(l0, l1, l2)   n1 = H3(l3, l4, l5)
//! level 0        l0 l1 l2              l3 l4 l5
//! ```
//!
//! A tree of depth `d` holds `3 * 2^(d-1)` leaves. Unfilled positions take a
//! caller-chosen zero value, and the default value of an empty subtree at
//! each level is precomputed.
//!
//! - [`TriadMerkleTree`]: the incremental tree (insert, root, proofs).
//! - [`MerkleProof`]: inclusion proofs plus the transcoding into circuit
//!   signals.
//! - [`TriadForest`]: a sequence of same-depth trees for streams that
//!   outgrow one tree, addressed by global leaf id.
//! - [`IngestHandle`]: a single-writer task that appends commitment events.
//! - [`TreeSnapshot`]: JSON persistence, optionally gzip/zstd compressed.
//!
//! Hashing is pluggable through [`TreeHasher`]; [`PoseidonHasher`] is the
//! circom-compatible Poseidon over BN254.

pub mod codec;
pub mod config;
pub mod error;
pub mod field;
pub mod forest;
pub mod hash;
pub mod ingest;
pub mod proof;
pub mod shard;
pub mod snapshot;
pub mod tree;

pub use codec::{compress_string, decompress_string, Compression};
pub use config::TreeConfig;
pub use error::{MerkleError, MerkleResult};
pub use field::{bigint_to_bytes32, buffer_to_bigint, FieldElement};
pub use forest::TriadForest;
pub use hash::{HasherKind, PoseidonHasher, Sum23Hasher, TreeHasher};
pub use ingest::{CommitmentEvent, IngestHandle};
pub use proof::{
    path_elements_to_circuit_signals, path_indices_to_circuit_signals, verify_merkle_path,
    CircuitSignals, MerkleProof, PathElement,
};
pub use shard::{leaf_id_to_tree_id_and_triad_id, tree_capacity, LeafLocation};
pub use snapshot::{TreeSnapshot, SNAPSHOT_VERSION};
pub use tree::TriadMerkleTree;

/// Byte length of a serialized field element (BN254 scalar, big-endian).
pub const FIELD_BYTES: usize = 32;

/// Leaves per insertion batch and children per level-1 node.
pub const TRIAD_SIZE: usize = 3;

/// Deepest supported tree. Keeps capacities within `u64`.
pub const MAX_DEPTH: usize = 32;
