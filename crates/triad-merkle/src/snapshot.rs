//! Tree snapshots on disk.
//!
//! # File format
//!
//! A snapshot is a JSON object, optionally wrapped in a whole-file gzip or
//! zstd stream:
//!
//! ```json
//! {
//!   "version": 1,
//!   "depth": 10,
//!   "hasher": "poseidon",
//!   "zeroValue": "0",
//!   "leaves": ["1", "2", "3"],
//!   "filledSubtrees": ["...", "..."]
//! }
//! ```
//!
//! Field elements are written as decimal strings; `0x` hex strings are
//! accepted when reading. `filledSubtrees` is redundant with `leaves` and is
//! checked against the replayed tree on load, which catches truncated leaf
//! lists and snapshots written under a different hash function.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::codec::Compression;
use crate::hash::{HasherKind, TreeHasher};
use crate::shard::tree_capacity;
use crate::tree::TriadMerkleTree;
use crate::{FieldElement, MerkleError, MerkleResult, TRIAD_SIZE};

pub const SNAPSHOT_VERSION: u32 = 1;

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeSnapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    pub depth: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hasher: Option<HasherKind>,
    pub zero_value: FieldElement,
    pub leaves: Vec<FieldElement>,
    pub filled_subtrees: Vec<FieldElement>,
}

impl TreeSnapshot {
    pub fn to_json_bytes(&self) -> MerkleResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| MerkleError::InvalidInput(e.to_string()))
    }

    pub fn from_json_bytes(bytes: &[u8]) -> MerkleResult<Self> {
        let snapshot: TreeSnapshot = serde_json::from_slice(bytes)
            .map_err(|e| MerkleError::MalformedSnapshot(e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(MerkleError::UnsupportedVersion(snapshot.version));
        }
        Ok(snapshot)
    }

    pub fn encode(&self, compression: Compression) -> MerkleResult<Vec<u8>> {
        compression.encode(&self.to_json_bytes()?)
    }

    /// Decode snapshot bytes. The encoding is sniffed from the bytes; if
    /// `expected` is given and disagrees, decoding fails.
    pub fn decode(bytes: &[u8], expected: Option<bool>) -> MerkleResult<Self> {
        let detected = Compression::detect(bytes);
        match expected {
            Some(true) if !detected.is_compressed() => {
                return Err(MerkleError::Decompression(
                    "expected a compressed snapshot, found uncompressed data".to_string(),
                ));
            }
            Some(false) if detected.is_compressed() => {
                return Err(MerkleError::Decompression(format!(
                    "expected an uncompressed snapshot, found {} data",
                    detected
                )));
            }
            _ => {}
        }
        Self::from_json_bytes(&detected.decode(bytes)?)
    }

    /// Read a snapshot file in whatever encoding it is in, without replaying
    /// its leaves.
    pub fn read_from_file(path: impl AsRef<Path>) -> MerkleResult<Self> {
        Self::decode(&read_snapshot_file(path.as_ref())?, None)
    }

    /// Structural checks that do not need a hasher.
    fn validate(&self) -> MerkleResult<()> {
        let capacity = tree_capacity(self.depth)
            .map_err(|e| MerkleError::MalformedSnapshot(e.to_string()))?;
        if self.leaves.len() % TRIAD_SIZE != 0 {
            return Err(MerkleError::MalformedSnapshot(format!(
                "leaf count {} is not a multiple of {}",
                self.leaves.len(),
                TRIAD_SIZE
            )));
        }
        if self.leaves.len() as u64 > capacity {
            return Err(MerkleError::MalformedSnapshot(format!(
                "leaf count {} exceeds capacity {}",
                self.leaves.len(),
                capacity
            )));
        }
        if self.filled_subtrees.len() != self.depth {
            return Err(MerkleError::MalformedSnapshot(format!(
                "expected {} filled subtrees, found {}",
                self.depth,
                self.filled_subtrees.len()
            )));
        }
        Ok(())
    }
}

impl TriadMerkleTree {
    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            version: SNAPSHOT_VERSION,
            depth: self.depth(),
            hasher: self.hasher().kind(),
            zero_value: self.zero_value(),
            leaves: self.leaves().to_vec(),
            filled_subtrees: self.filled_subtrees().to_vec(),
        }
    }

    /// Rebuild a tree by replaying the snapshot's leaves.
    pub fn from_snapshot(snapshot: &TreeSnapshot, hasher: Arc<dyn TreeHasher>) -> MerkleResult<Self> {
        snapshot.validate()?;
        if let (Some(recorded), Some(given)) = (snapshot.hasher, hasher.kind()) {
            if recorded != given {
                return Err(MerkleError::MalformedSnapshot(format!(
                    "snapshot was written with the {} hasher, loading with {}",
                    recorded, given
                )));
            }
        }

        let mut tree = TriadMerkleTree::new(snapshot.depth, snapshot.zero_value, hasher)?;
        for triad in snapshot.leaves.chunks(TRIAD_SIZE) {
            tree.insert_batch(triad)?;
        }

        if tree.filled_subtrees() != snapshot.filled_subtrees.as_slice() {
            return Err(MerkleError::MalformedSnapshot(
                "filled subtrees do not match the replayed leaves".to_string(),
            ));
        }
        Ok(tree)
    }

    /// Write a snapshot, gzip-compressed if `compress` is set.
    pub fn save(&self, path: impl AsRef<Path>, compress: bool) -> MerkleResult<()> {
        let compression = if compress {
            Compression::Gzip
        } else {
            Compression::None
        };
        self.save_with(path, compression)
    }

    pub fn save_with(&self, path: impl AsRef<Path>, compression: Compression) -> MerkleResult<()> {
        let path = path.as_ref();
        let bytes = self.snapshot().encode(compression)?;
        write_atomic(path, &bytes)?;
        debug!(
            path = %path.display(),
            leaves = self.len(),
            compression = %compression,
            bytes = bytes.len(),
            "Saved tree snapshot"
        );
        Ok(())
    }

    /// Load a snapshot written by [`save`](Self::save). `compressed` must
    /// match how the file was written.
    pub fn load_from_file(
        path: impl AsRef<Path>,
        hasher: Arc<dyn TreeHasher>,
        compressed: bool,
    ) -> MerkleResult<Self> {
        Self::load(path.as_ref(), hasher, Some(compressed))
    }

    /// Load a snapshot in whatever encoding it is in.
    pub fn load_auto(path: impl AsRef<Path>, hasher: Arc<dyn TreeHasher>) -> MerkleResult<Self> {
        Self::load(path.as_ref(), hasher, None)
    }

    fn load(path: &Path, hasher: Arc<dyn TreeHasher>, compressed: Option<bool>) -> MerkleResult<Self> {
        let bytes = read_snapshot_file(path)?;
        let snapshot = TreeSnapshot::decode(&bytes, compressed)?;
        let tree = Self::from_snapshot(&snapshot, hasher)?;
        debug!(
            path = %path.display(),
            depth = tree.depth(),
            leaves = tree.len(),
            root = %tree.root(),
            "Loaded tree snapshot"
        );
        Ok(tree)
    }
}

pub(crate) fn read_snapshot_file(path: &Path) -> MerkleResult<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => MerkleError::SnapshotNotFound(path.to_path_buf()),
        _ => MerkleError::Io(e),
    })
}

/// Write to a sibling temp file, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> MerkleResult<()> {
    let tmp = temp_path(path);
    let result = (|| -> MerkleResult<()> {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if result.is_err() {
        if let Err(e) = fs::remove_file(&tmp) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %tmp.display(), error = %e, "Failed to remove temp snapshot");
            }
        }
    }
    result
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
