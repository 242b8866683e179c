//! A sequence of same-depth triad trees.
//!
//! Commitments keep arriving after any single tree is full, so the stream is
//! sharded: when the newest tree fills up, a fresh empty tree is opened and
//! insertion continues there. Global leaf ids map onto shards through
//! [`leaf_id_to_tree_id_and_triad_id`].

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::codec::Compression;
use crate::hash::TreeHasher;
use crate::proof::MerkleProof;
use crate::shard::{leaf_id_to_tree_id_and_triad_id, LeafLocation};
use crate::tree::TriadMerkleTree;
use crate::{FieldElement, MerkleError, MerkleResult, TRIAD_SIZE};

const SHARD_FILE_PREFIX: &str = "tree-";
const SHARD_FILE_SUFFIXES: [&str; 3] = [".json", ".json.gz", ".json.zst"];

#[derive(Clone, Debug)]
pub struct TriadForest {
    /// Empty tree cloned whenever a new shard is opened.
    template: TriadMerkleTree,
    trees: Vec<TriadMerkleTree>,
}

impl TriadForest {
    pub fn new(
        depth: usize,
        zero_value: FieldElement,
        hasher: Arc<dyn TreeHasher>,
    ) -> MerkleResult<Self> {
        let template = TriadMerkleTree::new(depth, zero_value, hasher)?;
        Ok(Self {
            trees: vec![template.clone()],
            template,
        })
    }

    pub fn depth(&self) -> usize {
        self.template.depth()
    }

    pub fn zero_value(&self) -> FieldElement {
        self.template.zero_value()
    }

    pub fn hasher(&self) -> &Arc<dyn TreeHasher> {
        self.template.hasher()
    }

    /// Leaves per shard.
    pub fn tree_capacity(&self) -> u64 {
        self.template.capacity()
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[TriadMerkleTree] {
        &self.trees
    }

    pub fn tree(&self, tree_id: u64) -> Option<&TriadMerkleTree> {
        self.trees.get(usize::try_from(tree_id).ok()?)
    }

    /// The shard currently accepting leaves.
    pub fn current_tree(&self) -> &TriadMerkleTree {
        // never empty: constructed with one shard, and shards are only added
        &self.trees[self.trees.len() - 1]
    }

    pub fn current_root(&self) -> FieldElement {
        self.current_tree().root()
    }

    pub fn roots(&self) -> Vec<FieldElement> {
        self.trees.iter().map(|t| t.root()).collect()
    }

    pub fn total_leaves(&self) -> u64 {
        let full = (self.trees.len() as u64 - 1) * self.tree_capacity();
        full + self.current_tree().len() as u64
    }

    /// Append a triad, opening a new shard first if the current one is full.
    /// Returns the location of the triad's first leaf.
    pub fn insert_batch(&mut self, triad: &[FieldElement]) -> MerkleResult<LeafLocation> {
        if triad.len() != TRIAD_SIZE {
            return Err(MerkleError::InvalidBatchSize {
                expected: TRIAD_SIZE,
                got: triad.len(),
            });
        }
        if self.current_tree().is_full() {
            let mut fresh = self.template.clone();
            fresh.insert_batch(triad)?;
            self.trees.push(fresh);
            let tree_id = (self.trees.len() - 1) as u64;
            info!(tree_id, depth = self.depth(), "Opened new tree shard");
            return Ok(LeafLocation {
                tree_id,
                triad_id: 0,
                position: 0,
            });
        }

        let tree_id = (self.trees.len() - 1) as u64;
        let current = self
            .trees
            .last_mut()
            .ok_or_else(|| MerkleError::InvalidInput("forest has no trees".to_string()))?;
        let triad_id = current.triad_count() as u64;
        current.insert_batch(triad)?;

        Ok(LeafLocation {
            tree_id,
            triad_id,
            position: 0,
        })
    }

    /// Merkle path for a global leaf id, against its shard's current root.
    pub fn gen_merkle_path(&self, leaf_id: u64) -> MerkleResult<MerkleProof> {
        let out_of_range = || MerkleError::IndexOutOfRange {
            index: leaf_id,
            len: self.total_leaves(),
        };
        let location = leaf_id_to_tree_id_and_triad_id(leaf_id, self.depth())?;
        let tree = self.tree(location.tree_id).ok_or_else(out_of_range)?;
        let leaf_index = location.leaf_index() as usize;
        if leaf_index >= tree.len() {
            return Err(out_of_range());
        }
        tree.gen_merkle_path(leaf_index)
    }

    /// Write one snapshot per shard into `dir` (`tree-00000.json`, ...).
    ///
    /// Shard files the forest does not own afterwards are removed: copies of
    /// a shard in another encoding, and shards past the last one.
    pub fn save_to_dir(&self, dir: impl AsRef<Path>, compression: Compression) -> MerkleResult<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let mut written = HashSet::with_capacity(self.trees.len());
        for (tree_id, tree) in self.trees.iter().enumerate() {
            let path = dir.join(shard_file_name(tree_id as u64, compression));
            tree.save_with(&path, compression)?;
            written.insert(path);
        }

        for (tree_id, path) in list_shard_files(dir)? {
            if !written.contains(&path) {
                fs::remove_file(&path)?;
                debug!(tree_id, path = %path.display(), "Removed stale shard file");
            }
        }
        debug!(dir = %dir.display(), shards = self.trees.len(), "Saved forest");
        Ok(())
    }

    /// `true` if `dir` holds at least one shard file. A missing directory
    /// holds none.
    pub fn contains_shards(dir: impl AsRef<Path>) -> MerkleResult<bool> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Ok(false);
        }
        Ok(!list_shard_files(dir)?.is_empty())
    }

    /// Load shards written by [`save_to_dir`](Self::save_to_dir).
    ///
    /// Shard ids must run from 0 without gaps or duplicates. Every shard must
    /// share depth and zero value, and every shard but the last must be full.
    pub fn load_from_dir(dir: impl AsRef<Path>, hasher: Arc<dyn TreeHasher>) -> MerkleResult<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(MerkleError::SnapshotNotFound(dir.to_path_buf()));
        }

        let shards = list_shard_files(dir)?;
        for (expected, (tree_id, path)) in shards.iter().enumerate() {
            let expected = expected as u64;
            if *tree_id < expected {
                return Err(MerkleError::MalformedSnapshot(format!(
                    "shard {} is stored twice (found {})",
                    tree_id,
                    path.display()
                )));
            }
            if *tree_id > expected {
                return Err(MerkleError::MalformedSnapshot(format!(
                    "shard {} is missing from {}",
                    expected,
                    dir.display()
                )));
            }
        }

        let mut trees = Vec::with_capacity(shards.len());
        for (_, path) in &shards {
            trees.push(TriadMerkleTree::load_auto(path, hasher.clone())?);
        }

        let first = trees.first().ok_or_else(|| {
            MerkleError::MalformedSnapshot(format!("no tree shards in {}", dir.display()))
        })?;
        let template = TriadMerkleTree::new(first.depth(), first.zero_value(), hasher)?;

        for (tree_id, tree) in trees.iter().enumerate() {
            if tree.depth() != template.depth() || tree.zero_value() != template.zero_value() {
                return Err(MerkleError::MalformedSnapshot(format!(
                    "shard {} has depth {} and zero value {}, expected {} and {}",
                    tree_id,
                    tree.depth(),
                    tree.zero_value(),
                    template.depth(),
                    template.zero_value()
                )));
            }
            if tree_id + 1 < trees.len() && !tree.is_full() {
                return Err(MerkleError::MalformedSnapshot(format!(
                    "shard {} is not full but is followed by another shard",
                    tree_id
                )));
            }
        }

        info!(dir = %dir.display(), shards = trees.len(), "Loaded forest");
        Ok(Self { template, trees })
    }
}

fn shard_file_name(tree_id: u64, compression: Compression) -> String {
    let mut name = format!("{}{:05}.json", SHARD_FILE_PREFIX, tree_id);
    if let Some(ext) = compression.extension() {
        name.push('.');
        name.push_str(ext);
    }
    name
}

/// Shard id encoded in a shard file name, or `None` if `name` is not a
/// shard file (including temp files left by an interrupted write).
fn parse_shard_id(name: &str) -> Option<u64> {
    let rest = name.strip_prefix(SHARD_FILE_PREFIX)?;
    let (digits, suffix) = rest.split_at(rest.find('.')?);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !SHARD_FILE_SUFFIXES.contains(&suffix) {
        return None;
    }
    digits.parse().ok()
}

/// Shard files in `dir`, ordered by shard id.
fn list_shard_files(dir: &Path) -> MerkleResult<Vec<(u64, PathBuf)>> {
    let mut shards = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let tree_id = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_shard_id);
        if let Some(tree_id) = tree_id {
            shards.push((tree_id, path));
        }
    }
    shards.sort();
    Ok(shards)
}
