//! Command handlers

pub mod codec;
pub mod proof;
pub mod tree;

use crate::config::Config;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;
use triad_merkle::{TreeSnapshot, TriadMerkleTree};

/// Load a tree snapshot with the hasher it was written with, unless one was
/// chosen explicitly.
pub(crate) fn load_snapshot(path: &Path, config: &Config) -> Result<TriadMerkleTree> {
    let snapshot = TreeSnapshot::read_from_file(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let kind = config.snapshot_hasher(snapshot.hasher);
    debug!(path = %path.display(), hasher = %kind, "Loading snapshot");
    TriadMerkleTree::from_snapshot(&snapshot, kind.build()?)
        .with_context(|| format!("Failed to load snapshot {}", path.display()))
}
