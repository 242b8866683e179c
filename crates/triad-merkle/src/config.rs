//! Tree configuration

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::codec::Compression;
use crate::forest::TriadForest;
use crate::hash::{HasherKind, TreeHasher};
use crate::tree::{validate_depth, TriadMerkleTree};
use crate::{FieldElement, MerkleError, MerkleResult};

pub const DEFAULT_DEPTH: usize = 20;

/// Parameters shared by every tree of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TreeConfig {
    /// Levels from leaves to root
    pub depth: usize,

    /// Leaf value of unpopulated positions
    pub zero_value: FieldElement,

    pub hasher: HasherKind,

    /// Encoding used when writing snapshots
    pub compression: Compression,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH,
            zero_value: FieldElement::zero(),
            hasher: HasherKind::Poseidon,
            compression: Compression::None,
        }
    }
}

impl TreeConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for unset ones.
    pub fn from_env() -> MerkleResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> MerkleResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(depth) = lookup("TRIAD_TREE_DEPTH") {
            config.depth = depth.trim().parse().map_err(|_| {
                MerkleError::InvalidInput(format!("Invalid TRIAD_TREE_DEPTH: {}", depth))
            })?;
        }
        if let Some(zero) = lookup("TRIAD_ZERO_VALUE") {
            config.zero_value = zero.parse()?;
        }
        if let Some(hasher) = lookup("TRIAD_HASHER") {
            config.hasher = hasher.trim().parse()?;
        }
        if let Some(compression) = lookup("TRIAD_COMPRESSION") {
            config.compression = compression.trim().parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MerkleResult<()> {
        validate_depth(self.depth)
    }

    pub fn build_hasher(&self) -> MerkleResult<Arc<dyn TreeHasher>> {
        self.hasher.build()
    }

    pub fn build_tree(&self) -> MerkleResult<TriadMerkleTree> {
        self.validate()?;
        TriadMerkleTree::new(self.depth, self.zero_value, self.build_hasher()?)
    }

    pub fn build_forest(&self) -> MerkleResult<TriadForest> {
        self.validate()?;
        TriadForest::new(self.depth, self.zero_value, self.build_hasher()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = TreeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, TreeConfig::default());
        assert_eq!(config.depth, DEFAULT_DEPTH);
        assert_eq!(config.hasher, HasherKind::Poseidon);
    }

    #[test]
    fn test_env_overrides() {
        let config = TreeConfig::from_lookup(lookup(&[
            ("TRIAD_TREE_DEPTH", "10"),
            ("TRIAD_ZERO_VALUE", "0x2a"),
            ("TRIAD_HASHER", "sum23"),
            ("TRIAD_COMPRESSION", "zstd"),
        ]))
        .unwrap();
        assert_eq!(config.depth, 10);
        assert_eq!(config.zero_value, FieldElement::from(42));
        assert_eq!(config.hasher, HasherKind::Sum23);
        assert_eq!(config.compression, Compression::Zstd);
    }

    #[test]
    fn test_invalid_env() {
        assert!(TreeConfig::from_lookup(lookup(&[("TRIAD_TREE_DEPTH", "ten")])).is_err());
        assert!(matches!(
            TreeConfig::from_lookup(lookup(&[("TRIAD_TREE_DEPTH", "0")])),
            Err(MerkleError::InvalidDepth { .. })
        ));
        assert!(TreeConfig::from_lookup(lookup(&[("TRIAD_HASHER", "sha256")])).is_err());
        assert!(TreeConfig::from_lookup(lookup(&[("TRIAD_ZERO_VALUE", "-1")])).is_err());
    }

    #[test]
    fn test_build_tree() {
        let config = TreeConfig {
            depth: 3,
            zero_value: FieldElement::from(1),
            hasher: HasherKind::Sum23,
            compression: Compression::None,
        };
        let tree = config.build_tree().unwrap();
        assert_eq!(tree.capacity(), 12);
        assert_eq!(tree.root(), FieldElement::from(12));

        let forest = config.build_forest().unwrap();
        assert_eq!(forest.tree_capacity(), 12);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: TreeConfig =
            serde_json::from_str(r#"{"depth": 12, "hasher": "sum23"}"#).unwrap();
        assert_eq!(config.depth, 12);
        assert_eq!(config.hasher, HasherKind::Sum23);
        assert_eq!(config.zero_value, FieldElement::zero());
        assert_eq!(config.compression, Compression::None);
    }
}
