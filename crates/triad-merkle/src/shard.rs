//! Locating leaves across same-depth tree shards.
//!
//! A commitment stream larger than one tree is split over a sequence of
//! trees of equal depth. Leaf ids are global and dense: shard `n` holds leaf
//! ids `n * capacity .. (n + 1) * capacity`.

use serde::{Deserialize, Serialize};

use crate::tree::validate_depth;
use crate::{MerkleResult, TRIAD_SIZE};

/// Where a global leaf id lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafLocation {
    pub tree_id: u64,
    /// Triad index inside the tree.
    pub triad_id: u64,
    /// Position inside the triad (0, 1 or 2).
    pub position: u8,
}

impl LeafLocation {
    /// Leaf index inside the tree.
    pub fn leaf_index(&self) -> u64 {
        self.triad_id * TRIAD_SIZE as u64 + self.position as u64
    }

    /// Global leaf id for this location in trees of `depth`.
    pub fn leaf_id(&self, depth: usize) -> MerkleResult<u64> {
        Ok(self.tree_id * tree_capacity(depth)? + self.leaf_index())
    }
}

/// Leaves per tree of the given depth: `3 * 2^(depth - 1)`.
pub fn tree_capacity(depth: usize) -> MerkleResult<u64> {
    validate_depth(depth)?;
    Ok((TRIAD_SIZE as u64) << (depth - 1))
}

/// Map a global leaf id to its shard, triad and position.
pub fn leaf_id_to_tree_id_and_triad_id(leaf_id: u64, depth: usize) -> MerkleResult<LeafLocation> {
    let capacity = tree_capacity(depth)?;
    let leaf_index = leaf_id % capacity;
    Ok(LeafLocation {
        tree_id: leaf_id / capacity,
        triad_id: leaf_index / TRIAD_SIZE as u64,
        position: (leaf_index % TRIAD_SIZE as u64) as u8,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MerkleError;

    #[test]
    fn test_capacity() {
        assert_eq!(tree_capacity(1).unwrap(), 3);
        assert_eq!(tree_capacity(10).unwrap(), 1536);
        assert_eq!(tree_capacity(32).unwrap(), 3 * (1u64 << 31));
        assert!(matches!(tree_capacity(0), Err(MerkleError::InvalidDepth { .. })));
    }

    #[test]
    fn test_shard_boundary() {
        // (leaf_id, tree_id, triad_id, position) for depth 10, capacity 1536
        let cases = [
            (0u64, 0u64, 0u64, 0u8),
            (2, 0, 0, 2),
            (3, 0, 1, 0),
            (1533, 0, 511, 0),
            (1535, 0, 511, 2),
            (1536, 1, 0, 0),
            (1537, 1, 0, 1),
            (1539, 1, 1, 0),
            (3071, 1, 511, 2),
            (3072, 2, 0, 0),
            (4000, 2, 309, 1),
        ];
        for (leaf_id, tree_id, triad_id, position) in cases {
            let loc = leaf_id_to_tree_id_and_triad_id(leaf_id, 10).unwrap();
            assert_eq!(
                loc,
                LeafLocation { tree_id, triad_id, position },
                "leaf id {}",
                leaf_id
            );
            assert_eq!(loc.leaf_id(10).unwrap(), leaf_id);
        }
    }

    #[test]
    fn test_small_depth() {
        // depth 2: 6 leaves per tree
        let loc = leaf_id_to_tree_id_and_triad_id(6, 2).unwrap();
        assert_eq!(loc, LeafLocation { tree_id: 1, triad_id: 0, position: 0 });
        assert_eq!(loc.leaf_index(), 0);

        let loc = leaf_id_to_tree_id_and_triad_id(17, 2).unwrap();
        assert_eq!(loc, LeafLocation { tree_id: 2, triad_id: 1, position: 2 });
        assert_eq!(loc.leaf_index(), 5);
    }
}
