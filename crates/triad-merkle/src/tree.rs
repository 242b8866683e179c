//! The triad Merkle tree.
//!
//! Leaves are appended three at a time. Level 1 nodes are the 3-ary hash of
//! one triad; every level above is the binary hash of two children, up to a
//! single root at level `depth`:
//!
//! ```text
//! level depth            root
//!                      /      \
//! level 2           n0          n1
//!                  /  \        /  \
//! level 1       t0     t1    t2    t3        t_i = H3(leaf 3i, 3i+1, 3i+2)
//!              /|\    /|\   /|\   /|\
//! level 0     l0 l1 l2 ...
//! ```
//!
//! A tree of depth `d` therefore holds `3 * 2^(d-1)` leaves.
//!
//! # Incremental insertion
//!
//! Only the nodes on the path from the new triad to the root are recomputed.
//! When a path node is a right child its left sibling is read from
//! `filled_subtrees`; when it is a left child its right sibling does not
//! exist yet and the precomputed empty-subtree hash `zeros[level]` stands in.
//! Nodes are also written to per-level `layers` so Merkle paths can be
//! produced for any leaf.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::hash::TreeHasher;
use crate::{FieldElement, MerkleError, MerkleResult, MAX_DEPTH, TRIAD_SIZE};

#[derive(Clone)]
pub struct TriadMerkleTree {
    depth: usize,
    zero_value: FieldElement,
    hasher: Arc<dyn TreeHasher>,
    /// `zeros[l]`: root of an empty subtree at level `l`, for `l in 0..=depth`.
    zeros: Vec<FieldElement>,
    /// `filled_subtrees[l - 1]`: latest left-child node at level `l`, for
    /// `l in 1..=depth`. Starts out as `zeros[l]`.
    filled_subtrees: Vec<FieldElement>,
    /// `layers[l][i]`: node `i` of level `l`; `layers[0]` holds the leaves.
    layers: Vec<Vec<FieldElement>>,
}

impl TriadMerkleTree {
    /// Create an empty tree.
    pub fn new(
        depth: usize,
        zero_value: FieldElement,
        hasher: Arc<dyn TreeHasher>,
    ) -> MerkleResult<Self> {
        validate_depth(depth)?;
        let zeros = compute_zeros(depth, zero_value, hasher.as_ref())?;
        let filled_subtrees = zeros[1..].to_vec();
        Ok(Self {
            depth,
            zero_value,
            hasher,
            zeros,
            filled_subtrees,
            layers: vec![Vec::new(); depth + 1],
        })
    }

    pub fn with_hasher<H: TreeHasher + 'static>(
        depth: usize,
        zero_value: FieldElement,
        hasher: H,
    ) -> MerkleResult<Self> {
        Self::new(depth, zero_value, Arc::new(hasher))
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn zero_value(&self) -> FieldElement {
        self.zero_value
    }

    pub fn hasher(&self) -> &Arc<dyn TreeHasher> {
        &self.hasher
    }

    /// Number of leaves inserted so far. Always a multiple of 3.
    pub fn len(&self) -> usize {
        self.layers[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers[0].is_empty()
    }

    pub fn triad_count(&self) -> usize {
        self.len() / TRIAD_SIZE
    }

    /// Maximum number of leaves: `3 * 2^(depth - 1)`.
    pub fn capacity(&self) -> u64 {
        // depth is validated at construction
        3u64 << (self.depth - 1)
    }

    pub fn is_full(&self) -> bool {
        self.len() as u64 >= self.capacity()
    }

    pub fn leaves(&self) -> &[FieldElement] {
        &self.layers[0]
    }

    pub fn leaf(&self, index: usize) -> Option<FieldElement> {
        self.layers[0].get(index).copied()
    }

    pub fn zeros(&self) -> &[FieldElement] {
        &self.zeros
    }

    pub fn filled_subtrees(&self) -> &[FieldElement] {
        &self.filled_subtrees
    }

    /// Current root. An empty tree has root `zeros[depth]`.
    pub fn root(&self) -> FieldElement {
        self.layers[self.depth]
            .first()
            .copied()
            .unwrap_or(self.zeros[self.depth])
    }

    /// Node `index` of `level`, or the empty-subtree value if that position
    /// has not been filled yet.
    pub fn node(&self, level: usize, index: usize) -> Option<FieldElement> {
        let layer = self.layers.get(level)?;
        Some(layer.get(index).copied().unwrap_or(self.zeros[level]))
    }

    /// Append one triad of leaves.
    ///
    /// Fails without touching the tree if the batch is not exactly 3 leaves,
    /// if the tree is full, or if the hasher fails.
    pub fn insert_batch(&mut self, leaves: &[FieldElement]) -> MerkleResult<()> {
        if leaves.len() != TRIAD_SIZE {
            return Err(MerkleError::InvalidBatchSize {
                expected: TRIAD_SIZE,
                got: leaves.len(),
            });
        }
        let attempted = (self.len() + TRIAD_SIZE) as u64;
        if attempted > self.capacity() {
            return Err(MerkleError::CapacityExceeded {
                capacity: self.capacity(),
                attempted,
            });
        }

        let triad_index = self.triad_count();
        let path = self.compute_path(triad_index, leaves)?;

        self.layers[0].extend_from_slice(leaves);
        let mut index = triad_index;
        for (offset, node) in path.into_iter().enumerate() {
            let level = offset + 1;
            let layer = &mut self.layers[level];
            if index == layer.len() {
                layer.push(node);
            } else {
                layer[index] = node;
            }
            if index % 2 == 0 {
                self.filled_subtrees[offset] = node;
            }
            index >>= 1;
        }

        debug!(
            triad = triad_index,
            leaves = self.len(),
            root = %self.root(),
            "Inserted triad"
        );
        Ok(())
    }

    /// Insert several triads.
    ///
    /// Capacity is checked for the whole input first, so a capacity failure
    /// inserts nothing. A batch-size or hash failure stops at the offending
    /// triad; earlier triads stay inserted.
    pub fn insert_triads<'a, I>(&mut self, triads: I) -> MerkleResult<usize>
    where
        I: IntoIterator<Item = &'a [FieldElement]>,
    {
        let triads: Vec<&[FieldElement]> = triads.into_iter().collect();
        let incoming: usize = triads.iter().map(|t| t.len()).sum();
        let attempted = (self.len() + incoming) as u64;
        if attempted > self.capacity() {
            return Err(MerkleError::CapacityExceeded {
                capacity: self.capacity(),
                attempted,
            });
        }
        for triad in &triads {
            self.insert_batch(triad)?;
        }
        Ok(triads.len())
    }

    /// Hash the new triad and every ancestor up to the root, without
    /// mutating anything. Returns nodes for levels `1..=depth`.
    fn compute_path(
        &self,
        triad_index: usize,
        leaves: &[FieldElement],
    ) -> MerkleResult<Vec<FieldElement>> {
        let mut path = Vec::with_capacity(self.depth);
        let mut node = self.hasher.hash(leaves)?;
        path.push(node);

        let mut index = triad_index;
        for level in 1..self.depth {
            node = if index % 2 == 0 {
                self.hasher.hash(&[node, self.zeros[level]])?
            } else {
                self.hasher.hash(&[self.filled_subtrees[level - 1], node])?
            };
            index >>= 1;
            path.push(node);
        }
        Ok(path)
    }
}

impl fmt::Debug for TriadMerkleTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriadMerkleTree")
            .field("depth", &self.depth)
            .field("zero_value", &self.zero_value)
            .field("leaves", &self.len())
            .field("root", &self.root())
            .finish()
    }
}

pub(crate) fn validate_depth(depth: usize) -> MerkleResult<()> {
    if depth == 0 || depth > MAX_DEPTH {
        return Err(MerkleError::InvalidDepth {
            depth,
            max: MAX_DEPTH,
        });
    }
    Ok(())
}

/// Empty-subtree values for levels `0..=depth`.
pub fn compute_zeros(
    depth: usize,
    zero_value: FieldElement,
    hasher: &dyn TreeHasher,
) -> MerkleResult<Vec<FieldElement>> {
    validate_depth(depth)?;
    let mut zeros = Vec::with_capacity(depth + 1);
    zeros.push(zero_value);
    zeros.push(hasher.hash(&[zero_value; TRIAD_SIZE])?);
    for level in 2..=depth {
        let below = zeros[level - 1];
        zeros.push(hasher.hash(&[below, below])?);
    }
    Ok(zeros)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{PoseidonHasher, Sum23Hasher};

    fn fe(v: u64) -> FieldElement {
        FieldElement::from(v)
    }

    fn triad(start: u64) -> [FieldElement; 3] {
        [fe(start), fe(start + 1), fe(start + 2)]
    }

    /// Rebuild the root from scratch: pad to capacity, hash triads, then pairs.
    fn full_rebuild(tree: &TriadMerkleTree) -> FieldElement {
        let hasher = tree.hasher();
        let mut leaves = tree.leaves().to_vec();
        leaves.resize(tree.capacity() as usize, tree.zero_value());

        let mut level: Vec<FieldElement> = leaves
            .chunks(3)
            .map(|c| hasher.hash(c).unwrap())
            .collect();
        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|c| hasher.hash(c).unwrap())
                .collect();
        }
        level[0]
    }

    #[test]
    fn test_empty_tree() {
        let tree = TriadMerkleTree::with_hasher(4, fe(0), Sum23Hasher).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.capacity(), 24);
        // sum hash: the empty root is capacity * zero
        assert_eq!(tree.root(), fe(0));
        assert_eq!(tree.zeros().len(), 5);
        assert_eq!(tree.filled_subtrees().len(), 4);
    }

    #[test]
    fn test_zeros_sum23() {
        let zeros = compute_zeros(4, fe(5), &Sum23Hasher).unwrap();
        assert_eq!(zeros, vec![fe(5), fe(15), fe(30), fe(60), fe(120)]);
    }

    #[test]
    fn test_invalid_depth() {
        assert!(matches!(
            TriadMerkleTree::with_hasher(0, fe(0), Sum23Hasher),
            Err(MerkleError::InvalidDepth { depth: 0, .. })
        ));
        assert!(matches!(
            TriadMerkleTree::with_hasher(MAX_DEPTH + 1, fe(0), Sum23Hasher),
            Err(MerkleError::InvalidDepth { .. })
        ));
    }

    #[test]
    fn test_depth_one_tree() {
        let mut tree = TriadMerkleTree::with_hasher(1, fe(0), Sum23Hasher).unwrap();
        assert_eq!(tree.capacity(), 3);
        tree.insert_batch(&triad(1)).unwrap();
        assert_eq!(tree.root(), fe(6));
        assert!(tree.is_full());
        assert!(matches!(
            tree.insert_batch(&triad(4)),
            Err(MerkleError::CapacityExceeded { capacity: 3, attempted: 6 })
        ));
    }

    #[test]
    fn test_sum_root_counts_padding() {
        let mut tree = TriadMerkleTree::with_hasher(4, fe(1), Sum23Hasher).unwrap();
        tree.insert_batch(&triad(10)).unwrap();
        // 10 + 11 + 12 plus 21 padding leaves worth 1 each
        assert_eq!(tree.root(), fe(33 + 21));
    }

    #[test]
    fn test_incremental_matches_rebuild_sum() {
        let mut tree = TriadMerkleTree::with_hasher(5, fe(3), Sum23Hasher).unwrap();
        for t in 0..16u64 {
            tree.insert_batch(&triad(t * 3)).unwrap();
            assert_eq!(tree.root(), full_rebuild(&tree), "after triad {}", t);
        }
    }

    #[test]
    fn test_incremental_matches_rebuild_poseidon() {
        let hasher = PoseidonHasher::new().unwrap();
        let mut tree = TriadMerkleTree::with_hasher(4, fe(0), hasher).unwrap();
        assert_eq!(tree.root(), full_rebuild(&tree));
        for t in 0..8u64 {
            tree.insert_batch(&triad(t * 3 + 1)).unwrap();
            assert_eq!(tree.root(), full_rebuild(&tree), "after triad {}", t);
        }
    }

    #[test]
    fn test_rejects_wrong_batch_size() {
        let mut tree = TriadMerkleTree::with_hasher(3, fe(0), Sum23Hasher).unwrap();
        let root = tree.root();
        for size in [0usize, 1, 2, 4, 6] {
            let batch = vec![fe(1); size];
            assert!(matches!(
                tree.insert_batch(&batch),
                Err(MerkleError::InvalidBatchSize { expected: 3, got }) if got == size
            ));
        }
        assert!(tree.is_empty());
        assert_eq!(tree.root(), root);
    }

    #[test]
    fn test_capacity_failure_leaves_state_unchanged() {
        let mut tree = TriadMerkleTree::with_hasher(2, fe(0), Sum23Hasher).unwrap();
        tree.insert_batch(&triad(1)).unwrap();
        tree.insert_batch(&triad(4)).unwrap();
        let root = tree.root();
        let filled = tree.filled_subtrees().to_vec();

        assert!(tree.insert_batch(&triad(7)).is_err());
        assert_eq!(tree.len(), 6);
        assert_eq!(tree.root(), root);
        assert_eq!(tree.filled_subtrees(), filled.as_slice());
    }

    #[test]
    fn test_insert_triads_checks_capacity_up_front() {
        let mut tree = TriadMerkleTree::with_hasher(2, fe(0), Sum23Hasher).unwrap();
        let a = triad(1);
        let b = triad(4);
        let c = triad(7);
        let err = tree
            .insert_triads([&a[..], &b[..], &c[..]])
            .unwrap_err();
        assert!(matches!(err, MerkleError::CapacityExceeded { capacity: 6, attempted: 9 }));
        assert!(tree.is_empty());

        assert_eq!(tree.insert_triads([&a[..], &b[..]]).unwrap(), 2);
        assert_eq!(tree.len(), 6);
    }

    #[test]
    fn test_filled_subtrees_hold_left_children() {
        let mut tree = TriadMerkleTree::with_hasher(3, fe(0), Sum23Hasher).unwrap();
        tree.insert_batch(&triad(1)).unwrap(); // t0 = 6
        assert_eq!(tree.filled_subtrees()[0], fe(6));
        tree.insert_batch(&triad(4)).unwrap(); // t1 = 15, right child
        assert_eq!(tree.filled_subtrees()[0], fe(6));
        assert_eq!(tree.filled_subtrees()[1], fe(21));
        tree.insert_batch(&triad(7)).unwrap(); // t2 = 24, left child again
        assert_eq!(tree.filled_subtrees()[0], fe(24));
        assert_eq!(tree.root(), fe(45));
    }

    #[test]
    fn test_node_lookup() {
        let mut tree = TriadMerkleTree::with_hasher(3, fe(5), Sum23Hasher).unwrap();
        tree.insert_batch(&triad(1)).unwrap();
        assert_eq!(tree.node(0, 1), Some(fe(2)));
        assert_eq!(tree.node(0, 3), Some(fe(5)));
        assert_eq!(tree.node(1, 0), Some(fe(6)));
        assert_eq!(tree.node(1, 1), Some(fe(15)));
        assert_eq!(tree.node(4, 0), None);
    }

    /// Sum hasher that starts failing once its call budget is spent.
    struct BudgetHasher {
        remaining: std::sync::atomic::AtomicUsize,
    }

    impl BudgetHasher {
        fn unlimited() -> Arc<Self> {
            Arc::new(Self {
                remaining: std::sync::atomic::AtomicUsize::new(usize::MAX),
            })
        }

        fn allow(&self, calls: usize) {
            self.remaining.store(calls, std::sync::atomic::Ordering::SeqCst);
        }
    }

    impl TreeHasher for BudgetHasher {
        fn hash(&self, inputs: &[FieldElement]) -> MerkleResult<FieldElement> {
            use std::sync::atomic::Ordering;
            self.remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .map_err(|_| MerkleError::Hash("call budget spent".to_string()))?;
            Sum23Hasher.hash(inputs)
        }
    }

    #[test]
    fn test_hash_failure_leaves_tree_untouched() {
        let hasher = BudgetHasher::unlimited();
        let mut tree = TriadMerkleTree::new(4, fe(0), hasher.clone()).unwrap();
        tree.insert_batch(&triad(1)).unwrap();
        tree.insert_batch(&triad(4)).unwrap();

        // fail partway up the path: the triad hash and one pair hash succeed
        for budget in [0, 2, 3] {
            let before = tree.clone();
            hasher.allow(budget);
            let err = tree.insert_batch(&triad(7)).unwrap_err();
            assert!(matches!(err, MerkleError::Hash(_)), "budget {}", budget);
            assert_eq!(tree.len(), before.len());
            assert_eq!(tree.root(), before.root());
            assert_eq!(tree.filled_subtrees(), before.filled_subtrees());
            assert_eq!(tree.layers, before.layers);
        }

        hasher.allow(usize::MAX);
        tree.insert_batch(&triad(7)).unwrap();
        assert_eq!(tree.len(), 9);
        assert_eq!(tree.root(), full_rebuild(&tree));
    }

    #[test]
    fn test_insert_triads_keeps_triads_before_hash_failure() {
        let hasher = BudgetHasher::unlimited();
        let mut tree = TriadMerkleTree::new(3, fe(0), hasher.clone()).unwrap();
        let (a, b) = (triad(1), triad(4));

        // depth 3 costs three hashes per triad
        hasher.allow(4);
        let err = tree.insert_triads([&a[..], &b[..]]).unwrap_err();
        assert!(matches!(err, MerkleError::Hash(_)));
        assert_eq!(tree.leaves(), &a[..]);
    }
}
