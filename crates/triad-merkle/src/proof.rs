//! Merkle paths: generation, verification and circuit transcoding.
//!
//! A path has one entry per level below the root. Entry 0 is the leaf's
//! triad: the two other leaves plus the leaf's position (0, 1 or 2) among
//! the three. Every entry above holds one sibling and a 0/1 position
//! (0 = current node is the left child).

use serde::{Deserialize, Serialize};

use crate::hash::TreeHasher;
use crate::tree::TriadMerkleTree;
use crate::{FieldElement, MerkleError, MerkleResult, TRIAD_SIZE};

/// Sibling data for one level of a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathElement {
    /// The other two leaves of a triad, in triad order.
    Triad([FieldElement; 2]),
    Binary(FieldElement),
}

/// An authentication path from one leaf to the root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    pub leaf: FieldElement,
    pub leaf_index: u64,
    pub path_elements: Vec<PathElement>,
    pub path_indices: Vec<u8>,
    pub root: FieldElement,
}

impl MerkleProof {
    pub fn depth(&self) -> usize {
        self.path_elements.len()
    }

    /// Hash the leaf up through the path.
    ///
    /// Returns `Ok(None)` when the path is not shaped like a triad path
    /// (mismatched lengths, a position out of range for its level, or the
    /// wrong kind of element at a level). Only hasher failures are errors.
    pub fn compute_root(&self, hasher: &dyn TreeHasher) -> MerkleResult<Option<FieldElement>> {
        if self.path_elements.is_empty() || self.path_elements.len() != self.path_indices.len() {
            return Ok(None);
        }

        let mut levels = self.path_elements.iter().zip(self.path_indices.iter());

        let mut node = match levels.next() {
            Some((PathElement::Triad([a, b]), position)) => {
                let inputs = match position {
                    0 => [self.leaf, *a, *b],
                    1 => [*a, self.leaf, *b],
                    2 => [*a, *b, self.leaf],
                    _ => return Ok(None),
                };
                hasher.hash(&inputs)?
            }
            _ => return Ok(None),
        };

        for (element, position) in levels {
            let sibling = match element {
                PathElement::Binary(sibling) => *sibling,
                PathElement::Triad(_) => return Ok(None),
            };
            node = match position {
                0 => hasher.hash(&[node, sibling])?,
                1 => hasher.hash(&[sibling, node])?,
                _ => return Ok(None),
            };
        }

        Ok(Some(node))
    }

    /// `true` iff the path reproduces `self.root`.
    pub fn verify(&self, hasher: &dyn TreeHasher) -> MerkleResult<bool> {
        Ok(self.compute_root(hasher)? == Some(self.root))
    }

    pub fn to_circuit_signals(&self) -> CircuitSignals {
        CircuitSignals {
            leaf: self.leaf,
            root: self.root,
            path_elements: path_elements_to_circuit_signals(&self.path_elements),
            path_indices: path_indices_to_circuit_signals(&self.path_indices),
        }
    }
}

/// Proof inputs in the flat shape the circuits take: one scalar per signal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitSignals {
    pub leaf: FieldElement,
    pub root: FieldElement,
    pub path_elements: Vec<FieldElement>,
    pub path_indices: Vec<u8>,
}

/// Check a proof against its own root. Free-function form of
/// [`MerkleProof::verify`].
pub fn verify_merkle_path(proof: &MerkleProof, hasher: &dyn TreeHasher) -> MerkleResult<bool> {
    proof.verify(hasher)
}

/// Split the leaf-level position (0..=2) into two bits `(index % 2, index / 2)`.
/// Upper levels are already single bits and pass through.
pub fn path_indices_to_circuit_signals(indices: &[u8]) -> Vec<u8> {
    let mut signals = Vec::with_capacity(indices.len() + 1);
    if let Some((first, rest)) = indices.split_first() {
        signals.push(first % 2);
        signals.push(first / 2);
        signals.extend_from_slice(rest);
    }
    signals
}

/// Flatten the leaf level's two siblings into two scalar signals.
pub fn path_elements_to_circuit_signals(elements: &[PathElement]) -> Vec<FieldElement> {
    let mut signals = Vec::with_capacity(elements.len() + 1);
    for element in elements {
        match element {
            PathElement::Triad([a, b]) => {
                signals.push(*a);
                signals.push(*b);
            }
            PathElement::Binary(x) => signals.push(*x),
        }
    }
    signals
}

impl TriadMerkleTree {
    /// Build the authentication path for the leaf at `index`.
    pub fn gen_merkle_path(&self, index: usize) -> MerkleResult<MerkleProof> {
        let leaf = self.leaf(index).ok_or(MerkleError::IndexOutOfRange {
            index: index as u64,
            len: self.len() as u64,
        })?;

        let triad_index = index / TRIAD_SIZE;
        let position = index % TRIAD_SIZE;
        let base = triad_index * TRIAD_SIZE;
        let triad = &self.leaves()[base..base + TRIAD_SIZE];
        let siblings = match position {
            0 => [triad[1], triad[2]],
            1 => [triad[0], triad[2]],
            _ => [triad[0], triad[1]],
        };

        let mut path_elements = Vec::with_capacity(self.depth());
        let mut path_indices = Vec::with_capacity(self.depth());
        path_elements.push(PathElement::Triad(siblings));
        path_indices.push(position as u8);

        let mut node_index = triad_index;
        for level in 1..self.depth() {
            let sibling = self.node(level, node_index ^ 1).ok_or_else(|| {
                MerkleError::InvalidInput(format!("Level {} is beyond the tree depth", level))
            })?;
            path_elements.push(PathElement::Binary(sibling));
            path_indices.push((node_index & 1) as u8);
            node_index >>= 1;
        }

        Ok(MerkleProof {
            leaf,
            leaf_index: index as u64,
            path_elements,
            path_indices,
            root: self.root(),
        })
    }

    /// Verify a proof with this tree's hasher and against its current root.
    pub fn verify_merkle_path(&self, proof: &MerkleProof) -> MerkleResult<bool> {
        Ok(proof.root == self.root() && proof.verify(self.hasher().as_ref())?)
    }
}
