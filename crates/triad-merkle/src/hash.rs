//! Hash adapters for the triad tree.
//!
//! The tree never calls a hash function directly. It is handed a
//! [`TreeHasher`] at construction and asks it to combine either three nodes
//! (a leaf triad into its level-1 parent) or two nodes (every level above).
//!
//! - [`PoseidonHasher`]: circom-parameter Poseidon over BN254, used in production
//!   and by the downstream circuits.
//! - [`Sum23Hasher`]: field addition. Not collision resistant; exists so the
//!   tree algorithm can be checked by hand.

use ark_bn254::Fr;
use light_poseidon::{Poseidon, PoseidonHasher as _};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::{FieldElement, MerkleError, MerkleResult};

/// Combines 2 or 3 field elements into one.
pub trait TreeHasher: Send + Sync {
    fn hash(&self, inputs: &[FieldElement]) -> MerkleResult<FieldElement>;

    /// The named hasher this is, if any. Recorded in snapshots so a tree is
    /// not reloaded under a different hash function.
    fn kind(&self) -> Option<HasherKind> {
        None
    }
}

impl<T: TreeHasher + ?Sized> TreeHasher for Arc<T> {
    fn hash(&self, inputs: &[FieldElement]) -> MerkleResult<FieldElement> {
        (**self).hash(inputs)
    }

    fn kind(&self) -> Option<HasherKind> {
        (**self).kind()
    }
}

/// Reject anything other than 2 or 3 inputs.
pub fn check_arity(inputs: &[FieldElement]) -> MerkleResult<()> {
    match inputs.len() {
        2 | 3 => Ok(()),
        got => Err(MerkleError::InvalidArity { got }),
    }
}

/// Poseidon with the circomlib parameter set (x^5 S-box, 8 full rounds).
///
/// `light_poseidon::Poseidon` needs `&mut self` to hash, so one instance per
/// arity sits behind a mutex.
pub struct PoseidonHasher {
    t3: Mutex<Poseidon<Fr>>,
    t4: Mutex<Poseidon<Fr>>,
}

impl PoseidonHasher {
    pub fn new() -> MerkleResult<Self> {
        let t3 = Poseidon::<Fr>::new_circom(2).map_err(|e| MerkleError::Hash(e.to_string()))?;
        let t4 = Poseidon::<Fr>::new_circom(3).map_err(|e| MerkleError::Hash(e.to_string()))?;
        Ok(Self {
            t3: Mutex::new(t3),
            t4: Mutex::new(t4),
        })
    }
}

impl TreeHasher for PoseidonHasher {
    fn hash(&self, inputs: &[FieldElement]) -> MerkleResult<FieldElement> {
        check_arity(inputs)?;
        let elements: Vec<Fr> = inputs.iter().map(|x| Fr::from(*x)).collect();
        let result = if elements.len() == 2 {
            self.t3.lock().hash(&elements)
        } else {
            self.t4.lock().hash(&elements)
        };
        result
            .map(FieldElement::from)
            .map_err(|e| MerkleError::Hash(e.to_string()))
    }

    fn kind(&self) -> Option<HasherKind> {
        Some(HasherKind::Poseidon)
    }
}

impl fmt::Debug for PoseidonHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PoseidonHasher")
    }
}

/// Adds its inputs together.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum23Hasher;

impl TreeHasher for Sum23Hasher {
    fn hash(&self, inputs: &[FieldElement]) -> MerkleResult<FieldElement> {
        check_arity(inputs)?;
        Ok(inputs
            .iter()
            .fold(FieldElement::zero(), |acc, x| acc + *x))
    }

    fn kind(&self) -> Option<HasherKind> {
        Some(HasherKind::Sum23)
    }
}

/// Named hashers selectable from configuration and snapshot files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HasherKind {
    #[default]
    Poseidon,
    Sum23,
}

impl HasherKind {
    pub fn build(&self) -> MerkleResult<Arc<dyn TreeHasher>> {
        match self {
            HasherKind::Poseidon => Ok(Arc::new(PoseidonHasher::new()?)),
            HasherKind::Sum23 => Ok(Arc::new(Sum23Hasher)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HasherKind::Poseidon => "poseidon",
            HasherKind::Sum23 => "sum23",
        }
    }
}

impl fmt::Display for HasherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HasherKind {
    type Err = MerkleError;

    fn from_str(s: &str) -> MerkleResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "poseidon" => Ok(HasherKind::Poseidon),
            "sum23" | "sum" => Ok(HasherKind::Sum23),
            other => Err(MerkleError::InvalidInput(format!("Unknown hasher: {}", other))),
        }
    }
}
