//! Field elements and byte/text conversions.
//!
//! Every value stored in the tree (leaves, internal nodes, the zero value and
//! the root) is an element of the BN254 scalar field. [`FieldElement`] wraps
//! `ark_bn254::Fr` and gives it the encodings the rest of the system speaks:
//!
//! - decimal strings (snapshot files, circuit signals)
//! - `0x`-prefixed hex strings (accepted on input, printed by the CLI)
//! - 32-byte big-endian buffers

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField, Zero};
use num_bigint::BigUint;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use crate::{MerkleError, MerkleResult, FIELD_BYTES};

/// An element of the BN254 scalar field.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FieldElement(Fr);

impl FieldElement {
    pub fn zero() -> Self {
        Self(Fr::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// The prime modulus of the field.
    pub fn modulus() -> BigUint {
        BigUint::from(Fr::MODULUS)
    }

    /// Convert an unsigned integer, rejecting values that are not canonical
    /// field elements (>= modulus).
    pub fn from_biguint(value: &BigUint) -> MerkleResult<Self> {
        if value >= &Self::modulus() {
            return Err(MerkleError::NotInField(value.to_string()));
        }
        Ok(Self(Fr::from(value.clone())))
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from(self.0.into_bigint())
    }

    /// 32-byte big-endian encoding.
    pub fn to_bytes32(&self) -> [u8; FIELD_BYTES] {
        let bytes = self.0.into_bigint().to_bytes_be();
        let mut out = [0u8; FIELD_BYTES];
        out[FIELD_BYTES - bytes.len()..].copy_from_slice(&bytes);
        out
    }

    pub fn from_bytes32(bytes: &[u8; FIELD_BYTES]) -> MerkleResult<Self> {
        Self::from_biguint(&buffer_to_bigint(bytes))
    }

    pub fn to_hex_string(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes32()))
    }

    pub fn inner(&self) -> &Fr {
        &self.0
    }
}

impl From<Fr> for FieldElement {
    fn from(value: Fr) -> Self {
        Self(value)
    }
}

impl From<FieldElement> for Fr {
    fn from(value: FieldElement) -> Self {
        value.0
    }
}

impl From<u64> for FieldElement {
    fn from(value: u64) -> Self {
        Self(Fr::from(value))
    }
}

impl Add for FieldElement {
    type Output = FieldElement;

    fn add(self, rhs: FieldElement) -> FieldElement {
        FieldElement(self.0 + rhs.0)
    }
}

impl FromStr for FieldElement {
    type Err = MerkleError;

    /// Parse a decimal string, or a hex string with a `0x` prefix.
    fn from_str(s: &str) -> MerkleResult<Self> {
        let s = s.trim();
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(digits) => BigUint::parse_bytes(digits.as_bytes(), 16),
            None => BigUint::parse_bytes(s.as_bytes(), 10),
        };
        let value = parsed
            .ok_or_else(|| MerkleError::InvalidInput(format!("Invalid field element: {:?}", s)))?;
        Self::from_biguint(&value)
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_biguint())
    }
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldElement({})", self)
    }
}

impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Encode an unsigned integer as a 32-byte big-endian buffer, left-padded
/// with zero bytes.
pub fn bigint_to_bytes32(value: &BigUint) -> MerkleResult<[u8; FIELD_BYTES]> {
    if value.bits() > (FIELD_BYTES * 8) as u64 {
        return Err(MerkleError::ValueTooLarge { bits: value.bits() });
    }
    let mut out = [0u8; FIELD_BYTES];
    if value.bits() == 0 {
        return Ok(out);
    }
    let bytes = value.to_bytes_be();
    out[FIELD_BYTES - bytes.len()..].copy_from_slice(&bytes);
    Ok(out)
}

/// Decode an unsigned big-endian integer. The empty buffer decodes to 0.
pub fn buffer_to_bigint(buffer: &[u8]) -> BigUint {
    BigUint::from_bytes_be(buffer)
}
