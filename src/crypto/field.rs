//! BN254 scalar field elements.
//!
//! Commitments, content hashes and Merkle leaves all live in the BN254
//! scalar field. On the wire they are decimal big-integer strings; on the
//! chain they are big-endian `bytes32`.

use std::fmt;
use std::str::FromStr;

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::IssuerError;

/// An element of the BN254 scalar field.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldElement(pub Fr);

impl FieldElement {
    /// Parse a decimal big-integer string, rejecting values outside the field.
    pub fn from_decimal(s: &str) -> Result<Self, IssuerError> {
        let value = BigUint::from_str(s)
            .map_err(|_| IssuerError::InvalidInput(format!("not a decimal integer: {s:?}")))?;
        let modulus: BigUint = Fr::MODULUS.into();
        if value >= modulus {
            return Err(IssuerError::InvalidInput(
                "value exceeds the field modulus".into(),
            ));
        }
        Ok(Self(Fr::from_le_bytes_mod_order(&value.to_bytes_le())))
    }

    pub fn from_u64(value: u64) -> Self {
        Self(Fr::from(value))
    }

    /// Reduce arbitrary big-endian bytes into the field.
    pub fn from_be_bytes_mod_order(bytes: &[u8]) -> Self {
        Self(Fr::from_be_bytes_mod_order(bytes))
    }

    /// Canonical big-endian 32-byte representation, as used for `bytes32`
    /// contract arguments.
    pub fn to_be_bytes(&self) -> [u8; 32] {
        let bytes = self.0.into_bigint().to_bytes_be();
        let mut out = [0u8; 32];
        out[32 - bytes.len()..].copy_from_slice(&bytes);
        out
    }

    pub fn to_decimal(&self) -> String {
        BigUint::from(self.0.into_bigint()).to_string()
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal())
    }
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldElement({})", self.to_decimal())
    }
}

impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_decimal())
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FieldElement::from_decimal(&s).map_err(serde::de::Error::custom)
    }
}
