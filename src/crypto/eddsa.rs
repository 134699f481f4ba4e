//! EdDSA over the Baby-Jubjub curve.
//!
//! Certificate signatures must verify inside BN254 arithmetic circuits, so
//! they use the embedded Baby-Jubjub curve: public keys and signature
//! commitments are curve points whose coordinates are BN254 scalars, and the
//! challenge is a Poseidon hash over (R, A, message). Nonces are derived
//! deterministically from the key seed and message.

use std::fmt;
use std::str::FromStr;

use ark_ec::{AffineRepr, CurveGroup};
use ark_ed_on_bn254::{EdwardsAffine, EdwardsProjective, Fr as ScalarField};
use ark_ff::{BigInteger, PrimeField};
use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use super::field::FieldElement;
use super::poseidon;
use crate::error::IssuerError;

const NONCE_DOMAIN: &[u8] = b"zkcert-eddsa-nonce-v1";

/// Issuer signing key over Baby-Jubjub.
#[derive(Clone)]
pub struct SigningKey {
    scalar: ScalarField,
    seed: [u8; 32],
}

impl SigningKey {
    /// Build a key from a 32-byte seed. The scalar is the seed reduced into
    /// the subgroup order; the raw seed also feeds nonce derivation.
    pub fn from_bytes(seed: [u8; 32]) -> Self {
        let scalar = ScalarField::from_le_bytes_mod_order(&seed);
        Self { scalar, seed }
    }

    pub fn from_hex(hex_key: &str) -> Result<Self, IssuerError> {
        let bytes = hex::decode(hex_key)
            .map_err(|e| IssuerError::InvalidKey(format!("invalid hex string: {e}")))?;
        let seed: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            IssuerError::InvalidKey(format!(
                "invalid key length: expected 32 bytes, got {}",
                b.len()
            ))
        })?;
        Ok(Self::from_bytes(seed))
    }

    pub fn public(&self) -> VerifyingKey {
        VerifyingKey((EdwardsAffine::generator() * self.scalar).into_affine())
    }

    /// Sign a field element message.
    pub fn sign(&self, message: FieldElement) -> Signature {
        let mut hasher = Sha256::new();
        hasher.update(NONCE_DOMAIN);
        hasher.update(self.seed);
        hasher.update(message.to_be_bytes());
        let nonce = ScalarField::from_le_bytes_mod_order(&hasher.finalize());

        let r = (EdwardsAffine::generator() * nonce).into_affine();
        let challenge = challenge_scalar(&r, &self.public().0, message);
        let s = nonce + challenge * self.scalar;

        Signature { r, s }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("public", &self.public())
            .finish_non_exhaustive()
    }
}

/// Issuer public key, an affine Baby-Jubjub point.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct VerifyingKey(EdwardsAffine);

impl VerifyingKey {
    pub fn ax(&self) -> FieldElement {
        FieldElement(self.0.x)
    }

    pub fn ay(&self) -> FieldElement {
        FieldElement(self.0.y)
    }

    /// Check `s * B == R + challenge * A`.
    pub fn verify(&self, message: FieldElement, signature: &Signature) -> bool {
        let challenge = challenge_scalar(&signature.r, &self.0, message);
        let lhs = EdwardsAffine::generator() * signature.s;
        let rhs = EdwardsProjective::from(signature.r) + self.0 * challenge;
        lhs == rhs
    }
}

impl fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifyingKey")
            .field("ax", &self.ax().to_decimal())
            .field("ay", &self.ay().to_decimal())
            .finish()
    }
}

/// EdDSA signature: commitment point R and response scalar s.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    r: EdwardsAffine,
    s: ScalarField,
}

impl Signature {
    pub fn r8x(&self) -> FieldElement {
        FieldElement(self.r.x)
    }

    pub fn r8y(&self) -> FieldElement {
        FieldElement(self.r.y)
    }

    /// The response scalar lifted into the BN254 scalar field. The subgroup
    /// order is smaller than the field modulus, so the lift is injective.
    pub fn s_as_field(&self) -> FieldElement {
        FieldElement::from_be_bytes_mod_order(&self.s.into_bigint().to_bytes_be())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("r8x", &self.r8x().to_decimal())
            .field("r8y", &self.r8y().to_decimal())
            .field("s", &scalar_to_decimal(&self.s))
            .finish()
    }
}

fn challenge_scalar(r: &EdwardsAffine, a: &EdwardsAffine, message: FieldElement) -> ScalarField {
    let digest = poseidon::hash(&[
        FieldElement(r.x),
        FieldElement(r.y),
        FieldElement(a.x),
        FieldElement(a.y),
        message,
    ]);
    ScalarField::from_le_bytes_mod_order(&digest.0.into_bigint().to_bytes_le())
}

fn scalar_to_decimal(s: &ScalarField) -> String {
    BigUint::from(s.into_bigint()).to_string()
}

fn scalar_from_decimal(s: &str) -> Result<ScalarField, IssuerError> {
    let value = BigUint::from_str(s)
        .map_err(|_| IssuerError::InvalidInput(format!("not a decimal integer: {s:?}")))?;
    let modulus: BigUint = ScalarField::MODULUS.into();
    if value >= modulus {
        return Err(IssuerError::InvalidInput(
            "scalar exceeds the subgroup order".into(),
        ));
    }
    Ok(ScalarField::from_le_bytes_mod_order(&value.to_bytes_le()))
}

fn point_from_coordinates(x: FieldElement, y: FieldElement) -> Result<EdwardsAffine, IssuerError> {
    let point = EdwardsAffine::new_unchecked(x.0, y.0);
    if !point.is_on_curve() {
        return Err(IssuerError::InvalidInput(
            "point is not on the Baby-Jubjub curve".into(),
        ));
    }
    Ok(point)
}

// Wire forms follow the circuit convention: decimal coordinates named
// ax/ay for keys and r8x/r8y/s for signatures.

#[derive(Serialize, Deserialize)]
struct VerifyingKeyWire {
    ax: FieldElement,
    ay: FieldElement,
}

impl Serialize for VerifyingKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        VerifyingKeyWire {
            ax: self.ax(),
            ay: self.ay(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VerifyingKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = VerifyingKeyWire::deserialize(deserializer)?;
        point_from_coordinates(wire.ax, wire.ay)
            .map(VerifyingKey)
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Serialize, Deserialize)]
struct SignatureWire {
    r8x: FieldElement,
    r8y: FieldElement,
    s: String,
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SignatureWire {
            r8x: self.r8x(),
            r8y: self.r8y(),
            s: scalar_to_decimal(&self.s),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = SignatureWire::deserialize(deserializer)?;
        let r = point_from_coordinates(wire.r8x, wire.r8y).map_err(serde::de::Error::custom)?;
        let s = scalar_from_decimal(&wire.s).map_err(serde::de::Error::custom)?;
        Ok(Signature { r, s })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> SigningKey {
        SigningKey::from_bytes([7u8; 32])
    }

    #[test]
    fn sign_and_verify() {
        let key = test_key();
        let message = FieldElement::from_u64(42);
        let signature = key.sign(message);
        assert!(key.public().verify(message, &signature));
    }

    #[test]
    fn wrong_message_fails() {
        let key = test_key();
        let signature = key.sign(FieldElement::from_u64(42));
        assert!(!key.public().verify(FieldElement::from_u64(43), &signature));
    }

    #[test]
    fn cross_key_verification_fails() {
        let message = FieldElement::from_u64(42);
        let signature = test_key().sign(message);
        let other = SigningKey::from_bytes([9u8; 32]);
        assert!(!other.public().verify(message, &signature));
    }

    #[test]
    fn signatures_are_deterministic() {
        let key = test_key();
        let message = FieldElement::from_u64(42);
        assert_eq!(key.sign(message), key.sign(message));
    }

    #[test]
    fn from_hex_validates_length() {
        assert!(SigningKey::from_hex("0a0b").is_err());
        assert!(SigningKey::from_hex("zz").is_err());
        let hex_key = hex::encode([1u8; 32]);
        assert!(SigningKey::from_hex(&hex_key).is_ok());
    }

    #[test]
    fn verifying_key_serde_roundtrip() {
        let public = test_key().public();
        let json = serde_json::to_string(&public).unwrap();
        let back: VerifyingKey = serde_json::from_str(&json).unwrap();
        assert_eq!(public, back);
    }

    #[test]
    fn signature_serde_roundtrip() {
        let key = test_key();
        let message = FieldElement::from_u64(1234);
        let signature = key.sign(message);
        let json = serde_json::to_string(&signature).unwrap();
        let back: Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(signature, back);
        assert!(key.public().verify(message, &back));
    }

    #[test]
    fn off_curve_point_is_rejected() {
        let json = r#"{"ax":"1","ay":"1"}"#;
        assert!(serde_json::from_str::<VerifyingKey>(json).is_err());
    }
}
