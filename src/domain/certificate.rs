//! Certificates and their issued, registry-anchored form.

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::kyc::KycContent;
use crate::crypto::eddsa::{Signature, VerifyingKey};
use crate::crypto::field::FieldElement;
use crate::crypto::poseidon;
use crate::error::IssuerError;

/// A signed, unissued certificate. The leaf hash is the value placed into
/// the on-chain Merkle registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub holder_commitment: FieldElement,
    pub content: KycContent,
    pub content_hash: FieldElement,
    pub provider_public_key: VerifyingKey,
    pub signature: Signature,
    pub random_salt: i64,
    pub expiration_date: DateTime<Utc>,
    pub leaf_hash: FieldElement,
}

impl Certificate {
    /// Assemble a certificate, enforcing its invariants: the salt is
    /// positive, the expiration lies in the future, and the signature
    /// verifies over (content hash, holder commitment) under the provider
    /// key.
    pub fn new(
        holder_commitment: FieldElement,
        content: KycContent,
        provider_public_key: VerifyingKey,
        signature: Signature,
        random_salt: i64,
        expiration_date: DateTime<Utc>,
    ) -> Result<Self, IssuerError> {
        if random_salt < 1 {
            return Err(IssuerError::InvalidInput(
                "random salt must be positive".into(),
            ));
        }
        if expiration_date <= Utc::now() {
            return Err(IssuerError::InvalidInput(
                "expiration date is not in the future".into(),
            ));
        }

        let content_hash = content.hash();
        let message = poseidon::hash_two(content_hash, holder_commitment);
        if !provider_public_key.verify(message, &signature) {
            return Err(IssuerError::InvalidInput(
                "certificate signature does not verify".into(),
            ));
        }

        let leaf_hash = compute_leaf_hash(
            content_hash,
            holder_commitment,
            &provider_public_key,
            &signature,
            random_salt,
            &expiration_date,
        );

        Ok(Self {
            holder_commitment,
            content,
            content_hash,
            provider_public_key,
            signature,
            random_salt,
            expiration_date,
            leaf_hash,
        })
    }
}

/// Poseidon binding over the certificate's essential fields.
fn compute_leaf_hash(
    content_hash: FieldElement,
    holder_commitment: FieldElement,
    provider_public_key: &VerifyingKey,
    signature: &Signature,
    random_salt: i64,
    expiration_date: &DateTime<Utc>,
) -> FieldElement {
    poseidon::hash(&[
        content_hash,
        holder_commitment,
        provider_public_key.ax(),
        provider_public_key.ay(),
        signature.r8x(),
        signature.r8y(),
        signature.s_as_field(),
        FieldElement::from_u64(random_salt as u64),
        FieldElement::from_u64(expiration_date.timestamp() as u64),
    ])
}

/// Where an issued certificate landed in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationDetails {
    pub address: Address,
    pub revocable: bool,
    pub leaf_index: u64,
    pub chain_id: u64,
}

/// Authentication path from a registry leaf to the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    pub leaf_index: u64,
    pub path: Vec<FieldElement>,
}

/// A certificate together with its registry placement and inclusion proof.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCertificate {
    #[serde(flatten)]
    pub certificate: Certificate,
    pub registration: RegistrationDetails,
    pub merkle_proof: MerkleProof,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::eddsa::SigningKey;
    use crate::domain::kyc::KycInputs;
    use chrono::Duration;

    fn content() -> KycContent {
        KycInputs {
            surname: "A".into(),
            forename: "B".into(),
            year_of_birth: 1990,
            month_of_birth: 1,
            day_of_birth: 2,
            citizenship: "CHE".into(),
            postcode: "1000".into(),
            country: "CHE".into(),
        }
        .ff_encode()
        .unwrap()
    }

    fn build(salt: i64, key: &SigningKey) -> Result<Certificate, IssuerError> {
        let commitment = FieldElement::from_u64(12345);
        let content = content();
        let message = poseidon::hash_two(content.hash(), commitment);
        let signature = key.sign(message);
        Certificate::new(
            commitment,
            content,
            key.public(),
            signature,
            salt,
            Utc::now() + Duration::days(365),
        )
    }

    #[test]
    fn assembles_with_valid_signature() {
        let key = SigningKey::from_bytes([3u8; 32]);
        let certificate = build(99, &key).unwrap();
        assert_eq!(certificate.random_salt, 99);
        assert_ne!(certificate.leaf_hash, FieldElement::default());
    }

    #[test]
    fn rejects_non_positive_salt() {
        let key = SigningKey::from_bytes([3u8; 32]);
        assert!(build(0, &key).is_err());
        assert!(build(-5, &key).is_err());
    }

    #[test]
    fn rejects_past_expiration() {
        let key = SigningKey::from_bytes([3u8; 32]);
        let commitment = FieldElement::from_u64(12345);
        let content = content();
        let message = poseidon::hash_two(content.hash(), commitment);
        let signature = key.sign(message);
        let result = Certificate::new(
            commitment,
            content,
            key.public(),
            signature,
            1,
            Utc::now() - Duration::days(1),
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_foreign_signature() {
        let key = SigningKey::from_bytes([3u8; 32]);
        let other = SigningKey::from_bytes([4u8; 32]);
        let commitment = FieldElement::from_u64(12345);
        let content = content();
        let message = poseidon::hash_two(content.hash(), commitment);
        let signature = other.sign(message);
        let result = Certificate::new(
            commitment,
            content,
            key.public(),
            signature,
            1,
            Utc::now() + Duration::days(1),
        );
        assert!(result.is_err());
    }

    #[test]
    fn leaf_and_content_hashes_are_salt_and_input_stable() {
        // Fixed inputs, key and salt give bit-stable hashes and signature.
        let key = SigningKey::from_bytes([3u8; 32]);
        let a = build(42, &key).unwrap();
        let b = build(42, &key).unwrap();
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.signature, b.signature);
        assert_eq!(a.leaf_hash, b.leaf_hash);

        // A different salt moves the leaf hash but not the content hash.
        let c = build(43, &key).unwrap();
        assert_eq!(a.content_hash, c.content_hash);
        assert_ne!(a.leaf_hash, c.leaf_hash);
    }

    #[test]
    fn issued_certificate_serde_roundtrip() {
        let key = SigningKey::from_bytes([3u8; 32]);
        let certificate = build(7, &key).unwrap();
        let issued = IssuedCertificate {
            certificate,
            registration: RegistrationDetails {
                address: Address::ZERO,
                revocable: true,
                leaf_index: 5,
                chain_id: 41238,
            },
            merkle_proof: MerkleProof {
                leaf_index: 5,
                path: vec![FieldElement::from_u64(1), FieldElement::from_u64(2)],
            },
        };

        let json = serde_json::to_string(&issued).unwrap();
        let back: IssuedCertificate = serde_json::from_str(&json).unwrap();
        assert_eq!(back.certificate.leaf_hash, issued.certificate.leaf_hash);
        assert_eq!(back.registration.leaf_index, 5);
        assert_eq!(back.merkle_proof, issued.merkle_proof);
        assert!(back.registration.revocable);
    }
}
